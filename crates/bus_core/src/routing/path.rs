//! Street path building: turn an ordered waypoint list into drivable geometry.
//!
//! Strategy, best first:
//!
//! 1. One full-route request through every waypoint (retried once with
//!    road-snapped coordinates when any snap is available).
//! 2. Leg by leg: snap both endpoints, then try snapped→snapped,
//!    snapped→raw, raw→snapped and raw→raw, each across a widening radius
//!    ladder.
//! 3. A straight line for any leg that still has no geometry.
//!
//! Provider failures only lower path quality; [`StreetPathBuilder::build`]
//! never fails.

use log::{debug, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::geo::GeoPoint;
use crate::polyline::{dedup_points, polyline_length_m, push_dedup, DEDUP_EPSILON_DEG};
use crate::route::Waypoint;

use super::{RoadRoute, RoadRouter, RoutingError};

/// Snap radii tried per leg combination; `None` lets the provider search freely.
pub const DEFAULT_RADIUS_LADDER_M: [Option<f64>; 5] =
    [Some(120.0), Some(240.0), Some(480.0), Some(720.0), None];

/// Tunables for provider access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathBuilderConfig {
    pub radius_ladder_m: Vec<Option<f64>>,
    /// Attempts per request, counting the first one.
    pub max_attempts: usize,
    /// Backoff before retry `n` is `n × backoff_step_ms`.
    pub backoff_step_ms: u64,
    pub snap_cache_capacity: usize,
    /// Decimal places kept in snap cache keys.
    pub snap_key_decimals: i32,
}

impl Default for PathBuilderConfig {
    fn default() -> Self {
        Self {
            radius_ladder_m: DEFAULT_RADIUS_LADDER_M.to_vec(),
            max_attempts: 3,
            backoff_step_ms: 150,
            snap_cache_capacity: 4_096,
            snap_key_decimals: 6,
        }
    }
}

/// How the geometry of a [`StreetPath`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    /// Fewer than two waypoints; no routing attempted.
    Degenerate,
    /// A single full-route response.
    FullRoute,
    /// Stitched from per-leg requests; `straight_legs` of them fell back to lines.
    Legs { straight_legs: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreetPath {
    pub points: Vec<GeoPoint>,
    pub distance_m: f64,
    pub source: PathSource,
}

/// Road snaps keyed by rounded coordinate. Only successful lookups are cached.
pub struct SnapCache {
    cache: Mutex<LruCache<(i64, i64), GeoPoint>>,
    scale: f64,
}

impl SnapCache {
    pub fn new(capacity: usize, decimals: i32) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            scale: 10f64.powi(decimals),
        }
    }

    fn key(&self, point: GeoPoint) -> (i64, i64) {
        (
            (point.lat * self.scale).round() as i64,
            (point.lon * self.scale).round() as i64,
        )
    }

    pub fn get(&self, point: GeoPoint) -> Option<GeoPoint> {
        let key = self.key(point);
        self.cache.lock().ok()?.get(&key).copied()
    }

    pub fn put(&self, point: GeoPoint, snapped: GeoPoint) {
        let key = self.key(point);
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, snapped);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct StreetPathBuilder {
    router: Arc<dyn RoadRouter>,
    config: PathBuilderConfig,
    snaps: SnapCache,
}

impl StreetPathBuilder {
    pub fn new(router: Arc<dyn RoadRouter>) -> Self {
        Self::with_config(router, PathBuilderConfig::default())
    }

    pub fn with_config(router: Arc<dyn RoadRouter>, config: PathBuilderConfig) -> Self {
        let snaps = SnapCache::new(config.snap_cache_capacity, config.snap_key_decimals);
        Self {
            router,
            config,
            snaps,
        }
    }

    pub fn config(&self) -> &PathBuilderConfig {
        &self.config
    }

    pub fn snap_cache(&self) -> &SnapCache {
        &self.snaps
    }

    /// Drivable geometry through `waypoints` in order.
    pub fn build(&self, waypoints: &[Waypoint]) -> StreetPath {
        let points: Vec<GeoPoint> = waypoints.iter().map(|w| w.point).collect();
        self.build_points(&points)
    }

    /// Coordinate form of [`build`](Self::build).
    pub fn build_points(&self, points: &[GeoPoint]) -> StreetPath {
        if points.len() < 2 {
            return StreetPath {
                points: points.to_vec(),
                distance_m: 0.0,
                source: PathSource::Degenerate,
            };
        }

        if let Some(path) = self.full_route(points) {
            return path;
        }
        debug!(
            "full route over {} waypoints unavailable, building leg by leg",
            points.len()
        );
        self.leg_by_leg(points)
    }

    fn full_route(&self, points: &[GeoPoint]) -> Option<StreetPath> {
        let raw_err = match self.request(points, None) {
            Ok(route) => match usable_full_route(route) {
                Some(path) => return Some(path),
                None => RoutingError::NoGeometry,
            },
            Err(err) => err,
        };
        debug!("full route request failed: {}", raw_err);

        // Snapping is only worth another request when the provider is reachable
        if matches!(raw_err, RoutingError::Unavailable) {
            return None;
        }
        let snapped: Vec<Option<GeoPoint>> = points.iter().map(|p| self.snap(*p)).collect();
        if snapped.iter().all(Option::is_none) {
            return None;
        }
        let candidate: Vec<GeoPoint> = points
            .iter()
            .zip(&snapped)
            .map(|(raw, snap)| snap.unwrap_or(*raw))
            .collect();
        if candidate.as_slice() == points {
            return None;
        }
        match self.request(&candidate, None) {
            Ok(route) => usable_full_route(route),
            Err(err) => {
                debug!("snapped full route request failed: {}", err);
                None
            }
        }
    }

    fn leg_by_leg(&self, points: &[GeoPoint]) -> StreetPath {
        let mut polyline: Vec<GeoPoint> = Vec::new();
        let mut distance_m = 0.0;
        let mut straight_legs = 0;

        for pair in points.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let (geometry, leg_distance) = match self.leg(from, to) {
                Some(route) => {
                    let length = route
                        .distance_m
                        .unwrap_or_else(|| polyline_length_m(&route.geometry));
                    (route.geometry, length)
                }
                None => {
                    straight_legs += 1;
                    (vec![from, to], polyline_length_m(&[from, to]))
                }
            };
            distance_m += leg_distance;
            for point in geometry {
                push_dedup(&mut polyline, point, DEDUP_EPSILON_DEG);
            }
        }

        if straight_legs > 0 {
            warn!(
                "{} of {} legs fell back to straight lines",
                straight_legs,
                points.len() - 1
            );
        }
        if distance_m <= 0.0 {
            distance_m = polyline_length_m(&polyline);
        }

        StreetPath {
            points: polyline,
            distance_m,
            source: PathSource::Legs { straight_legs },
        }
    }

    /// Geometry for one leg, or `None` when every combination failed.
    fn leg(&self, from: GeoPoint, to: GeoPoint) -> Option<RoadRoute> {
        let snap_from = self.snap(from);
        let snap_to = self.snap(to);

        let mut combos: Vec<(GeoPoint, GeoPoint)> = Vec::with_capacity(4);
        if let (Some(a), Some(b)) = (snap_from, snap_to) {
            combos.push((a, b));
        }
        combos.push((snap_from.unwrap_or(from), to));
        combos.push((from, snap_to.unwrap_or(to)));
        combos.push((from, to));

        let mut tried: Vec<(GeoPoint, GeoPoint)> = Vec::with_capacity(combos.len());
        for (start, end) in combos {
            if tried.contains(&(start, end)) {
                continue;
            }
            tried.push((start, end));

            for radius in &self.config.radius_ladder_m {
                match self.request(&[start, end], *radius) {
                    Ok(route) if route.geometry.len() >= 2 => return Some(route),
                    Ok(_) => continue,
                    Err(RoutingError::Unavailable) => return None,
                    Err(err) => {
                        debug!("leg {} -> {} radius {:?} failed: {}", start, end, radius, err);
                    }
                }
            }
        }
        None
    }

    fn snap(&self, point: GeoPoint) -> Option<GeoPoint> {
        if let Some(cached) = self.snaps.get(point) {
            return Some(cached);
        }
        match self.router.nearest(point) {
            Ok(snapped) => {
                self.snaps.put(point, snapped);
                Some(snapped)
            }
            Err(err) => {
                debug!("snap of {} failed: {}", point, err);
                None
            }
        }
    }

    /// One provider call with linear backoff on transient failures.
    fn request(
        &self,
        coords: &[GeoPoint],
        radius_m: Option<f64>,
    ) -> Result<RoadRoute, RoutingError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.router.route(coords, radius_m) {
                Err(err) if err.is_transient() && attempt < attempts => {
                    debug!("transient routing failure (attempt {}): {}", attempt, err);
                    let backoff = self.config.backoff_step_ms.saturating_mul(attempt as u64);
                    if backoff > 0 {
                        thread::sleep(Duration::from_millis(backoff));
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn usable_full_route(route: RoadRoute) -> Option<StreetPath> {
    let points = dedup_points(route.geometry, DEDUP_EPSILON_DEG);
    if points.len() < 2 {
        return None;
    }
    let distance_m = route
        .distance_m
        .unwrap_or_else(|| polyline_length_m(&points));
    Some(StreetPath {
        points,
        distance_m,
        source: PathSource::FullRoute,
    })
}
