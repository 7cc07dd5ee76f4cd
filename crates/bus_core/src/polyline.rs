//! Polyline geometry with precomputed arc-length tables.
//!
//! A [`Polyline`] always holds at least two distinct consecutive points, so
//! every arc-length query lands on a real segment. Construction dedups
//! consecutive near-identical points before the tables are built.

use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::geo::{almost_equal, haversine_m, GeoPoint};
use crate::route::{Waypoint, WaypointKind};

/// Tolerance (degrees) below which consecutive points are merged.
pub const DEDUP_EPSILON_DEG: f64 = 1e-8;

/// Arc-length tables for a point sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct PolylineMetrics {
    pub segment_lengths: Vec<f64>,
    /// `cumulative[0] == 0`, `cumulative[i + 1] == cumulative[i] + segment_lengths[i]`.
    pub cumulative: Vec<f64>,
    pub total: f64,
}

/// Build segment and cumulative length tables for `points`.
pub fn precompute(points: &[GeoPoint]) -> PolylineMetrics {
    let mut segment_lengths = Vec::with_capacity(points.len().saturating_sub(1));
    let mut cumulative = Vec::with_capacity(points.len().max(1));
    cumulative.push(0.0);
    for pair in points.windows(2) {
        let d = haversine_m(pair[0], pair[1]);
        segment_lengths.push(d);
        let prev = cumulative.last().copied().unwrap_or(0.0);
        cumulative.push(prev + d);
    }
    let total = cumulative.last().copied().unwrap_or(0.0);
    PolylineMetrics {
        segment_lengths,
        cumulative,
        total,
    }
}

/// Index of the segment containing arc-length `s`.
///
/// `s` is clamped to `[0, total]`; the result is always in `[0, n - 2]` for a
/// table of `n` cumulative entries (and `0` for degenerate tables).
pub fn segment_index_for(cumulative: &[f64], s: f64) -> usize {
    if cumulative.len() <= 1 {
        return 0;
    }
    let total = cumulative[cumulative.len() - 1];
    let s = s.clamp(0.0, total);
    let (mut lo, mut hi) = (0usize, cumulative.len() - 1);
    while lo + 1 < hi {
        let mid = (lo + hi) / 2;
        if s < cumulative[mid] {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    lo.min(cumulative.len() - 2)
}

/// Drop consecutive points closer than `epsilon` degrees to their predecessor.
pub fn dedup_points(points: impl IntoIterator<Item = GeoPoint>, epsilon: f64) -> Vec<GeoPoint> {
    let mut out: Vec<GeoPoint> = Vec::new();
    for point in points {
        push_dedup(&mut out, point, epsilon);
    }
    out
}

/// Append `point` unless it repeats the current last point.
pub(crate) fn push_dedup(out: &mut Vec<GeoPoint>, point: GeoPoint, epsilon: f64) {
    if out.last().map_or(true, |last| !almost_equal(*last, point, epsilon)) {
        out.push(point);
    }
}

/// Summed haversine length of a point sequence.
pub fn polyline_length_m(points: &[GeoPoint]) -> f64 {
    points.windows(2).map(|p| haversine_m(p[0], p[1])).sum()
}

/// A drivable path with arc-length lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Polyline {
    points: Vec<GeoPoint>,
    #[serde(skip)]
    metrics: PolylineMetrics,
    #[serde(skip)]
    node_tags: Vec<Option<WaypointKind>>,
}

impl Polyline {
    /// Dedup `points` and build the metric tables.
    ///
    /// Fails with [`CoreError::NoRoute`] when fewer than two distinct points remain.
    pub fn from_points(points: impl IntoIterator<Item = GeoPoint>) -> CoreResult<Self> {
        let points = dedup_points(points, DEDUP_EPSILON_DEG);
        if points.len() < 2 {
            return Err(CoreError::NoRoute(format!(
                "polyline needs at least two distinct points, got {}",
                points.len()
            )));
        }
        let metrics = precompute(&points);
        let node_tags = vec![None; points.len()];
        Ok(Self {
            points,
            metrics,
            node_tags,
        })
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> GeoPoint {
        self.points[0]
    }

    pub fn last(&self) -> GeoPoint {
        self.points[self.points.len() - 1]
    }

    pub fn metrics(&self) -> &PolylineMetrics {
        &self.metrics
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.metrics.cumulative
    }

    pub fn total_m(&self) -> f64 {
        self.metrics.total
    }

    pub fn segment_index_for(&self, s: f64) -> usize {
        segment_index_for(&self.metrics.cumulative, s)
    }

    /// Arc-length at which segment `idx` ends.
    pub fn segment_end(&self, idx: usize) -> f64 {
        self.metrics.cumulative[(idx + 1).min(self.points.len() - 1)]
    }

    /// Interpolated coordinate at arc-length `s` (clamped to the path).
    pub fn point_at(&self, s: f64) -> GeoPoint {
        let total = self.metrics.total;
        if s >= total {
            return self.last();
        }
        if s <= 0.0 {
            return self.first();
        }
        let idx = self.segment_index_for(s);
        let seg_len = self.metrics.segment_lengths[idx];
        let a = self.points[idx];
        let b = self.points[idx + 1];
        if seg_len <= 0.0 {
            return a;
        }
        let t = ((s - self.metrics.cumulative[idx]) / seg_len).clamp(0.0, 1.0);
        GeoPoint::new(a.lat + (b.lat - a.lat) * t, a.lon + (b.lon - a.lon) * t)
    }

    /// Index of the node whose arc-length is closest to `s`. Ties go to the earlier node.
    pub fn nearest_node(&self, s: f64) -> usize {
        let idx = self.segment_index_for(s);
        let cum = &self.metrics.cumulative;
        if (cum[idx + 1] - s).abs() < (s - cum[idx]).abs() {
            idx + 1
        } else {
            idx
        }
    }

    pub fn is_final_node(&self, idx: usize) -> bool {
        idx + 1 == self.points.len()
    }

    pub fn node_tag(&self, idx: usize) -> Option<WaypointKind> {
        self.node_tags.get(idx).copied().flatten()
    }

    /// Tag the nodes nearest to each waypoint with the waypoint's kind.
    ///
    /// Waypoints are matched in visiting order and the search never moves
    /// backwards along the path, so a route that revisits a place keeps its
    /// tags in sequence.
    pub fn tag_waypoints(&mut self, waypoints: &[Waypoint]) {
        let mut from = 0usize;
        for waypoint in waypoints {
            let Some(best) = (from..self.points.len()).min_by(|&i, &j| {
                haversine_m(self.points[i], waypoint.point)
                    .total_cmp(&haversine_m(self.points[j], waypoint.point))
            }) else {
                break;
            };
            // School wins over a house sharing the same node
            if self.node_tags[best] != Some(WaypointKind::School) {
                self.node_tags[best] = Some(waypoint.kind);
            }
            from = best;
        }
    }
}
