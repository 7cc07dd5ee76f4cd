//! Test doubles and fixtures shared by unit tests, integration tests and benches.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::ManualClock;
use crate::geo::GeoPoint;
use crate::params::SimParamsOverride;
use crate::planner::RoutePlanner;
use crate::registry::{RegistryConfig, SimulationRegistry};
use crate::roster::{BusId, BusRoster, InMemoryRoster, RouteOrigin, SchoolRecord, StudentRecord};
use crate::routing::path::PathBuilderConfig;
use crate::routing::{RoadRoute, RoadRouter, RoutingError};
use crate::telemetry::{InMemoryTelemetry, TelemetryError, TelemetryRecord, TelemetrySink};

/// What [`FakeRouter`] answers once its script is exhausted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FakeBehavior {
    /// Echo the coordinates with a midpoint inserted in every leg.
    Straight,
    /// Fail with this HTTP status.
    Status(u16),
    Unavailable,
}

/// One recorded `route` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCall {
    pub coords: Vec<GeoPoint>,
    pub radius_m: Option<f64>,
}

/// Scriptable in-process routing provider.
pub struct FakeRouter {
    behavior: FakeBehavior,
    script: Mutex<VecDeque<Result<RoadRoute, RoutingError>>>,
    snap_offset_deg: Option<f64>,
    calls: Mutex<Vec<RouteCall>>,
    nearest_calls: AtomicUsize,
}

impl FakeRouter {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            script: Mutex::new(VecDeque::new()),
            snap_offset_deg: None,
            calls: Mutex::new(Vec::new()),
            nearest_calls: AtomicUsize::new(0),
        }
    }

    pub fn straight() -> Self {
        Self::new(FakeBehavior::Straight)
    }

    /// `nearest` moves every point north by `deg`. Without this, snapping fails.
    pub fn with_snap_offset(mut self, deg: f64) -> Self {
        self.snap_offset_deg = Some(deg);
        self
    }

    /// Queue a response for the next `route` call.
    pub fn push_response(&self, response: Result<RoadRoute, RoutingError>) {
        self.script
            .lock()
            .expect("script lock")
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<RouteCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn route_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn nearest_calls(&self) -> usize {
        self.nearest_calls.load(Ordering::SeqCst)
    }
}

/// Coordinates with the midpoint of every consecutive pair inserted.
pub fn with_midpoints(coords: &[GeoPoint]) -> Vec<GeoPoint> {
    let mut out = Vec::with_capacity(coords.len() * 2);
    for pair in coords.windows(2) {
        out.push(pair[0]);
        out.push(GeoPoint::new(
            (pair[0].lat + pair[1].lat) / 2.0,
            (pair[0].lon + pair[1].lon) / 2.0,
        ));
    }
    out.extend(coords.last().copied());
    out
}

impl RoadRouter for FakeRouter {
    fn route(&self, coords: &[GeoPoint], radius_m: Option<f64>) -> Result<RoadRoute, RoutingError> {
        self.calls.lock().expect("calls lock").push(RouteCall {
            coords: coords.to_vec(),
            radius_m,
        });
        if let Some(scripted) = self.script.lock().expect("script lock").pop_front() {
            return scripted;
        }
        match self.behavior {
            FakeBehavior::Straight => Ok(RoadRoute {
                geometry: with_midpoints(coords),
                distance_m: None,
            }),
            FakeBehavior::Status(code) => Err(RoutingError::Status(code)),
            FakeBehavior::Unavailable => Err(RoutingError::Unavailable),
        }
    }

    fn nearest(&self, point: GeoPoint) -> Result<GeoPoint, RoutingError> {
        self.nearest_calls.fetch_add(1, Ordering::SeqCst);
        match self.snap_offset_deg {
            Some(offset) => Ok(GeoPoint::new(point.lat + offset, point.lon)),
            None => Err(RoutingError::NoGeometry),
        }
    }
}

/// Sink whose every operation fails; counts attempted writes.
#[derive(Debug, Default)]
pub struct FailingTelemetry {
    writes: AtomicUsize,
}

impl FailingTelemetry {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl TelemetrySink for FailingTelemetry {
    fn upsert_current(&self, _bus: BusId, _record: TelemetryRecord) -> Result<(), TelemetryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(TelemetryError::Unavailable("test sink".to_string()))
    }

    fn append_log(&self, _bus: BusId, _record: TelemetryRecord) -> Result<(), TelemetryError> {
        Err(TelemetryError::Unavailable("test sink".to_string()))
    }

    fn read_current(&self, _bus: BusId) -> Result<Option<TelemetryRecord>, TelemetryError> {
        Err(TelemetryError::Unavailable("test sink".to_string()))
    }
}

/// Path builder settings with no sleeping between retries.
pub fn fast_path_config() -> PathBuilderConfig {
    PathBuilderConfig {
        backoff_step_ms: 0,
        ..PathBuilderConfig::default()
    }
}

pub fn student(id: u64, lat: f64, lon: f64) -> StudentRecord {
    StudentRecord {
        id,
        name: format!("student {}", id),
        active: true,
        lat: Some(lat),
        lon: Some(lon),
    }
}

/// Bus that drives due north from (0, 0) to a school at (0.001, 0), about 111 m.
pub fn short_run_bus(id: BusId) -> BusRoster {
    BusRoster {
        id,
        homes: Vec::new(),
        school: Some(SchoolRecord {
            name: "North School".to_string(),
            lat: 0.001,
            lon: 0.0,
        }),
        origin: Some(RouteOrigin {
            name: "Depot".to_string(),
            point: GeoPoint::new(0.0, 0.0),
        }),
    }
}

/// Parameters of the 111 m run: 10 m/s cap, no dwells, 100 ms ticks.
pub fn short_run_params() -> SimParamsOverride {
    SimParamsOverride {
        min_speed: Some(2.0),
        max_speed: Some(10.0),
        accel: Some(2.0),
        decel: Some(2.0),
        brake_dist: Some(20.0),
        dwell_at_house: Some(0.0),
        dwell_at_school: Some(0.0),
        tick_ms: Some(100),
        recompute_order: None,
    }
}

/// Registry over an in-memory roster and sink, routed by `router`.
pub fn registry_with(
    buses: impl IntoIterator<Item = BusRoster>,
    router: Arc<dyn RoadRouter>,
    clock: Arc<ManualClock>,
    config: RegistryConfig,
) -> (SimulationRegistry, Arc<InMemoryTelemetry>) {
    let roster = Arc::new(InMemoryRoster::from_buses(buses));
    let telemetry = Arc::new(InMemoryTelemetry::new());
    let planner = RoutePlanner::with_config(roster, router, fast_path_config());
    let registry = SimulationRegistry::new(planner, telemetry.clone(), clock, config);
    (registry, telemetry)
}
