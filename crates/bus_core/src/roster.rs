//! Roster gateway: where a bus's stops come from.
//!
//! The real implementation lives with the persistent store; this crate only
//! needs the three read operations below. [`InMemoryRoster`] backs the CLI
//! and the tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::geo::GeoPoint;

pub type BusId = u64;

/// A pickup point: an active student's home.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeRecord {
    pub id: u64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl HomeRecord {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// The school a bus delivers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl SchoolRecord {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// Fixed start of a route: a configured first stop or the last known position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOrigin {
    pub name: String,
    pub point: GeoPoint,
}

pub trait RosterGateway: Send + Sync {
    /// Active students with known home coordinates. Unknown bus → `NotFound`.
    fn assigned_homes(&self, bus: BusId) -> CoreResult<Vec<HomeRecord>>;

    /// Unknown bus or school without coordinates → `NotFound`.
    fn school(&self, bus: BusId) -> CoreResult<SchoolRecord>;

    fn route_origin(&self, bus: BusId) -> CoreResult<Option<RouteOrigin>>;
}

/// One bus as stored by [`InMemoryRoster`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusRoster {
    pub id: BusId,
    #[serde(default)]
    pub homes: Vec<StudentRecord>,
    pub school: Option<SchoolRecord>,
    #[serde(default)]
    pub origin: Option<RouteOrigin>,
}

/// Student row: only active students with both coordinates are pickup points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: u64,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default)]
pub struct InMemoryRoster {
    buses: RwLock<HashMap<BusId, BusRoster>>,
}

impl InMemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_buses(buses: impl IntoIterator<Item = BusRoster>) -> Self {
        let roster = Self::new();
        for bus in buses {
            roster.insert(bus);
        }
        roster
    }

    pub fn insert(&self, bus: BusRoster) {
        if let Ok(mut buses) = self.buses.write() {
            buses.insert(bus.id, bus);
        }
    }

    fn with_bus<T>(
        &self,
        bus: BusId,
        f: impl FnOnce(&BusRoster) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let buses = self
            .buses
            .read()
            .map_err(|_| CoreError::NotFound(format!("roster unavailable for bus {}", bus)))?;
        let entry = buses
            .get(&bus)
            .ok_or_else(|| CoreError::NotFound(format!("bus {} not found", bus)))?;
        f(entry)
    }
}

impl RosterGateway for InMemoryRoster {
    fn assigned_homes(&self, bus: BusId) -> CoreResult<Vec<HomeRecord>> {
        self.with_bus(bus, |entry| {
            Ok(entry
                .homes
                .iter()
                .filter(|s| s.active)
                .filter_map(|s| match (s.lat, s.lon) {
                    (Some(lat), Some(lon)) => Some(HomeRecord {
                        id: s.id,
                        name: s.name.clone(),
                        lat,
                        lon,
                    }),
                    _ => None,
                })
                .collect())
        })
    }

    fn school(&self, bus: BusId) -> CoreResult<SchoolRecord> {
        self.with_bus(bus, |entry| {
            entry.school.clone().ok_or_else(|| {
                CoreError::NotFound(format!("school for bus {} has no coordinates", bus))
            })
        })
    }

    fn route_origin(&self, bus: BusId) -> CoreResult<Option<RouteOrigin>> {
        self.with_bus(bus, |entry| Ok(entry.origin.clone()))
    }
}
