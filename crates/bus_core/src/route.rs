//! Waypoints and the routes built from them.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::polyline::Polyline;

/// What a stop is. The order of waypoints in a [`Route`] is the visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    /// Depot, configured first stop or the bus's last known position.
    Origin,
    /// A student's home.
    House,
    /// The destination school.
    School,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub kind: WaypointKind,
    /// External identifier (student id for houses).
    pub id: Option<u64>,
    pub name: String,
    pub point: GeoPoint,
}

impl Waypoint {
    pub fn new(
        kind: WaypointKind,
        id: Option<u64>,
        name: impl Into<String>,
        point: GeoPoint,
    ) -> Self {
        Self {
            kind,
            id,
            name: name.into(),
            point,
        }
    }

    pub fn origin(name: impl Into<String>, point: GeoPoint) -> Self {
        Self::new(WaypointKind::Origin, None, name, point)
    }

    pub fn house(id: u64, name: impl Into<String>, point: GeoPoint) -> Self {
        Self::new(WaypointKind::House, Some(id), name, point)
    }

    pub fn school(name: impl Into<String>, point: GeoPoint) -> Self {
        Self::new(WaypointKind::School, None, name, point)
    }
}

/// Ordered stops plus the drivable geometry between them.
///
/// Routes are rebuilt on every request and never stored.
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub waypoints: Vec<Waypoint>,
    pub polyline: Polyline,
    pub distance_m: f64,
}

impl Route {
    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }
}
