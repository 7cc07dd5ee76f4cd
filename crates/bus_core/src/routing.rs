//! Road-routing providers: trait abstraction over the external router.
//!
//! Two implementations:
//!
//! - **`OfflineRouter`**: always reports the provider as unavailable, so the
//!   path builder degrades to straight lines. Zero dependencies.
//! - **`OsrmRouter`** (feature `osrm`): calls an OSRM HTTP endpoint.
//!
//! The provider is shared as an `Arc<dyn RoadRouter>`; tests swap in a fake.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GeoPoint;

pub mod path;

#[cfg(feature = "osrm")]
pub mod osrm;

/// Geometry and length of a routed path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadRoute {
    /// Points along the road network, in driving order.
    pub geometry: Vec<GeoPoint>,
    /// Provider-reported length in metres, when it sent one.
    pub distance_m: Option<f64>,
}

/// Failures from a routing provider. These never escape the path builder.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[cfg(feature = "osrm")]
    #[error("routing request failed: {0}")]
    Http(reqwest::Error),

    #[cfg(feature = "osrm")]
    #[error("malformed routing response: {0}")]
    Json(reqwest::Error),

    #[error("routing provider answered HTTP {0}")]
    Status(u16),

    #[error("routing provider error: {0}")]
    Api(String),

    #[error("routing response had no usable geometry")]
    NoGeometry,

    #[error("routing provider unavailable")]
    Unavailable,
}

impl RoutingError {
    /// Whether retrying the same request may succeed (HTTP 429, 5xx, transport failures).
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "osrm")]
            RoutingError::Http(_) => true,
            RoutingError::Status(code) => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }
}

/// Read-only, rate-limited road network lookups. Implementations must be
/// `Send + Sync` so one provider can serve concurrent route requests.
pub trait RoadRouter: Send + Sync {
    /// Route through `coords` in order. `radius_m` bounds how far each
    /// coordinate may be moved onto the network; `None` is unconstrained.
    fn route(&self, coords: &[GeoPoint], radius_m: Option<f64>) -> Result<RoadRoute, RoutingError>;

    /// Closest point on the road network to `point`.
    fn nearest(&self, point: GeoPoint) -> Result<GeoPoint, RoutingError>;
}

/// Provider used when no routing endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRouter;

impl RoadRouter for OfflineRouter {
    fn route(
        &self,
        _coords: &[GeoPoint],
        _radius_m: Option<f64>,
    ) -> Result<RoadRoute, RoutingError> {
        Err(RoutingError::Unavailable)
    }

    fn nearest(&self, _point: GeoPoint) -> Result<GeoPoint, RoutingError> {
        Err(RoutingError::Unavailable)
    }
}
