pub mod clock;
pub mod engine;
pub mod error;
pub mod geo;
pub mod optimizer;
pub mod params;
pub mod planner;
pub mod polyline;
pub mod registry;
pub mod roster;
pub mod route;
pub mod routing;
pub mod telemetry;
pub mod ticker;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{CoreError, CoreResult};
