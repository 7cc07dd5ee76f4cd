//! Errors surfaced by the core operations.
//!
//! Routing-provider failures have their own type ([`crate::routing::RoutingError`])
//! and never reach this level: the path builder absorbs them.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Bus, school or coordinates missing in the roster, or no position known.
    #[error("not found: {0}")]
    NotFound(String),

    /// Not enough usable geometry to drive anything.
    #[error("no route: {0}")]
    NoRoute(String),

    #[error("invalid simulation parameters: {0}")]
    InvalidParams(String),

    #[error("could not start simulation thread: {0}")]
    Scheduler(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
