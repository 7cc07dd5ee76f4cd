//! OSRM-backed [`RoadRouter`](super::RoadRouter).
//!
//! Wraps a blocking HTTP client for the `/route` and `/nearest` services and
//! keeps the wire format private to this module.

mod client;
mod parser;
mod radius;
mod response;


pub use client::OsrmRouter;
