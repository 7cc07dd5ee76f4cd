//! Telemetry sink: the current-position table and its append-only history.
//!
//! Simulated buses write here in the same shape a GPS device would, so
//! readers never need to know whether a position is synthetic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::geo::GeoPoint;
use crate::roster::BusId;

/// One stored position row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    /// Epoch milliseconds of the write.
    pub updated_at_ms: u64,
}

impl TelemetryRecord {
    pub fn new(point: GeoPoint, heading: f64, updated_at_ms: u64) -> Self {
        Self {
            lat: point.lat,
            lon: point.lon,
            heading,
            updated_at_ms,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TelemetryError {
    #[error("telemetry store unavailable: {0}")]
    Unavailable(String),
}

pub trait TelemetrySink: Send + Sync {
    /// Replace the bus's current-position row.
    fn upsert_current(&self, bus: BusId, record: TelemetryRecord) -> Result<(), TelemetryError>;

    /// Append to the position history. Best-effort.
    fn append_log(&self, bus: BusId, record: TelemetryRecord) -> Result<(), TelemetryError>;

    fn read_current(&self, bus: BusId) -> Result<Option<TelemetryRecord>, TelemetryError>;
}

/// Process-local sink used by the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryTelemetry {
    current: Mutex<HashMap<BusId, TelemetryRecord>>,
    history: Mutex<Vec<(BusId, TelemetryRecord)>>,
}

impl InMemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// History rows for one bus, oldest first.
    pub fn history(&self, bus: BusId) -> Vec<TelemetryRecord> {
        self.history
            .lock()
            .map(|rows| {
                rows.iter()
                    .filter(|(id, _)| *id == bus)
                    .map(|(_, record)| *record)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn poisoned(what: &str) -> TelemetryError {
    TelemetryError::Unavailable(format!("{} lock poisoned", what))
}

impl TelemetrySink for InMemoryTelemetry {
    fn upsert_current(&self, bus: BusId, record: TelemetryRecord) -> Result<(), TelemetryError> {
        self.current
            .lock()
            .map_err(|_| poisoned("current"))?
            .insert(bus, record);
        Ok(())
    }

    fn append_log(&self, bus: BusId, record: TelemetryRecord) -> Result<(), TelemetryError> {
        self.history
            .lock()
            .map_err(|_| poisoned("history"))?
            .push((bus, record));
        Ok(())
    }

    fn read_current(&self, bus: BusId) -> Result<Option<TelemetryRecord>, TelemetryError> {
        Ok(self
            .current
            .lock()
            .map_err(|_| poisoned("current"))?
            .get(&bus)
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_one_row_per_bus() {
        let sink = InMemoryTelemetry::new();
        sink.upsert_current(1, TelemetryRecord::new(GeoPoint::new(1.0, 1.0), 10.0, 100))
            .expect("write");
        sink.upsert_current(1, TelemetryRecord::new(GeoPoint::new(2.0, 2.0), 20.0, 200))
            .expect("write");

        let current = sink.read_current(1).expect("read").expect("row");
        assert_eq!(current.point(), GeoPoint::new(2.0, 2.0));
        assert_eq!(current.updated_at_ms, 200);
        assert_eq!(sink.read_current(2).expect("read"), None);
    }

    #[test]
    fn history_is_filtered_per_bus() {
        let sink = InMemoryTelemetry::new();
        let record = TelemetryRecord::new(GeoPoint::new(1.0, 1.0), 0.0, 1);
        sink.append_log(1, record).expect("append");
        sink.append_log(2, record).expect("append");
        sink.append_log(1, record).expect("append");
        assert_eq!(sink.history(1).len(), 2);
        assert_eq!(sink.history(3).len(), 0);
    }
}
