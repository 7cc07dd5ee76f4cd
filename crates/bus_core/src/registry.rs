//! Simulation registry: the single owner of the bus → running simulation map.
//!
//! Each running bus has one [`Ticker`] thread that locks the bus's
//! [`SimulationState`], checks its cancel token, ticks, and writes the new
//! position to the telemetry sink before releasing the lock. Replacing or
//! stopping a simulation cancels the token and then waits for that lock, so
//! once `start` or `stop` returns no tick of the old simulation can run.
//!
//! Lock order: the entries map is never acquired while a state lock is held.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::clock::Clock;
use crate::engine::{SimulationState, TickOutcome};
use crate::error::{CoreError, CoreResult};
use crate::params::{SimParams, SimParamsOverride};
use crate::planner::{PlanOptions, RoutePlanner, RouteStart};
use crate::roster::BusId;
use crate::route::Route;
use crate::telemetry::{TelemetryRecord, TelemetrySink};
use crate::ticker::{CancelToken, TickControl, Ticker};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Also append every simulated position to the telemetry history.
    pub append_history: bool,
    /// Base parameters that per-start overrides are applied to.
    pub default_params: SimParams,
    pub route_start: RouteStart,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            append_history: false,
            default_params: SimParams::default(),
            route_start: RouteStart::RouteOrigin,
        }
    }
}

/// Returned by [`SimulationRegistry::start`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartHandle {
    pub bus: BusId,
    pub started_at_ms: u64,
    pub waypoint_count: usize,
    pub distance_m: f64,
    pub params: SimParams,
}

/// Answer to a location query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    pub at_ms: u64,
    /// Only ever true for a simulated position.
    pub reached_end: bool,
    /// `false` when the position came from stored telemetry.
    pub simulated: bool,
}

struct Entry {
    generation: u64,
    state: Arc<Mutex<SimulationState>>,
    ticker: Ticker,
}

type Entries = Arc<Mutex<HashMap<BusId, Entry>>>;

fn lock_entries(entries: &Mutex<HashMap<BusId, Entry>>) -> MutexGuard<'_, HashMap<BusId, Entry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait until no tick of `entry` is in flight.
fn settle(entry: &Entry) {
    entry.ticker.cancel();
    drop(entry.state.lock());
}

pub struct SimulationRegistry {
    planner: RoutePlanner,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
    entries: Entries,
    next_generation: AtomicU64,
}

impl SimulationRegistry {
    pub fn new(
        planner: RoutePlanner,
        telemetry: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            planner: planner.with_positions(telemetry.clone()),
            telemetry,
            clock,
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn planner(&self) -> &RoutePlanner {
        &self.planner
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Compute the current route for `bus`. Nothing is stored.
    pub fn route(&self, bus: BusId) -> CoreResult<Route> {
        self.planner.plan_with(
            bus,
            PlanOptions {
                start: self.config.route_start,
                recompute_order: true,
            },
        )
    }

    /// Start simulating `bus`, replacing any simulation already running for it.
    pub fn start(&self, bus: BusId, overrides: SimParamsOverride) -> CoreResult<StartHandle> {
        let params = overrides.apply(self.config.default_params);
        params.validate()?;

        let route = self.planner.plan_with(
            bus,
            PlanOptions {
                start: self.config.route_start,
                recompute_order: overrides.recompute_order.unwrap_or(true),
            },
        )?;
        let waypoint_count = route.waypoint_count();
        let distance_m = route.distance_m;

        let started_at_ms = self.clock.now_ms();
        let state = Arc::new(Mutex::new(SimulationState::new(
            Arc::new(route.polyline),
            params,
            started_at_ms,
        )));
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let token = CancelToken::new();

        let mut entries = lock_entries(&self.entries);
        if let Some(old) = entries.remove(&bus) {
            settle(&old);
            info!("replacing running simulation for bus {}", bus);
        }

        let on_tick = self.tick_fn(bus, generation, state.clone(), token.clone());
        let ticker = Ticker::spawn(
            format!("bus-sim-{}", bus),
            Duration::from_millis(params.tick_ms),
            token,
            on_tick,
        )
        .map_err(|err| CoreError::Scheduler(err.to_string()))?;
        entries.insert(
            bus,
            Entry {
                generation,
                state,
                ticker,
            },
        );

        info!(
            "started simulation for bus {}: {} waypoints, {:.0} m",
            bus, waypoint_count, distance_m
        );
        Ok(StartHandle {
            bus,
            started_at_ms,
            waypoint_count,
            distance_m,
            params,
        })
    }

    /// Stop simulating `bus`. Returns whether a simulation was running.
    /// Safe to call at any time and any number of times.
    pub fn stop(&self, bus: BusId) -> bool {
        let removed = lock_entries(&self.entries).remove(&bus);
        match removed {
            Some(entry) => {
                settle(&entry);
                info!("stopped simulation for bus {}", bus);
                true
            }
            None => false,
        }
    }

    /// Stop every running simulation.
    pub fn stop_all(&self) {
        let drained: Vec<(BusId, Entry)> = lock_entries(&self.entries).drain().collect();
        for (bus, entry) in drained {
            settle(&entry);
            debug!("stopped simulation for bus {}", bus);
        }
    }

    pub fn is_running(&self, bus: BusId) -> bool {
        lock_entries(&self.entries).contains_key(&bus)
    }

    pub fn running_count(&self) -> usize {
        lock_entries(&self.entries).len()
    }

    /// Current position of `bus`: the live simulation if one is running,
    /// otherwise the last stored telemetry.
    pub fn location(&self, bus: BusId) -> CoreResult<Position> {
        let state = lock_entries(&self.entries)
            .get(&bus)
            .map(|entry| entry.state.clone());
        if let Some(state) = state {
            let snapshot = state.lock().unwrap_or_else(PoisonError::into_inner).snapshot();
            return Ok(Position {
                lat: snapshot.point.lat,
                lon: snapshot.point.lon,
                heading: snapshot.heading,
                at_ms: snapshot.at_ms,
                reached_end: snapshot.reached_end,
                simulated: true,
            });
        }

        match self.telemetry.read_current(bus) {
            Ok(Some(record)) => Ok(Position {
                lat: record.lat,
                lon: record.lon,
                heading: record.heading,
                at_ms: record.updated_at_ms,
                reached_end: false,
                simulated: false,
            }),
            Ok(None) => Err(CoreError::NotFound(format!("no position known for bus {}", bus))),
            Err(err) => {
                warn!("telemetry read for bus {} failed: {}", bus, err);
                Err(CoreError::NotFound(format!("no position known for bus {}", bus)))
            }
        }
    }

    fn tick_fn(
        &self,
        bus: BusId,
        generation: u64,
        state: Arc<Mutex<SimulationState>>,
        token: CancelToken,
    ) -> impl FnMut() -> TickControl + Send + 'static {
        let clock = self.clock.clone();
        let telemetry = self.telemetry.clone();
        let entries = self.entries.clone();
        let append_history = self.config.append_history;

        move || {
            let arrived = {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if token.is_cancelled() {
                    return TickControl::Stop;
                }
                let now = clock.now_ms();
                let outcome = state.tick(now);
                let record = TelemetryRecord::new(state.position(), state.heading(), now);
                if let Err(err) = telemetry.upsert_current(bus, record) {
                    warn!("telemetry write for bus {} failed: {}", bus, err);
                }
                if append_history {
                    if let Err(err) = telemetry.append_log(bus, record) {
                        debug!("telemetry history append for bus {} failed: {}", bus, err);
                    }
                }
                matches!(outcome, TickOutcome::Arrived | TickOutcome::Finished)
            };

            if !arrived {
                return TickControl::Continue;
            }
            token.cancel();
            let mut entries = lock_entries(&entries);
            if entries.get(&bus).is_some_and(|e| e.generation == generation) {
                entries.remove(&bus);
            }
            info!("bus {} reached the end of its route", bus);
            TickControl::Stop
        }
    }
}

impl Drop for SimulationRegistry {
    fn drop(&mut self) {
        for entry in lock_entries(&self.entries).values() {
            entry.ticker.cancel();
        }
    }
}
