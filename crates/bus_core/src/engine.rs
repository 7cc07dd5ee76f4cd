//! Vehicle simulation engine: advances one bus along its polyline.
//!
//! The state is a scalar arc-length `s` plus velocity and heading. Each tick
//! applies, in order: terminal check, dwell check, speed control with a
//! linear brake ramp before every node, semi-implicit Euler integration, end
//! snap, completion, heading low-pass and node dwell.
//!
//! Ticks take the current time as an argument and never touch a clock, the
//! telemetry sink or the registry; [`crate::registry`] does that around them.

use std::sync::Arc;

use crate::clock::ONE_SEC_MS;
use crate::geo::{bearing_deg, normalize_angle_delta, normalize_heading, GeoPoint};
use crate::params::SimParams;
use crate::polyline::Polyline;
use crate::route::WaypointKind;

/// `dt` used for the very first tick, seconds.
pub const FIRST_TICK_DT_S: f64 = 0.05;
/// Within this distance of the end the bus is placed exactly on it.
const END_SNAP_M: f64 = 3.0;
/// Within this distance of a node the bus counts as having reached it.
const NODE_TOUCH_M: f64 = 2.5;
const LOOK_AHEAD_M: f64 = 10.0;
/// Fraction of the heading error corrected per tick.
const HEADING_BLEND: f64 = 0.2;
/// Brake ramp floor as a fraction of `min_speed`.
const CREEP_FACTOR: f64 = 0.3;

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Already at the end; nothing changes.
    Finished,
    /// Stopped at a node until the dwell deadline.
    Dwelling,
    Moved,
    /// Reached a node and began dwelling there.
    DwellStarted { node: usize },
    /// Reached the end of the path on this tick.
    Arrived,
}

/// Interpolated position at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub point: GeoPoint,
    pub heading: f64,
    pub speed: f64,
    pub s: f64,
    pub reached_end: bool,
    pub at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SimulationState {
    polyline: Arc<Polyline>,
    params: SimParams,
    s: f64,
    v: f64,
    heading: f64,
    dwell_until_ms: Option<u64>,
    reached_end: bool,
    started_at_ms: u64,
    last_tick_ms: Option<u64>,
    /// Node that triggered the most recent dwell; it cannot trigger again.
    last_dwell_node: Option<usize>,
}

fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * ONE_SEC_MS as f64).round() as u64
}

impl SimulationState {
    /// Place a bus at the start of `polyline`, boarding for `dwell_at_house`
    /// seconds before it first moves.
    pub fn new(polyline: Arc<Polyline>, params: SimParams, now_ms: u64) -> Self {
        let heading = bearing_deg(polyline.first(), polyline.point_at(LOOK_AHEAD_M));
        Self {
            params,
            s: 0.0,
            v: 0.0,
            heading,
            dwell_until_ms: Some(now_ms.saturating_add(secs_to_ms(params.dwell_at_house))),
            reached_end: false,
            started_at_ms: now_ms,
            last_tick_ms: None,
            last_dwell_node: Some(0),
            polyline,
        }
    }

    pub fn polyline(&self) -> &Polyline {
        &self.polyline
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    /// Arc-length travelled, metres.
    pub fn s(&self) -> f64 {
        self.s
    }

    /// Current speed, m/s.
    pub fn v(&self) -> f64 {
        self.v
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn dwell_until_ms(&self) -> Option<u64> {
        self.dwell_until_ms
    }

    pub fn reached_end(&self) -> bool {
        self.reached_end
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn last_tick_ms(&self) -> Option<u64> {
        self.last_tick_ms
    }

    pub fn position(&self) -> GeoPoint {
        self.polyline.point_at(self.s)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            point: self.position(),
            heading: self.heading,
            speed: self.v,
            s: self.s,
            reached_end: self.reached_end,
            at_ms: self.last_tick_ms.unwrap_or(self.started_at_ms),
        }
    }

    /// Advance the simulation to `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        let dt = match self.last_tick_ms {
            Some(prev) => now_ms.saturating_sub(prev) as f64 / ONE_SEC_MS as f64,
            None => FIRST_TICK_DT_S,
        };
        self.last_tick_ms = Some(now_ms);

        if self.reached_end {
            return TickOutcome::Finished;
        }

        if let Some(until) = self.dwell_until_ms {
            if now_ms < until {
                return TickOutcome::Dwelling;
            }
            self.dwell_until_ms = None;
        }

        let total = self.polyline.total_m();
        let seg = self.polyline.segment_index_for(self.s);
        let dist_to_seg_end = (self.polyline.segment_end(seg) - self.s).max(0.0);

        let p = self.params;
        let target = if dist_to_seg_end < p.brake_dist {
            (p.min_speed * CREEP_FACTOR).max(dist_to_seg_end / p.brake_dist * p.max_speed)
        } else {
            p.max_speed
        };
        let accel = if target >= self.v { p.accel } else { -p.decel };
        self.v = (self.v + accel * dt).clamp(0.0, p.max_speed);

        self.s += self.v * dt;

        if (total - self.s).abs() <= END_SNAP_M {
            self.s = total;
        }

        if self.s >= total {
            self.s = total;
            self.v = 0.0;
            self.dwell_until_ms = Some(now_ms.saturating_add(secs_to_ms(p.dwell_at_school)));
            self.reached_end = true;
            return TickOutcome::Arrived;
        }

        let here = self.polyline.point_at(self.s);
        let ahead = self.polyline.point_at((self.s + LOOK_AHEAD_M).min(total));
        let wanted = bearing_deg(here, ahead);
        let delta = normalize_angle_delta(self.heading, wanted);
        self.heading = normalize_heading(self.heading + delta * HEADING_BLEND);

        let node = self.polyline.nearest_node(self.s);
        let node_s = self.polyline.cumulative()[node];
        if (self.s - node_s).abs() < NODE_TOUCH_M
            && self.dwell_until_ms.is_none()
            && self.last_dwell_node != Some(node)
        {
            let at_school = self.polyline.is_final_node(node)
                || self.polyline.node_tag(node) == Some(WaypointKind::School);
            let dwell = if at_school {
                p.dwell_at_school
            } else {
                p.dwell_at_house
            };
            self.dwell_until_ms = Some(now_ms.saturating_add(secs_to_ms(dwell)));
            self.v = 0.0;
            self.last_dwell_node = Some(node);
            return TickOutcome::DwellStarted { node };
        }

        TickOutcome::Moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SimParams {
        SimParams {
            min_speed: 2.0,
            max_speed: 10.0,
            accel: 2.0,
            decel: 2.0,
            brake_dist: 20.0,
            dwell_at_house: 0.0,
            dwell_at_school: 0.0,
            tick_ms: 100,
        }
    }

    fn north_line() -> Arc<Polyline> {
        Arc::new(
            Polyline::from_points([GeoPoint::new(0.0, 0.0), GeoPoint::new(0.001, 0.0)])
                .expect("valid polyline"),
        )
    }

    #[test]
    fn first_tick_uses_default_dt() {
        let mut state = SimulationState::new(north_line(), params(), 0);
        assert_eq!(state.tick(0), TickOutcome::Moved);
        assert!((state.v() - 2.0 * FIRST_TICK_DT_S).abs() < 1e-12);
        assert!((state.s() - state.v() * FIRST_TICK_DT_S).abs() < 1e-12);
    }

    #[test]
    fn bus_waits_out_the_boarding_dwell() {
        let p = SimParams {
            dwell_at_house: 1.0,
            ..params()
        };
        let mut state = SimulationState::new(north_line(), p, 0);
        assert_eq!(state.tick(100), TickOutcome::Dwelling);
        assert_eq!(state.tick(900), TickOutcome::Dwelling);
        assert_eq!(state.s(), 0.0);
        assert_eq!(state.tick(1000), TickOutcome::Moved);
        assert!(state.s() > 0.0);
        assert_eq!(state.dwell_until_ms(), None);
    }

    #[test]
    fn speed_never_exceeds_max_and_stays_on_path() {
        let mut state = SimulationState::new(north_line(), params(), 0);
        let total = state.polyline().total_m();
        let mut now = 0;
        while !state.reached_end() && now < 60_000 {
            now += 100;
            state.tick(now);
            assert!(state.v() >= 0.0 && state.v() <= 10.0);
            assert!(state.s() >= 0.0 && state.s() <= total);
        }
        assert!(state.reached_end());
        assert_eq!(state.s(), total);
        assert_eq!(state.v(), 0.0);
        assert_eq!(state.position(), GeoPoint::new(0.001, 0.0));
    }

    #[test]
    fn huge_dwells_saturate_the_deadline() {
        let p = SimParams {
            dwell_at_house: 1e17,
            ..params()
        };
        let mut state = SimulationState::new(north_line(), p, 5);
        assert_eq!(state.dwell_until_ms(), Some(u64::MAX));
        assert_eq!(state.tick(u64::MAX - 1), TickOutcome::Dwelling);

        let p = SimParams {
            dwell_at_school: 1e17,
            ..params()
        };
        let mut state = SimulationState::new(north_line(), p, 1_000);
        let mut now = 1_000;
        while state.tick(now) != TickOutcome::Arrived {
            now += 100;
            assert!(now < 120_000, "bus never arrived");
        }
        assert_eq!(state.dwell_until_ms(), Some(u64::MAX));
    }

    #[test]
    fn finished_state_ignores_further_ticks() {
        let mut state = SimulationState::new(north_line(), params(), 0);
        let mut now = 0;
        while state.tick(now) != TickOutcome::Arrived {
            now += 100;
        }
        let s = state.s();
        assert_eq!(state.tick(now + 100), TickOutcome::Finished);
        assert_eq!(state.s(), s);
    }

    #[test]
    fn brake_ramp_slows_the_bus_before_the_end() {
        let mut state = SimulationState::new(north_line(), params(), 0);
        let total = state.polyline().total_m();
        let mut now = 0;
        let mut speed_near_end = None;
        while !state.reached_end() {
            now += 100;
            state.tick(now);
            if !state.reached_end() && total - state.s() < 6.0 {
                speed_near_end = Some(state.v());
            }
        }
        let v = speed_near_end.expect("observed the final approach");
        assert!(v < 10.0, "bus should be braking, got {v}");
    }

    #[test]
    fn intermediate_node_triggers_one_dwell() {
        let poly = Arc::new(
            Polyline::from_points([
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(0.0005, 0.0),
                GeoPoint::new(0.001, 0.0),
            ])
            .expect("valid polyline"),
        );
        let p = SimParams {
            dwell_at_house: 2.0,
            ..params()
        };
        let mut state = SimulationState::new(poly, p, 0);
        let mut now = 2_000;
        let mut dwell_nodes = Vec::new();
        while !state.reached_end() && now < 120_000 {
            now += 100;
            if let TickOutcome::DwellStarted { node } = state.tick(now) {
                assert_eq!(state.v(), 0.0);
                assert_eq!(state.dwell_until_ms(), Some(now + 2_000));
                dwell_nodes.push(node);
            }
        }
        assert!(state.reached_end());
        assert_eq!(dwell_nodes, vec![1]);
    }

    #[test]
    fn heading_turns_gradually_towards_the_path() {
        let poly = Arc::new(
            Polyline::from_points([
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(0.0005, 0.0),
                GeoPoint::new(0.0005, 0.0005),
            ])
            .expect("valid polyline"),
        );
        let mut state = SimulationState::new(poly, params(), 0);
        assert!(state.heading() < 1.0 || state.heading() > 359.0);

        let mut now = 0;
        let mut max_heading: f64 = 0.0;
        while !state.reached_end() && now < 120_000 {
            now += 100;
            let before = state.heading();
            state.tick(now);
            let step = normalize_angle_delta(before, state.heading()).abs();
            assert!(step <= 90.0 * HEADING_BLEND + 1e-9, "heading jumped by {step}");
            if state.heading() < 180.0 {
                max_heading = max_heading.max(state.heading());
            }
        }
        assert!(max_heading > 45.0, "never turned east: {max_heading}");
    }
}
