#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use bus_core::engine::{SimulationState, TickOutcome};
use bus_core::geo::GeoPoint;
use bus_core::optimizer::path_length;
use rand::rngs::StdRng;
use rand::Rng;

/// Points scattered over roughly a 5 km square near the origin.
pub fn random_points(rng: &mut StdRng, n: usize) -> Vec<GeoPoint> {
    (0..n)
        .map(|_| GeoPoint::new(rng.gen_range(-0.02..0.02), rng.gen_range(-0.02..0.02)))
        .collect()
}

/// Shortest `origin → points… → finish` length over every permutation.
pub fn brute_force_length(points: &[GeoPoint], origin: Option<GeoPoint>, finish: GeoPoint) -> f64 {
    let mut order: Vec<usize> = (0..points.len()).collect();
    let mut best = f64::INFINITY;
    permute(&mut order, 0, &mut |perm| {
        best = best.min(path_length(points, perm, origin, finish));
    });
    best
}

fn permute(items: &mut Vec<usize>, k: usize, visit: &mut impl FnMut(&[usize])) {
    if k == items.len() {
        visit(items);
        return;
    }
    for i in k..items.len() {
        items.swap(k, i);
        permute(items, k + 1, visit);
        items.swap(k, i);
    }
}

/// Tick `state` every `step_ms` from `start_ms` until it arrives or `limit_ms`
/// passes. Returns the time of arrival and every outcome seen.
pub fn run_to_end(
    state: &mut SimulationState,
    start_ms: u64,
    step_ms: u64,
    limit_ms: u64,
) -> (Option<u64>, Vec<TickOutcome>) {
    let mut outcomes = Vec::new();
    let mut now = start_ms;
    while now - start_ms < limit_ms {
        now += step_ms;
        let outcome = state.tick(now);
        outcomes.push(outcome);
        if outcome == TickOutcome::Arrived {
            return (Some(now), outcomes);
        }
    }
    (None, outcomes)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
