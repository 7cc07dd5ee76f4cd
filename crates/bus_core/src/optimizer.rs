//! Stop ordering: shortest open path from an optional origin through every
//! pickup point to a fixed finish.
//!
//! - Up to [`EXACT_LIMIT`] points: exact Held-Karp style bitmask DP, `O(n² · 2ⁿ)`.
//! - Above that: nearest-neighbour seed improved by 2-opt. This is a local
//!   search without an optimality bound.
//!
//! Everything here is a pure function over coordinate slices and returns new
//! orderings; nothing is cached or shared.

use crate::geo::{haversine_m, GeoPoint};
use crate::route::Waypoint;

/// Largest instance solved exactly (4096 masks × 12 end points).
pub const EXACT_LIMIT: usize = 12;

/// Minimum gain (metres) for a 2-opt move to count as an improvement.
const TWO_OPT_MIN_GAIN_M: f64 = 1e-3;

/// Maximum number of full 2-opt sweeps.
const TWO_OPT_MAX_PASSES: usize = 25;

const NO_PARENT: usize = usize::MAX;

/// Anything with a coordinate can be ordered.
pub trait Located {
    fn location(&self) -> GeoPoint;
}

impl Located for GeoPoint {
    fn location(&self) -> GeoPoint {
        *self
    }
}

impl Located for Waypoint {
    fn location(&self) -> GeoPoint {
        self.point
    }
}

/// Return `items` in the visiting order that minimises
/// `origin → items… → finish`.
///
/// Empty and single-element inputs are returned unchanged.
pub fn order<T: Located + Clone>(
    items: &[T],
    origin: Option<GeoPoint>,
    finish: GeoPoint,
) -> Vec<T> {
    let points: Vec<GeoPoint> = items.iter().map(Located::location).collect();
    order_indices(&points, origin, finish)
        .into_iter()
        .map(|idx| items[idx].clone())
        .collect()
}

/// Index form of [`order`].
pub fn order_indices(
    points: &[GeoPoint],
    origin: Option<GeoPoint>,
    finish: GeoPoint,
) -> Vec<usize> {
    match points.len() {
        0 => Vec::new(),
        1 => vec![0],
        n if n <= EXACT_LIMIT => {
            solve_exact(points, origin, finish).unwrap_or_else(|| (0..n).collect())
        }
        _ => {
            let seed = nearest_neighbor_order(points, origin);
            two_opt_optimize(points, seed, origin, finish)
        }
    }
}

/// Exact minimum-length ordering via bitmask DP.
///
/// `dp[mask][last]` is the cheapest path that starts at `origin` (cost 0 when
/// absent), visits exactly `mask` and ends at `last`. Returns `None` when the
/// instance exceeds [`EXACT_LIMIT`].
pub fn solve_exact(
    points: &[GeoPoint],
    origin: Option<GeoPoint>,
    finish: GeoPoint,
) -> Option<Vec<usize>> {
    let n = points.len();
    if n == 0 {
        return Some(Vec::new());
    }
    if n > EXACT_LIMIT {
        return None;
    }

    let dist: Vec<Vec<f64>> = points
        .iter()
        .map(|a| points.iter().map(|b| haversine_m(*a, *b)).collect())
        .collect();
    let finish_dist: Vec<f64> = points.iter().map(|p| haversine_m(*p, finish)).collect();

    let size = 1usize << n;
    let mut dp = vec![f64::INFINITY; size * n];
    let mut parent = vec![NO_PARENT; size * n];

    for (i, point) in points.iter().enumerate() {
        dp[(1 << i) * n + i] = origin.map_or(0.0, |o| haversine_m(o, *point));
    }

    for mask in 1..size {
        for last in 0..n {
            let cost = dp[mask * n + last];
            if !cost.is_finite() {
                continue;
            }
            for next in 0..n {
                if mask & (1 << next) != 0 {
                    continue;
                }
                let next_mask = mask | (1 << next);
                let candidate = cost + dist[last][next];
                if candidate < dp[next_mask * n + next] {
                    dp[next_mask * n + next] = candidate;
                    parent[next_mask * n + next] = last;
                }
            }
        }
    }

    let full = size - 1;
    let mut best_cost = f64::INFINITY;
    let mut best_last = NO_PARENT;
    for last in 0..n {
        let cost = dp[full * n + last] + finish_dist[last];
        if cost < best_cost {
            best_cost = cost;
            best_last = last;
        }
    }
    if best_last == NO_PARENT {
        return None;
    }

    let mut order = Vec::with_capacity(n);
    let mut mask = full;
    let mut current = best_last;
    while current != NO_PARENT {
        order.push(current);
        let prev = parent[mask * n + current];
        mask &= !(1 << current);
        current = prev;
    }
    order.reverse();
    Some(order)
}

/// Greedy ordering: always drive to the closest unvisited point.
///
/// Starts from `origin` when given, otherwise from the first input point.
/// Ties keep the earliest input index.
pub fn nearest_neighbor_order(points: &[GeoPoint], origin: Option<GeoPoint>) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut order = Vec::with_capacity(points.len());

    let mut current = match origin {
        Some(start) => start,
        None => {
            if remaining.is_empty() {
                return order;
            }
            let first = remaining.remove(0);
            order.push(first);
            points[first]
        }
    };

    while !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best = f64::INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let d = haversine_m(current, points[idx]);
            if d < best {
                best = d;
                best_pos = pos;
            }
        }
        let next = remaining.remove(best_pos);
        order.push(next);
        current = points[next];
    }
    order
}

/// Improve `order` by reversing sub-ranges until no move gains more than
/// 1 mm, or after `min(25, n²)` sweeps.
pub fn two_opt_optimize(
    points: &[GeoPoint],
    order: Vec<usize>,
    origin: Option<GeoPoint>,
    finish: GeoPoint,
) -> Vec<usize> {
    let n = order.len();
    if n < 2 {
        return order;
    }

    let mut best = order;
    let mut best_len = path_length(points, &best, origin, finish);
    let max_passes = TWO_OPT_MAX_PASSES.min(n * n);
    let mut passes = 0;
    let mut improved = true;

    while improved && passes < max_passes {
        improved = false;
        passes += 1;
        for i in 0..n - 1 {
            for k in i + 1..n {
                let mut candidate = best.clone();
                candidate[i..=k].reverse();
                let len = path_length(points, &candidate, origin, finish);
                if len + TWO_OPT_MIN_GAIN_M < best_len {
                    best = candidate;
                    best_len = len;
                    improved = true;
                }
            }
        }
    }
    best
}

/// Length of `origin → points[order]… → finish` in metres.
pub fn path_length(
    points: &[GeoPoint],
    order: &[usize],
    origin: Option<GeoPoint>,
    finish: GeoPoint,
) -> f64 {
    let mut total = 0.0;
    let mut prev = origin;
    for &idx in order {
        let point = points[idx];
        if let Some(p) = prev {
            total += haversine_m(p, point);
        }
        prev = Some(point);
    }
    if let Some(p) = prev {
        total += haversine_m(p, finish);
    }
    total
}
