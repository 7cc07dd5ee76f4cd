mod support;

use std::sync::Arc;

use bus_core::engine::{SimulationState, TickOutcome};
use bus_core::geo::GeoPoint;
use bus_core::params::SimParams;
use bus_core::polyline::Polyline;
use bus_core::route::Waypoint;
use bus_core::test_helpers::short_run_params;

use support::run_to_end;

fn short_run() -> Arc<Polyline> {
    Arc::new(
        Polyline::from_points([GeoPoint::new(0.0, 0.0), GeoPoint::new(0.001, 0.0)])
            .expect("valid polyline"),
    )
}

fn params() -> SimParams {
    short_run_params().resolve().expect("valid params")
}

#[test]
fn short_run_arrives_after_accelerating_and_braking() {
    let poly = short_run();
    assert!((poly.total_m() - 111.19).abs() < 0.1);

    let mut state = SimulationState::new(poly.clone(), params(), 0);
    let mut max_v: f64 = 0.0;
    let mut now = 0;
    let mut arrived_at = None;
    while now < 60_000 {
        now += 100;
        let outcome = state.tick(now);
        max_v = max_v.max(state.v());
        assert!(state.v() >= 0.0 && state.v() <= 10.0);
        assert!(state.s() >= 0.0 && state.s() <= poly.total_m());
        if outcome == TickOutcome::Arrived {
            arrived_at = Some(now);
            break;
        }
    }

    let arrived_at = arrived_at.expect("bus should arrive");
    assert!(
        (13_000..=14_000).contains(&arrived_at),
        "arrived after {} ms",
        arrived_at
    );
    assert!(max_v > 9.0, "bus never reached cruising speed: {}", max_v);
    assert!(state.reached_end());
    assert_eq!(state.position(), GeoPoint::new(0.001, 0.0));
}

#[test]
fn repeated_leading_point_collapses_to_one_segment() {
    let poly = Polyline::from_points([
        GeoPoint::new(0.0, 0.0),
        GeoPoint::new(0.0, 0.0),
        GeoPoint::new(0.0, 1.0),
    ])
    .expect("valid polyline");
    assert_eq!(poly.len(), 2);
    assert_eq!(poly.point_at(0.0), GeoPoint::new(0.0, 0.0));
    assert_eq!(poly.point_at(poly.total_m()), GeoPoint::new(0.0, 1.0));
}

#[test]
fn house_and_school_nodes_use_their_own_dwell() {
    let waypoints = vec![
        Waypoint::origin("Depot", GeoPoint::new(0.0, 0.0)),
        Waypoint::school("School", GeoPoint::new(0.0005, 0.0)),
        Waypoint::house(1, "Late pickup", GeoPoint::new(0.001, 0.0)),
        Waypoint::house(2, "Last pickup", GeoPoint::new(0.0015, 0.0)),
    ];
    let mut poly =
        Polyline::from_points(waypoints.iter().map(|w| w.point)).expect("valid polyline");
    poly.tag_waypoints(&waypoints);

    let params = SimParams {
        dwell_at_house: 1.0,
        dwell_at_school: 5.0,
        ..params()
    };
    let mut state = SimulationState::new(Arc::new(poly), params, 0);
    let (arrived, outcomes) = run_to_end(&mut state, 0, 100, 300_000);
    assert!(arrived.is_some());

    let dwells: Vec<usize> = outcomes
        .iter()
        .filter_map(|o| match o {
            TickOutcome::DwellStarted { node } => Some(*node),
            _ => None,
        })
        .collect();
    assert_eq!(dwells, vec![1, 2]);

    // 1 s boarding + 5 s at the school + 1 s at the house, 100 ms ticks
    let dwelling = outcomes
        .iter()
        .filter(|o| **o == TickOutcome::Dwelling)
        .count();
    assert!((65..=72).contains(&dwelling), "dwelling ticks: {}", dwelling);
}

#[test]
fn stalled_clock_does_not_move_the_bus() {
    let mut state = SimulationState::new(short_run(), params(), 1_000);
    state.tick(1_000);
    let s = state.s();
    for _ in 0..10 {
        state.tick(1_000);
    }
    assert_eq!(state.s(), s);
}

#[test]
fn coarse_ticks_still_finish_on_the_last_point() {
    let mut state = SimulationState::new(short_run(), params(), 0);
    let (arrived, _) = run_to_end(&mut state, 0, 1_000, 120_000);
    assert!(arrived.is_some());
    assert_eq!(state.s(), state.polyline().total_m());
    assert_eq!(state.v(), 0.0);
}
