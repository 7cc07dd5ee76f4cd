//! Performance benchmarks for bus_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use bus_core::engine::SimulationState;
use bus_core::geo::GeoPoint;
use bus_core::optimizer::order_indices;
use bus_core::params::SimParams;
use bus_core::polyline::Polyline;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn scattered(n: usize, seed: u64) -> Vec<GeoPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| GeoPoint::new(rng.gen_range(-0.05..0.05), rng.gen_range(-0.05..0.05)))
        .collect()
}

fn bench_stop_ordering(c: &mut Criterion) {
    let finish = GeoPoint::new(0.06, 0.06);
    let origin = Some(GeoPoint::new(-0.06, -0.06));

    let mut group = c.benchmark_group("stop_ordering");
    // 8 and 12 hit the exact solver, 30 and 60 the 2-opt heuristic
    for n in [8usize, 12, 30, 60] {
        let points = scattered(n, 42);
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, points| {
            b.iter(|| black_box(order_indices(points, origin, finish)));
        });
    }
    group.finish();
}

fn bench_polyline(c: &mut Criterion) {
    let points: Vec<GeoPoint> = (0..2_000)
        .map(|i| GeoPoint::new(i as f64 * 0.0001, (i as f64 * 0.01).sin() * 0.001))
        .collect();
    let poly = Polyline::from_points(points.clone()).expect("valid polyline");
    let total = poly.total_m();

    let mut group = c.benchmark_group("polyline");
    group.bench_function("build_2000_points", |b| {
        b.iter(|| black_box(Polyline::from_points(points.iter().copied())));
    });
    group.bench_function("point_at_sweep", |b| {
        b.iter(|| {
            let mut s = 0.0;
            while s < total {
                black_box(poly.point_at(s));
                s += 5.0;
            }
        });
    });
    group.finish();
}

fn bench_engine_tick(c: &mut Criterion) {
    let points = scattered(200, 7);
    let poly = Arc::new(Polyline::from_points(points).expect("valid polyline"));
    let params = SimParams {
        dwell_at_house: 0.0,
        dwell_at_school: 0.0,
        ..SimParams::default()
    };

    c.bench_function("engine_1000_ticks", |b| {
        b.iter(|| {
            let mut state = SimulationState::new(poly.clone(), params, 0);
            for i in 1..=1_000u64 {
                black_box(state.tick(i * 60));
            }
        });
    });
}

criterion_group!(benches, bench_stop_ordering, bench_polyline, bench_engine_tick);
criterion_main!(benches);
