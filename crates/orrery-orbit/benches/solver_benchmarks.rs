use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::DVec3;
use orrery_orbit::*;

fn bench_solve_near_circular(c: &mut Criterion) {
    let solver = OrbitalSolver::new();
    let el = OrbitalElements::new(1.0, 0.0167, 0.0, 102.9, 358.61);
    c.bench_function("solve_near_circular", |bencher| {
        bencher.iter(|| black_box(solver.solve(black_box(&el), black_box(12.345))))
    });
}

fn bench_solve_eccentric(c: &mut Criterion) {
    let solver = OrbitalSolver::new();
    let el = OrbitalElements::new(17.8, 0.89, 30.0, 111.0, 200.0);
    c.bench_function("solve_eccentric", |bencher| {
        bencher.iter(|| black_box(solver.solve(black_box(&el), black_box(12.345))))
    });
}

fn bench_solve_thousand_bodies(c: &mut Criterion) {
    let solver = OrbitalSolver::new();
    let bodies: Vec<OrbitalElements> = (0..1000)
        .map(|i| {
            let f = i as f64 / 1000.0;
            OrbitalElements::new(2.2 + f, 0.15 * f, 10.0 * f, 360.0 * f, 720.0 * f)
        })
        .collect();
    c.bench_function("solve_1000_bodies", |bencher| {
        bencher.iter(|| {
            let mut acc = DVec3::ZERO;
            for el in &bodies {
                acc += solver.solve(el, black_box(3.5));
            }
            black_box(acc)
        })
    });
}

fn bench_to_visual(c: &mut Criterion) {
    let scaler = CoordinateScaler::default();
    let p = DVec3::new(38.0, 2.0, -11.0);
    c.bench_function("to_visual", |bencher| {
        bencher.iter(|| black_box(scaler.to_visual(black_box(p))))
    });
}

criterion_group!(
    benches,
    bench_solve_near_circular,
    bench_solve_eccentric,
    bench_solve_thousand_bodies,
    bench_to_visual
);
criterion_main!(benches);
