use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use glam::{Mat4, Vec2, Vec3};
use orrery_labels::{LabelCandidate, LabelCollisionGrid};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn candidates(n: usize) -> Vec<LabelCandidate> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    (0..n)
        .map(|_| {
            let anchor = Vec3::new(
                rng.random_range(-400.0..400.0),
                rng.random_range(-20.0..20.0),
                rng.random_range(-400.0..400.0),
            );
            LabelCandidate::new(anchor, Vec2::new(90.0, 18.0))
        })
        .collect()
}

fn bench_evaluate(c: &mut Criterion) {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 600.0, 900.0), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 100_000.0, 0.1);
    let view_proj = proj * view;

    let mut group = c.benchmark_group("label_grid_evaluate");
    for n in [100usize, 1_000, 10_000] {
        let labels = candidates(n);
        let mut grid = LabelCollisionGrid::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &labels, |b, labels| {
            b.iter(|| {
                let out = grid.evaluate(black_box(view_proj), (1920, 1080), labels);
                black_box(out.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
