//! Benchmarks for ik-core's hot-path math primitives.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{Quat, Vec3};
use ik_core::id::Id;
use ik_core::math::{clamp_to_angle, swing_twist_decompose, Transform};

fn id_generation_benchmark(c: &mut Criterion) {
    c.bench_function("id_generation", |b| {
        b.iter(|| {
            black_box(Id::new());
        });
    });
}

fn transform_compose_benchmark(c: &mut Criterion) {
    let a = Transform::new(Quat::from_axis_angle(Vec3::Y, 0.4), Vec3::new(0.0, 1.0, 0.0));
    let b = Transform::new(Quat::from_axis_angle(Vec3::X, 0.2), Vec3::new(0.0, 1.0, 0.0));

    c.bench_function("transform_compose", |bencher| {
        bencher.iter(|| black_box(a * b));
    });
}

fn swing_twist_benchmark(c: &mut Criterion) {
    let q = Quat::from_axis_angle(Vec3::new(0.3, 1.0, 0.2).normalize(), 1.1);

    c.bench_function("swing_twist_decompose", |b| {
        b.iter(|| black_box(swing_twist_decompose(q, Vec3::Y)));
    });
}

fn clamp_to_angle_benchmark(c: &mut Criterion) {
    let q = Quat::from_axis_angle(Vec3::Y, 1.5);

    c.bench_function("clamp_to_angle", |b| {
        b.iter(|| black_box(clamp_to_angle(q, 0.3)));
    });
}

criterion_group!(
    benches,
    id_generation_benchmark,
    transform_compose_benchmark,
    swing_twist_benchmark,
    clamp_to_angle_benchmark
);
criterion_main!(benches);
