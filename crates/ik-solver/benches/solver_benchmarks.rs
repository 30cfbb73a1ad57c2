//! Benchmarks for the hot path of the solver: the QCP fit itself, a single
//! per-bone `update_optimal_rotation` pass, and full chain solves at a few
//! depths representative of a limb vs. a full spine/arm rig.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec3;
use ik_core::math::Transform;
use ik_solver::config::{IkConfig, PinConfig};
use ik_solver::driver::IkDriver;
use ik_solver::qcp::Qcp;
use ik_solver::skeleton::{HostBoneId, SkeletonProvider, TargetProvider};
use ik_core::id::Id;

fn qcp_four_point_benchmark(c: &mut Criterion) {
    let qcp = Qcp::new();
    let moved = vec![
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
    ];
    let target: Vec<Vec3> = moved.iter().map(|p| *p + Vec3::new(0.1, 0.2, -0.1)).collect();
    let weight = vec![1.0; moved.len()];

    c.bench_function("qcp_weighted_superpose_4pt", |b| {
        b.iter(|| black_box(qcp.weighted_superpose(&moved, &target, &weight, false)));
    });
}

struct ChainSkeleton {
    rest: Vec<Transform>,
    pose: Vec<Transform>,
}

impl ChainSkeleton {
    fn new(bone_count: usize) -> Self {
        let rest: Vec<Transform> = (0..bone_count)
            .map(|_| Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)))
            .collect();
        let pose = rest.clone();
        Self { rest, pose }
    }
}

impl SkeletonProvider for ChainSkeleton {
    fn bone_count(&self) -> u32 {
        self.rest.len() as u32
    }
    fn find_bone(&self, name: &str) -> Option<HostBoneId> {
        name.strip_prefix("bone").and_then(|s| s.parse().ok())
    }
    fn bone_name(&self, id: HostBoneId) -> String {
        format!("bone{id}")
    }
    fn bone_parent(&self, id: HostBoneId) -> Option<HostBoneId> {
        (id > 0).then_some(id - 1)
    }
    fn bone_children(&self, id: HostBoneId) -> Vec<HostBoneId> {
        if (id as usize) + 1 < self.rest.len() {
            vec![id + 1]
        } else {
            Vec::new()
        }
    }
    fn bone_rest_local(&self, id: HostBoneId) -> Transform {
        self.rest[id as usize]
    }
    fn bone_local_pose(&self, id: HostBoneId) -> Transform {
        self.pose[id as usize]
    }
    fn set_bone_local_pose_override(&mut self, id: HostBoneId, local: Transform, _strength: f32, _persistent: bool) {
        self.pose[id as usize] = local;
    }
    fn global_transform(&self) -> Transform {
        Transform::IDENTITY
    }
}

struct SingleTarget(Transform);

impl TargetProvider for SingleTarget {
    fn resolve_global_transform(&self, _handle: Id) -> Option<Transform> {
        Some(self.0)
    }
}

fn chain_solve_benchmark(c: &mut Criterion, bone_count: usize) {
    let mut skeleton = ChainSkeleton::new(bone_count);
    let targets = SingleTarget(Transform::from_translation(Vec3::new(
        (bone_count as f32) * 0.6,
        (bone_count as f32) * 0.6,
        0.0,
    )));

    let mut config = IkConfig::default();
    config.root_bone = "bone0".to_string();
    config.iterations_per_frame = 10;
    config.pins.push(PinConfig {
        bone: format!("bone{}", bone_count - 1),
        target: Some(Id::from_raw(1)),
        ..PinConfig::default()
    });

    let mut driver = IkDriver::new(config);
    // Force the first (dirty) rebuild outside the measured loop.
    driver.execute(&mut skeleton, &targets).expect("warm-up execute");

    c.bench_function(&format!("chain_solve_{bone_count}_bones"), |b| {
        b.iter(|| {
            black_box(driver.execute(&mut skeleton, &targets)).expect("execute");
        });
    });
}

fn chain_solve_short_benchmark(c: &mut Criterion) {
    chain_solve_benchmark(c, 4);
}

fn chain_solve_long_benchmark(c: &mut Criterion) {
    chain_solve_benchmark(c, 24);
}

criterion_group!(
    benches,
    qcp_four_point_benchmark,
    chain_solve_short_benchmark,
    chain_solve_long_benchmark
);
criterion_main!(benches);
