//! `IkDriver`: the top-level per-frame entry point. Owns the shadow
//! skeleton, rebuilds it from an [`IkConfig`] whenever the config is
//! touched, and drives one `execute` per host frame: refresh poses in,
//! resolve pin targets, iterate the segment solver, refresh poses out.
//!
//! Grounded on the reference `EWBIK` node: a dirty flag gates a full
//! rebuild (`skeleton_changed`), and `execute` is the `_notification`-driven
//! per-frame step, minus the scene-tree lifecycle this crate has no use for.

use crate::bone::IkBone;
use crate::config::{ConstraintConfig, IkConfig, PinConfig};
use crate::effector::IkEffector;
use crate::kusudama::Kusudama;
use crate::node::{NodeArena, NodeId};
use crate::qcp::Qcp;
use crate::segment::IkSegment;
use crate::skeleton::{HostBoneId, SkeletonProvider, TargetProvider};
use glam::{Quat, Vec3};
use ik_core::error::{Error, Result};
use ik_core::math::Transform;
use std::collections::{HashMap, HashSet};
use std::f32::consts::PI;

/// Owns the shadow skeleton and drives the swing-twist IK solve, one
/// `execute` call per host frame.
///
/// Structural edits — root/tip bone, pins, constraints — go through this
/// struct's setters rather than through a mutable [`IkConfig`] reference, so
/// the dirty flag is never missed; `set_config` is the one escape hatch for
/// replacing the whole configuration at once.
pub struct IkDriver {
    config: IkConfig,
    qcp: Qcp,
    arena: NodeArena,
    root_frame: Option<NodeId>,
    bones: Vec<IkBone>,
    host_to_index: HashMap<HostBoneId, usize>,
    root_segment: Option<IkSegment>,
    dirty: bool,
    last_error: Option<Error>,
}

impl IkDriver {
    /// Construct a driver from an initial configuration. The first
    /// `execute` call always rebuilds, regardless of `config`'s contents.
    #[must_use]
    pub fn new(config: IkConfig) -> Self {
        Self {
            config,
            qcp: Qcp::new(),
            arena: NodeArena::new(),
            root_frame: None,
            bones: Vec::new(),
            host_to_index: HashMap::new(),
            root_segment: None,
            dirty: true,
            last_error: None,
        }
    }

    /// The current configuration.
    #[must_use]
    pub fn config(&self) -> &IkConfig {
        &self.config
    }

    /// Replace the whole configuration and mark the driver dirty.
    pub fn set_config(&mut self, config: IkConfig) {
        self.config = config;
        self.dirty = true;
    }

    /// Set the root bone name (the upper bound of the solved subtree).
    pub fn set_root_bone(&mut self, name: impl Into<String>) {
        self.config.root_bone = name.into();
        self.dirty = true;
    }

    /// Set the tip bone name (the auto-segmentation lower bound; empty
    /// disables it).
    pub fn set_tip_bone(&mut self, name: impl Into<String>) {
        self.config.tip_bone = name.into();
        self.dirty = true;
    }

    /// Append a pin and return its index.
    pub fn add_pin(&mut self, pin: PinConfig) -> usize {
        self.config.pins.push(pin);
        self.dirty = true;
        self.config.pins.len() - 1
    }

    /// Remove a pin by index. A stale index (already removed, or never
    /// valid) is a no-op rather than a panic.
    pub fn remove_pin(&mut self, index: usize) {
        if index < self.config.pins.len() {
            self.config.pins.remove(index);
            self.dirty = true;
        }
    }

    /// Append a constraint and return its index.
    pub fn add_constraint(&mut self, constraint: ConstraintConfig) -> usize {
        self.config.constraints.push(constraint);
        self.dirty = true;
        self.config.constraints.len() - 1
    }

    /// Remove a constraint by index. A stale index is a no-op.
    pub fn remove_constraint(&mut self, index: usize) {
        if index < self.config.constraints.len() {
            self.config.constraints.remove(index);
            self.dirty = true;
        }
    }

    /// Set the outer solver iteration count per `execute` call. Does not
    /// force a rebuild: it only changes how many times the already-built
    /// segment tree is iterated.
    pub fn set_iterations_per_frame(&mut self, iterations: u32) {
        self.config.iterations_per_frame = iterations.max(1);
    }

    /// Set the default per-bone damping half-angle, clamped to `(0, pi]`.
    /// Does not force a rebuild; bones pick this up on their next solve.
    pub fn set_default_damp(&mut self, angle: f32) {
        self.config.default_damp = angle.clamp(1e-4, PI);
    }

    /// The most recent unresolved error from a rebuild attempt, if any.
    /// Cleared the next time a rebuild succeeds.
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// The shadow bones built by the last successful rebuild, in
    /// construction (root-first) order. Empty before the first successful
    /// rebuild.
    #[must_use]
    pub fn bones(&self) -> &[IkBone] {
        &self.bones
    }

    /// Run one frame of IK: rebuild the shadow skeleton if dirty, copy the
    /// host's current pose in, refresh pin targets, iterate the segment
    /// solver `iterations_per_frame` times, and write the result back.
    ///
    /// This never returns an `Err` to the caller: a rebuild failure (an
    /// unresolved root bone) makes `execute` a no-op for this frame and
    /// records the failure in [`Self::last_error`] instead, matching the
    /// driver's "never halts the host frame" contract.
    pub fn execute(&mut self, skeleton: &mut dyn SkeletonProvider, targets: &dyn TargetProvider) -> Result<()> {
        if self.dirty {
            match self.rebuild(skeleton) {
                Ok(()) => self.last_error = None,
                Err(err) => {
                    tracing::warn!(error = %err, "IK driver rebuild failed; execute is a no-op this frame");
                    self.last_error = Some(err);
                    return Ok(());
                }
            }
        }

        let Some(root_frame) = self.root_frame else {
            return Ok(());
        };
        if self.bones.is_empty() {
            return Ok(());
        }

        self.arena.set_local(root_frame, skeleton.global_transform());

        for bone in &self.bones {
            let pose = skeleton.bone_local_pose(bone.host_id);
            self.arena.set_local(bone.aligned_transform, pose);
        }

        {
            let arena = &mut self.arena;
            for bone in &mut self.bones {
                let Some(eff) = bone.effector.as_mut() else { continue };
                let fallback = arena.get_global(bone.aligned_transform);
                let resolved = eff.refresh_target(targets, fallback);
                if !resolved && eff.target_unresolved {
                    tracing::warn!(
                        host_bone = bone.host_id,
                        "pin target did not resolve this frame; holding at current pose"
                    );
                }
            }
        }

        let Some(segment) = self.root_segment.as_mut() else {
            return Ok(());
        };

        for _ in 0..self.config.iterations_per_frame.max(1) {
            segment.segment_solver(
                &mut self.arena,
                &mut self.bones,
                &self.qcp,
                Some(self.config.default_damp),
                false,
                self.config.stabilization_passes,
            );
        }

        for bone in &self.bones {
            let local = self.arena.get_local(bone.aligned_transform);
            debug_assert!(local.is_finite(), "shadow bone {} produced a non-finite pose", bone.host_id);
            skeleton.set_bone_local_pose_override(bone.host_id, local, 1.0, false);
        }

        Ok(())
    }

    /// Rebuild the shadow skeleton from `self.config` against the current
    /// host topology. Grounded on `EWBIK::skeleton_changed`: resolves root,
    /// tip, pins and constraints by name, instantiates one `IkBone` per
    /// bone on a path from the root to a retained pin, and wires up
    /// effectors, Kusudamas, and the root `IkSegment`.
    fn rebuild(&mut self, skeleton: &dyn SkeletonProvider) -> Result<()> {
        if self.config.root_bone.is_empty() {
            return Err(Error::InvalidSkeletonHandle);
        }
        let root_host = skeleton
            .find_bone(&self.config.root_bone)
            .ok_or(Error::InvalidSkeletonHandle)?;

        let tip_host = if self.config.tip_bone.is_empty() {
            None
        } else {
            let resolved = skeleton.find_bone(&self.config.tip_bone);
            if resolved.is_none() {
                tracing::warn!(
                    tip_bone = %self.config.tip_bone,
                    "configured tip_bone not found; auto-segmentation bound ignored"
                );
            }
            resolved
        };

        let mut needed: HashSet<HostBoneId> = HashSet::new();
        needed.insert(root_host);
        let mut parent_of: HashMap<HostBoneId, Option<HostBoneId>> = HashMap::new();
        parent_of.insert(root_host, None);

        let mut kept_pins: Vec<(PinConfig, HostBoneId)> = Vec::new();
        for pin in &self.config.pins {
            let Some(host) = skeleton.find_bone(&pin.bone) else {
                tracing::warn!(bone = %pin.bone, "pin references unknown bone; skipped");
                continue;
            };
            let Some(path) = path_to_root(skeleton, host, root_host) else {
                tracing::warn!(bone = %pin.bone, "pin bone is not a descendant of the configured root; skipped");
                continue;
            };
            if let Some(tip) = tip_host {
                if host != tip && path.iter().any(|&h| h == tip) {
                    tracing::warn!(bone = %pin.bone, "pin bone lies beyond the configured tip_bone; skipped");
                    continue;
                }
            }
            for window in path.windows(2) {
                parent_of.entry(window[0]).or_insert(Some(window[1]));
            }
            needed.extend(path.iter().copied());
            kept_pins.push((pin.clone(), host));
        }

        if kept_pins.is_empty() {
            tracing::warn!(root_bone = %self.config.root_bone, "no effective pins; solver has nothing to do this frame");
        }

        let order = order_bones_root_first(root_host, &needed, &parent_of);

        let mut arena = NodeArena::new();
        let root_frame = arena.create_root(skeleton.global_transform());

        let mut bones: Vec<IkBone> = Vec::with_capacity(order.len());
        let mut host_to_index: HashMap<HostBoneId, usize> = HashMap::with_capacity(order.len());

        for &host in &order {
            let parent_index = parent_of
                .get(&host)
                .copied()
                .flatten()
                .and_then(|p| host_to_index.get(&p).copied());
            let parent_node = parent_index.map_or(root_frame, |p| bones[p].aligned_transform);
            let rest_local = skeleton.bone_rest_local(host);
            let aligned = arena.create_child(parent_node, rest_local);
            let dir = arena.create_child(aligned, Transform::IDENTITY);
            let constraint = arena.create_child(aligned, Transform::IDENTITY);

            let mut bone = IkBone::new(host, aligned, dir, constraint);
            bone.parent = parent_index;
            let new_index = bones.len();
            if let Some(p) = parent_index {
                bones[p].children.push(new_index);
            }
            host_to_index.insert(host, new_index);
            bones.push(bone);
        }

        // Root-first: every parent is processed before its children, so a
        // child's fallback direction (its parent's bone_direction) is
        // already settled by the time the child is visited.
        for idx in 0..bones.len() {
            let parent_dir = match bones[idx].parent {
                Some(p) => bone_forward(&arena, &bones[p]),
                None => Vec3::Y,
            };
            let children_local_origins: Vec<Vec3> = bones[idx]
                .children
                .iter()
                .map(|&c| arena.get_local(bones[c].aligned_transform).translation)
                .collect();
            bones[idx].update_bone_direction(&mut arena, &children_local_origins, parent_dir);

            let rotation = Quat::from_rotation_arc(Vec3::Y, parent_dir);
            arena.set_local(bones[idx].constraint_transform, Transform::from_rotation(rotation));
        }

        for (pin, host) in &kept_pins {
            if let Some(&idx) = host_to_index.get(host) {
                let node = bones[idx].aligned_transform;
                bones[idx].effector = Some(build_effector(node, pin));
            }
        }

        for constraint_cfg in &self.config.constraints {
            let Some(host) = skeleton.find_bone(&constraint_cfg.bone) else {
                tracing::warn!(bone = %constraint_cfg.bone, "constraint references unknown bone; skipped");
                continue;
            };
            let Some(&idx) = host_to_index.get(&host) else {
                tracing::warn!(bone = %constraint_cfg.bone, "constraint bone is outside the solved subtree; skipped");
                continue;
            };

            if constraint_cfg.flip_handedness {
                // Chirality is consumed once here, as a 180 degree flip
                // about the constraint frame's own forward (Z) axis baked
                // into its local rotation, rather than carried as a runtime
                // sign through every subsequent rotation.
                let current = arena.get_local(bones[idx].constraint_transform);
                let flipped = current.rotation * Quat::from_axis_angle(Vec3::Z, PI);
                arena.set_local(bones[idx].constraint_transform, Transform::from_rotation(flipped));
                arena.set_chirality(bones[idx].constraint_transform, -1.0);
            }

            let mut kusudama = build_kusudama(bones[idx].constraint_transform, constraint_cfg);
            kusudama.update_tangent_radii();
            bones[idx].kusudama = Some(kusudama);
        }

        let root_index = *host_to_index
            .get(&root_host)
            .expect("root bone is always present in host_to_index");
        let root_segment = IkSegment::build(&bones, root_index);

        self.arena = arena;
        self.root_frame = Some(root_frame);
        self.bones = bones;
        self.host_to_index = host_to_index;
        self.root_segment = root_segment;
        self.dirty = false;
        Ok(())
    }
}

/// The direction a bone's `bone_direction_transform` points, as a unit
/// vector in that bone's own `aligned_transform` local frame.
fn bone_forward(arena: &NodeArena, bone: &IkBone) -> Vec3 {
    let dir = arena.get_local(bone.bone_direction_transform).rotation * Vec3::Y;
    if dir.length_squared() < 1e-10 {
        Vec3::Y
    } else {
        dir.normalize()
    }
}

fn build_effector(bone_node: NodeId, cfg: &PinConfig) -> IkEffector {
    let mut eff = IkEffector::new(bone_node);
    eff.target_handle = cfg.target;
    eff.weight = cfg.weight.max(0.0);
    eff.direction_priorities = Vec3::new(
        cfg.priority_x.max(0.0),
        cfg.priority_y.max(0.0),
        cfg.priority_z.max(0.0),
    );
    eff.depth_falloff = cfg.depth_falloff.clamp(0.0, 1.0);
    eff.use_node_rotation = cfg.use_node_rotation;
    eff
}

fn build_kusudama(constraint_transform: NodeId, cfg: &ConstraintConfig) -> Kusudama {
    let mut kusudama = Kusudama::new(constraint_transform);
    for cone in &cfg.cones {
        kusudama.add_limit_cone(cone.center, cone.radius);
    }
    let twist_span = cfg.twist_to - cfg.twist_from;
    if twist_span.abs() > f32::EPSILON {
        kusudama.set_axial_limits(cfg.twist_from, twist_span);
    }
    kusudama
}

/// Walk `bone_parent` from `host` up to `root`, inclusive, returning the
/// path in child-to-root order. `None` if `root` is never reached (`host`
/// is not a descendant of `root`, or the host skeleton has a cycle).
fn path_to_root(skeleton: &dyn SkeletonProvider, host: HostBoneId, root: HostBoneId) -> Option<Vec<HostBoneId>> {
    let mut path = vec![host];
    let mut current = host;
    let guard = skeleton.bone_count() as usize + 1;
    for _ in 0..guard {
        if current == root {
            return Some(path);
        }
        match skeleton.bone_parent(current) {
            Some(parent) => {
                path.push(parent);
                current = parent;
            }
            None => return None,
        }
    }
    None
}

/// Order `needed` host bone ids root-first (every parent before its
/// children), using `parent_of` to reconstruct child lists.
fn order_bones_root_first(
    root: HostBoneId,
    needed: &HashSet<HostBoneId>,
    parent_of: &HashMap<HostBoneId, Option<HostBoneId>>,
) -> Vec<HostBoneId> {
    let mut order = vec![root];
    let mut frontier = vec![root];
    while let Some(current) = frontier.pop() {
        for &host in needed {
            if parent_of.get(&host).copied().flatten() == Some(current) {
                order.push(host);
                frontier.push(host);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PinConfig;
    use ik_core::id::Id;
    use std::collections::HashMap as StdHashMap;

    struct TestSkeleton {
        names: Vec<String>,
        parents: Vec<Option<u32>>,
        rest: Vec<Transform>,
        pose: Vec<Transform>,
    }

    impl TestSkeleton {
        fn chain(lengths: &[f32]) -> Self {
            let mut names = Vec::new();
            let mut parents = Vec::new();
            let mut rest = Vec::new();
            for (i, &len) in lengths.iter().enumerate() {
                names.push(format!("bone{i}"));
                parents.push(if i == 0 { None } else { Some((i - 1) as u32) });
                rest.push(Transform::from_translation(Vec3::new(0.0, len, 0.0)));
            }
            let pose = rest.clone();
            Self { names, parents, rest, pose }
        }
    }

    impl SkeletonProvider for TestSkeleton {
        fn bone_count(&self) -> u32 {
            self.names.len() as u32
        }
        fn find_bone(&self, name: &str) -> Option<HostBoneId> {
            self.names.iter().position(|n| n == name).map(|i| i as u32)
        }
        fn bone_name(&self, id: HostBoneId) -> String {
            self.names[id as usize].clone()
        }
        fn bone_parent(&self, id: HostBoneId) -> Option<HostBoneId> {
            self.parents[id as usize]
        }
        fn bone_children(&self, id: HostBoneId) -> Vec<HostBoneId> {
            self.parents
                .iter()
                .enumerate()
                .filter_map(|(i, p)| (*p == Some(id)).then_some(i as u32))
                .collect()
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

    struct TestTargets {
        targets: StdHashMap<u64, Transform>,
    }
    impl TargetProvider for TestTargets {
        fn resolve_global_transform(&self, handle: Id) -> Option<Transform> {
            self.targets.get(&handle.raw()).copied()
        }
    }

    #[test]
    fn no_root_bone_is_a_recorded_no_op() {
        let mut skeleton = TestSkeleton::chain(&[1.0]);
        let targets = TestTargets { targets: StdHashMap::new() };
        let mut config = IkConfig::default();
        config.root_bone = "missing".to_string();
        let mut driver = IkDriver::new(config);
        driver.execute(&mut skeleton, &targets).expect("execute never errors out");
        assert!(matches!(driver.last_error(), Some(Error::InvalidSkeletonHandle)));
    }

    #[test]
    fn two_bone_chain_reaches_planar_target() {
        let mut skeleton = TestSkeleton::chain(&[1.0, 1.0]);
        let handle = Id::from_raw(1);
        let mut targets = TestTargets { targets: StdHashMap::new() };
        targets
            .targets
            .insert(1, Transform::from_translation(Vec3::new(1.2, 1.2, 0.0)));

        let mut config = IkConfig::default();
        config.root_bone = "bone0".to_string();
        config.iterations_per_frame = 20;
        config.pins.push(PinConfig {
            bone: "bone1".to_string(),
            target: Some(handle),
            ..PinConfig::default()
        });

        let mut driver = IkDriver::new(config);
        driver.execute(&mut skeleton, &targets).expect("execute");
        assert!(driver.last_error().is_none());

        let tip_global = forward_kinematics(&skeleton, 1);
        let dist = (tip_global.translation - Vec3::new(1.2, 1.2, 0.0)).length();
        assert!(dist < 0.05, "tip at {tip_global:?}, dist {dist}");
    }

    #[test]
    fn unknown_pin_bone_is_skipped_not_fatal() {
        let mut skeleton = TestSkeleton::chain(&[1.0]);
        let targets = TestTargets { targets: StdHashMap::new() };
        let mut config = IkConfig::default();
        config.root_bone = "bone0".to_string();
        config.pins.push(PinConfig {
            bone: "nonexistent".to_string(),
            ..PinConfig::default()
        });
        let mut driver = IkDriver::new(config);
        driver.execute(&mut skeleton, &targets).expect("execute never errors out");
        assert!(driver.last_error().is_none());
        assert!(driver.bones().is_empty() || driver.bones().iter().all(|b| !b.is_pinned()));
    }

    fn forward_kinematics(skeleton: &TestSkeleton, id: u32) -> Transform {
        let local = skeleton.bone_local_pose(id);
        match skeleton.bone_parent(id) {
            Some(p) => forward_kinematics(skeleton, p) * local,
            None => skeleton.global_transform() * local,
        }
    }
}
