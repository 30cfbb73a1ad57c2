//! `IKBone3D`: one bone in the shadow skeleton.

use crate::effector::IkEffector;
use crate::kusudama::Kusudama;
use crate::node::{NodeArena, NodeId};
use crate::skeleton::HostBoneId;
use glam::{Quat, Vec3};
use ik_core::math::{self, Transform};

/// Default per-bone damping half-angle when none is configured: 1/36 turn
/// (matches the driver's own `default_damp` fallback in scenario A).
pub const DEFAULT_DAMPING: f32 = std::f32::consts::PI / 36.0;

/// One bone in the shadow skeleton: a shadow transform node, an optional
/// swing-twist constraint, an optional pin, and the bookkeeping that links
/// it to its place in the bone tree.
pub struct IkBone {
    /// Index into the host skeleton this shadow bone mirrors.
    pub host_id: HostBoneId,
    /// Shadow node tracking this bone's current local/global pose.
    /// Parented to the parent bone's `aligned_transform` (root's parent is
    /// the driver's root frame node).
    pub aligned_transform: NodeId,
    /// Auxiliary node, parented to `aligned_transform`, oriented along the
    /// mean direction from this bone's origin to its children's origins.
    pub bone_direction_transform: NodeId,
    /// The reference frame `Kusudama` limits are expressed in. Initialized
    /// so its +Y axis points along the parent's bone direction.
    pub constraint_transform: NodeId,
    /// Swing-twist joint limit, if this bone is constrained.
    pub kusudama: Option<Kusudama>,
    /// Pin, present only on segment-tip bones (a bone may be both
    /// constrained and pinned).
    pub effector: Option<IkEffector>,
    /// Half-angle damping clamp, in radians, in `(0, pi]`.
    damping: f32,
    /// `cos(damping / 2)`, cached for the quadrance-based clamp path.
    cos_half_dampen: f32,
    /// Index of the parent bone within the owning `Vec<IkBone>`, or `None`
    /// for the segment/skeleton root.
    pub parent: Option<usize>,
    /// Indices of child bones within the owning `Vec<IkBone>`.
    pub children: Vec<usize>,
}

impl IkBone {
    /// Construct a new unconstrained, unpinned bone with default damping.
    #[must_use]
    pub fn new(
        host_id: HostBoneId,
        aligned_transform: NodeId,
        bone_direction_transform: NodeId,
        constraint_transform: NodeId,
    ) -> Self {
        let mut bone = Self {
            host_id,
            aligned_transform,
            bone_direction_transform,
            constraint_transform,
            kusudama: None,
            effector: None,
            damping: DEFAULT_DAMPING,
            cos_half_dampen: (DEFAULT_DAMPING * 0.5).cos(),
            parent: None,
            children: Vec::new(),
        };
        bone.set_damping(DEFAULT_DAMPING);
        bone
    }

    /// This bone's configured half-angle damping clamp.
    #[must_use]
    pub fn damping(&self) -> f32 {
        self.damping
    }

    /// `cos(damping / 2)`, for quadrance-style clamping.
    #[must_use]
    pub fn cos_half_dampen(&self) -> f32 {
        self.cos_half_dampen
    }

    /// Set the damping half-angle, clamped to `(0, pi]` per the
    /// supplemented default-validation rule (a zero or negative damp would
    /// freeze the bone entirely, which is never the intended configuration).
    pub fn set_damping(&mut self, angle: f32) {
        let clamped = angle.clamp(1e-4, std::f32::consts::PI);
        self.damping = clamped;
        self.cos_half_dampen = (clamped * 0.5).cos();
    }

    /// Whether this bone carries a pin.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.effector.is_some()
    }

    /// Whether this bone's Kusudama currently restricts swing or twist.
    #[must_use]
    pub fn is_constrained(&self) -> bool {
        self.kusudama
            .as_ref()
            .is_some_and(|k| k.is_orientationally_constrained() || k.is_axially_constrained())
    }

    /// Clamp a candidate rotation `q` (about this bone's own origin) to the
    /// configured damping half-angle.
    #[must_use]
    pub fn clamp_to_damping(&self, q: Quat, allow_translate: bool) -> Quat {
        if allow_translate {
            // Translation mode: no angular clamp (spec 4.6 step 3).
            return q;
        }
        math::clamp_to_angle(q, self.damping)
    }

    /// Orient `bone_direction_transform` to point its local +Y along the
    /// mean direction toward `children_local_origins` (given in this
    /// bone's `aligned_transform` local frame). If there are no children,
    /// falls back to `fallback_direction` — normally the parent's own bone
    /// direction, continued — per the leaf-bone invariant in spec 3.
    pub fn update_bone_direction(
        &self,
        arena: &mut NodeArena,
        children_local_origins: &[Vec3],
        fallback_direction: Vec3,
    ) {
        let direction = if children_local_origins.is_empty() {
            fallback_direction
        } else {
            let sum: Vec3 = children_local_origins.iter().copied().sum();
            let mean = sum / children_local_origins.len() as f32;
            if mean.length_squared() < math::EPSILON * math::EPSILON {
                fallback_direction
            } else {
                mean.normalize()
            }
        };
        let direction = if direction.length_squared() < math::EPSILON * math::EPSILON {
            Vec3::Y
        } else {
            direction.normalize()
        };
        let rotation = Quat::from_rotation_arc(Vec3::Y, direction);
        arena.set_local(self.bone_direction_transform, Transform::from_rotation(rotation));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bone(arena: &mut NodeArena) -> IkBone {
        let root = arena.create_root(Transform::IDENTITY);
        let dir = arena.create_child(root, Transform::IDENTITY);
        let constraint = arena.create_child(root, Transform::IDENTITY);
        IkBone::new(0, root, dir, constraint)
    }

    #[test]
    fn damping_clamped_to_valid_range() {
        let mut arena = NodeArena::new();
        let mut bone = make_bone(&mut arena);
        bone.set_damping(0.0);
        assert!(bone.damping() > 0.0);
        bone.set_damping(10.0);
        assert!(bone.damping() <= std::f32::consts::PI);
    }

    #[test]
    fn leaf_bone_direction_falls_back() {
        let mut arena = NodeArena::new();
        let bone = make_bone(&mut arena);
        bone.update_bone_direction(&mut arena, &[], Vec3::X);
        let local = arena.get_local(bone.bone_direction_transform);
        let rotated = local.rotation * Vec3::Y;
        assert!((rotated - Vec3::X).length() < 1e-4);
    }

    #[test]
    fn direction_points_to_children_mean() {
        let mut arena = NodeArena::new();
        let bone = make_bone(&mut arena);
        bone.update_bone_direction(&mut arena, &[Vec3::new(0.0, 2.0, 0.0)], Vec3::X);
        let local = arena.get_local(bone.bone_direction_transform);
        let rotated = local.rotation * Vec3::Y;
        assert!((rotated - Vec3::Y).length() < 1e-4);
    }
}
