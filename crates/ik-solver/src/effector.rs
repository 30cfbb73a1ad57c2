//! The pin (`IKEffector`) attached to a segment-tip bone: a target-transform
//! handle plus the per-axis priorities that turn a single target pose into
//! a small weighted point cloud for the QCP fit.

use crate::node::NodeId;
use glam::Vec3;
use ik_core::id::Id;
use ik_core::math::Transform;

/// Opaque handle into the host's target-transform provider (typically a
/// stable reference to a scene-graph node). Reuses [`ik_core::id::Id`]
/// rather than inventing a parallel newtype, since the two have identical
/// semantics (a stable integer key resolved through an external lookup).
pub type TargetHandle = Id;

/// A pin: attached to a bone, trying to match a target pose.
#[derive(Debug, Clone)]
pub struct IkEffector {
    /// The shadow-skeleton node (`IKBone3D::godot_skeleton_aligned_transform`)
    /// this pin is attached to.
    pub bone_node: NodeId,
    /// The external handle resolved every solve tick via
    /// [`crate::skeleton::TargetProvider`]. `None` means "no target configured";
    /// the pin then holds at its own current pose.
    pub target_handle: Option<TargetHandle>,
    /// Cached target pose, refreshed once per `execute` call.
    pub target_global: Transform,
    /// Point-cloud weight multiplier, `>= 0`.
    pub weight: f32,
    /// Per-axis (x, y, z) direction priorities, each `>= 0`. An axis with
    /// priority `0` contributes no points.
    pub direction_priorities: Vec3,
    /// Upstream (toward-root) propagation factor in `[0, 1]`.
    pub depth_falloff: f32,
    /// Blend between a full pin (`1.0`) and no pin at all (`0.0`).
    pub passthrough_factor: f32,
    /// Whether `use_node_rotation` is set: if false, only the target
    /// origin is used and axis directions (and thus non-origin heading
    /// points) are ignored even if priorities are nonzero.
    pub use_node_rotation: bool,
    /// Set by [`Self::refresh_target`] when the target handle failed to
    /// resolve this frame, so the driver can log `UnresolvedPinTarget`.
    pub target_unresolved: bool,
}

impl IkEffector {
    /// Construct a new pin on `bone_node` with default weight 1, full
    /// priorities, and no upstream falloff.
    #[must_use]
    pub fn new(bone_node: NodeId) -> Self {
        Self {
            bone_node,
            target_handle: None,
            target_global: Transform::IDENTITY,
            weight: 1.0,
            direction_priorities: Vec3::ONE,
            depth_falloff: 0.0,
            passthrough_factor: 1.0,
            use_node_rotation: true,
            target_unresolved: false,
        }
    }

    /// Number of axes with nonzero priority that contribute heading points,
    /// given `use_node_rotation`.
    #[must_use]
    fn active_axes(&self) -> [bool; 3] {
        if !self.use_node_rotation {
            return [false; 3];
        }
        [
            self.direction_priorities.x > 0.0,
            self.direction_priorities.y > 0.0,
            self.direction_priorities.z > 0.0,
        ]
    }

    /// Total heading points this effector contributes: the origin, plus two
    /// per active axis.
    #[must_use]
    pub fn heading_count(&self) -> usize {
        1 + 2 * self.active_axes().iter().filter(|a| **a).count()
    }

    /// Refresh the cached target pose from the host via `provider`. Falls
    /// back to `fallback_global` (the pin's own bone's current global
    /// transform) when the handle doesn't resolve, per the spec's "a pin
    /// effectively holds" failure semantics. Returns whether it resolved.
    pub fn refresh_target(
        &mut self,
        provider: &dyn crate::skeleton::TargetProvider,
        fallback_global: Transform,
    ) -> bool {
        match self.target_handle.and_then(|h| provider.resolve_global_transform(h)) {
            Some(t) => {
                self.target_global = t;
                self.target_unresolved = false;
                true
            }
            None => {
                self.target_global = fallback_global;
                self.target_unresolved = self.target_handle.is_some();
                false
            }
        }
    }

    /// Write this effector's target-cloud points (expressed as vectors from
    /// `relative_to`) into `buf` starting at `offset`. Returns the new
    /// offset.
    pub fn write_target_headings(&self, buf: &mut [Vec3], offset: usize, relative_to: Vec3) -> usize {
        let origin = self.target_global.translation - relative_to;
        self.write_cloud(buf, offset, origin, self.target_global.basis(), 1.0)
    }

    /// Write this effector's tip-cloud points (the bone's own current
    /// shadow pose) into `buf` starting at `offset`, scaling per-axis
    /// offsets by `max(1.0, distance(tip, target))` so the tip and target
    /// clouds sit on comparable scales.
    pub fn write_tip_headings(
        &self,
        buf: &mut [Vec3],
        offset: usize,
        for_bone_global: Transform,
        relative_to: Vec3,
    ) -> usize {
        let origin = for_bone_global.translation - relative_to;
        let scale = (for_bone_global.translation - self.target_global.translation)
            .length()
            .max(1.0);
        self.write_cloud(buf, offset, origin, for_bone_global.basis(), scale)
    }

    fn write_cloud(
        &self,
        buf: &mut [Vec3],
        offset: usize,
        origin: Vec3,
        basis: glam::Mat3,
        axis_scale: f32,
    ) -> usize {
        let mut idx = offset;
        buf[idx] = origin;
        idx += 1;
        let priorities = [
            self.direction_priorities.x,
            self.direction_priorities.y,
            self.direction_priorities.z,
        ];
        let axes = [basis.x_axis, basis.y_axis, basis.z_axis];
        for (priority, axis) in priorities.into_iter().zip(axes) {
            if priority <= 0.0 || !self.use_node_rotation {
                continue;
            }
            let offset_vec = axis * (priority * axis_scale);
            buf[idx] = origin + offset_vec;
            idx += 1;
            buf[idx] = origin - offset_vec;
            idx += 1;
        }
        idx
    }

    /// Per-point weights for this effector's heading points, given the
    /// accumulated upstream falloff product `falloff_scale` from the
    /// segment builder. Every weight is floored to `1.0` so near-zero
    /// configured weights still move the solution, per spec 4.5.
    pub fn write_point_weights(&self, buf: &mut [f32], offset: usize, falloff_scale: f32) -> usize {
        let base = self.weight * self.passthrough_factor * falloff_scale;
        let mut idx = offset;
        buf[idx] = base.max(1.0);
        idx += 1;
        for priority in [
            self.direction_priorities.x,
            self.direction_priorities.y,
            self.direction_priorities.z,
        ] {
            if priority <= 0.0 || !self.use_node_rotation {
                continue;
            }
            let w = (base * priority).max(1.0);
            buf[idx] = w;
            idx += 1;
            buf[idx] = w;
            idx += 1;
        }
        idx
    }
}
