//! The swing-twist joint limit: a chain of [`LimitCone`]s plus an axial
//! twist range, expressed relative to a `limiting_axes` reference frame
//! (the owning bone's `constraint_transform` node).

use crate::limit_cone::LimitCone;
use crate::node::{NodeArena, NodeId};
use glam::{Quat, Vec3};
use ik_core::math::{swing_twist_decompose, twist_angle, EPSILON};
use std::f32::consts::PI;

/// Default twist range used by a freshly added constraint before
/// `set_axial_limits` is called: effectively disabled (swing-only), not
/// zero-width. Mirrors the original `EWBIK::set_constraint_count` default.
const DEFAULT_TWIST_MIN: f32 = -(2.0 * PI - EPSILON);
const DEFAULT_TWIST_RANGE: f32 = 2.0 * PI - 2.0 * EPSILON;

/// Wrap an angle (radians) into `(-PI, PI]`, i.e. the shortest signed arc
/// equivalent to `x` modulo a full turn.
fn wrap_to_pi(x: f32) -> f32 {
    let span = 2.0 * PI;
    let wrapped = x.rem_euclid(span);
    if wrapped > PI {
        wrapped - span
    } else {
        wrapped
    }
}

/// The swing-twist joint constraint attached to an `IKBone`.
#[derive(Debug, Clone)]
pub struct Kusudama {
    cones: Vec<LimitCone>,
    twist_min: f32,
    twist_range: f32,
    orientationally_constrained: bool,
    axially_constrained: bool,
    /// Blend factor in `[0, 1]` between "no correction" and "full snap".
    strength: f32,
    /// The `IKNode3D` (arena index) whose local frame the cones and twist
    /// range are expressed relative to — the owning bone's
    /// `constraint_transform`.
    limiting_axes: NodeId,
}

impl Kusudama {
    /// Construct a fresh, unconstrained Kusudama anchored to `limiting_axes`.
    ///
    /// With no cones added and no axial limits set, this constraint has no
    /// effect: `set_axes_to_snapped` is a no-op until `add_limit_cone` and/or
    /// `set_axial_limits` are called.
    #[must_use]
    pub fn new(limiting_axes: NodeId) -> Self {
        Self {
            cones: Vec::new(),
            twist_min: DEFAULT_TWIST_MIN,
            twist_range: DEFAULT_TWIST_RANGE,
            orientationally_constrained: true,
            axially_constrained: false,
            strength: 1.0,
            limiting_axes,
        }
    }

    /// The node this Kusudama's limits are expressed relative to.
    #[must_use]
    pub fn limiting_axes(&self) -> NodeId {
        self.limiting_axes
    }

    /// Append a limit cone (direction already expressed in the
    /// `limiting_axes` local frame) and recompute tangent data.
    pub fn add_limit_cone(&mut self, local_dir: Vec3, radius: f32) {
        self.cones.push(LimitCone::new(local_dir, radius));
        self.update_tangent_radii();
    }

    /// Set the axial twist range: angles in `[min, min + range]` (mod 2*PI)
    /// are allowed.
    pub fn set_axial_limits(&mut self, min: f32, range: f32) {
        self.twist_min = min;
        self.twist_range = range.max(0.0);
        self.axially_constrained = true;
    }

    /// Set the blend strength in `[0, 1]` between no correction and a full
    /// hard snap.
    pub fn set_strength(&mut self, strength: f32) {
        self.strength = strength.clamp(0.0, 1.0);
    }

    /// Whether this constraint currently limits swing.
    #[must_use]
    pub fn is_orientationally_constrained(&self) -> bool {
        self.orientationally_constrained && !self.cones.is_empty()
    }

    /// Whether this constraint currently limits twist.
    #[must_use]
    pub fn is_axially_constrained(&self) -> bool {
        self.axially_constrained
    }

    /// Enable or disable swing limiting outright, independent of whether
    /// cones are configured.
    pub fn set_orientationally_constrained(&mut self, constrained: bool) {
        self.orientationally_constrained = constrained;
    }

    /// Recompute tangent-circle data for every adjacent cone pair. Called
    /// automatically by `add_limit_cone`; expose it for callers that mutate
    /// `cones` in bulk via [`Self::cones_mut`].
    pub fn update_tangent_radii(&mut self) {
        let n = self.cones.len();
        if n < 2 {
            return;
        }
        for i in 0..n - 1 {
            let next = self.cones[i + 1];
            self.cones[i].update_tangent_handles(&next);
            if !self.cones[i].has_tangent_data() {
                let sum = self.cones[i].radius + next.radius;
                if sum < PI - 1e-3 {
                    tracing::warn!(
                        cone_index = i,
                        "degenerate limit cone pair produced no tangent circle; \
                         envelope treated as fully covered locally"
                    );
                }
            }
        }
    }

    /// Mutable access to the cone list, for batch edits followed by a single
    /// [`Self::update_tangent_radii`] call.
    pub fn cones_mut(&mut self) -> &mut Vec<LimitCone> {
        &mut self.cones
    }

    /// The configured cones, in order.
    #[must_use]
    pub fn cones(&self) -> &[LimitCone] {
        &self.cones
    }

    /// The cached rotational-freedom scalar in `[0, 1]`:
    /// `(twist_range / 2*PI) * min(1, sum(2*radius) / 2*PI)`, with either
    /// factor omitted (treated as 1) when the corresponding constraint is
    /// disabled.
    #[must_use]
    pub fn rotational_freedom(&self) -> f32 {
        let axial_factor = if self.axially_constrained {
            (self.twist_range / (2.0 * PI)).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let swing_factor = if self.is_orientationally_constrained() {
            let sum: f32 = self.cones.iter().map(|c| 2.0 * c.radius).sum();
            (sum / (2.0 * PI)).min(1.0)
        } else {
            1.0
        };
        axial_factor * swing_factor
    }

    /// The core swing-envelope query: is `local_dir` (a unit vector in the
    /// `limiting_axes` frame) inside the envelope? Returns the input
    /// unchanged with `in_bounds = 1` if so, otherwise the closest in-bounds
    /// boundary point with `in_bounds = -1`.
    #[must_use]
    pub fn local_point_in_limits(&self, local_dir: Vec3) -> (Vec3, i8) {
        if !self.is_orientationally_constrained() {
            return (local_dir, 1);
        }
        if self.cones.len() == 1 {
            let cone = &self.cones[0];
            return if cone.in_bounds_from_this_cone(local_dir) {
                (local_dir, 1)
            } else {
                (cone.closest_to_cone(local_dir).0, -1)
            };
        }

        for pair in self.cones.windows(2) {
            if pair[0].determine_if_in_bounds(&pair[1], local_dir) {
                return (local_dir, 1);
            }
        }

        let mut best_point = local_dir;
        let mut best_dot = f32::NEG_INFINITY;
        for pair in self.cones.windows(2) {
            let candidate = pair[0].get_closest_collision(&pair[1], local_dir);
            let d = candidate.dot(local_dir);
            if d > best_dot {
                best_dot = d;
                best_point = candidate;
            }
        }
        (best_point, -1)
    }

    /// If the bone's current +Y direction (expressed in `limiting_axes`)
    /// is outside the swing envelope, rotate the bone's local frame by the
    /// shortest correction that brings it back in bounds.
    pub fn set_axes_to_orientation_snap(&self, arena: &mut NodeArena, bone_node: NodeId) {
        if !self.is_orientationally_constrained() {
            return;
        }

        let bone_rotation = arena.get_global(bone_node).rotation;
        let limiting_rotation = arena.get_global(self.limiting_axes).rotation;
        let local_y = (limiting_rotation.conjugate() * (bone_rotation * Vec3::Y)).normalize_or_zero();
        if local_y == Vec3::ZERO {
            return;
        }

        let (target, in_bounds) = self.local_point_in_limits(local_y);
        if in_bounds > 0 {
            return;
        }

        let axis = local_y.cross(target);
        let axis_len_sq = axis.length_squared();
        if axis_len_sq < EPSILON * EPSILON {
            return;
        }
        let axis = axis / axis_len_sq.sqrt();
        let angle = local_y.dot(target).clamp(-1.0, 1.0).acos() * self.strength;
        if angle < EPSILON {
            return;
        }

        let correction_local = Quat::from_axis_angle(axis, angle);
        let correction_global =
            limiting_rotation * correction_local * limiting_rotation.conjugate();
        arena.rotate_local_with_global(bone_node, correction_global);
    }

    /// If the bone's current twist about `limiting_axes`'s +Y is outside
    /// `[twist_min, twist_min + twist_range]`, rotate about +Y by the
    /// smaller signed distance back into range.
    pub fn set_snap_to_twist_limit(&self, arena: &mut NodeArena, bone_node: NodeId) {
        if !self.axially_constrained {
            return;
        }

        let bone_rotation = arena.get_global(bone_node).rotation;
        let limiting_rotation = arena.get_global(self.limiting_axes).rotation;
        let local_rotation = limiting_rotation.conjugate() * bone_rotation;
        let (_, twist) = swing_twist_decompose(local_rotation, Vec3::Y);
        let angle = twist_angle(twist, Vec3::Y);

        let min = self.twist_min;
        let max = self.twist_min + self.twist_range;
        let span = 2.0 * PI;

        // In-bounds check: how far `angle` sits past `min`, walking forward
        // around the circle.
        let rel = (angle - min).rem_euclid(span);
        if rel <= self.twist_range + EPSILON {
            return;
        }

        // Out of bounds: snap to whichever endpoint is angularly nearer,
        // measured as the shortest signed arc (not the one-directional
        // distance `rel` used for the bounds check above) so a twist that
        // overshot `max` by a little doesn't get dragged all the way around
        // to `min`.
        let dist_to_min = wrap_to_pi(angle - min).abs();
        let dist_to_max = wrap_to_pi(angle - max).abs();
        let clamp_target = if dist_to_min <= dist_to_max { min } else { max };
        let delta = wrap_to_pi(clamp_target - angle) * self.strength;
        if delta.abs() < EPSILON {
            return;
        }

        let correction_local = Quat::from_axis_angle(Vec3::Y, delta);
        let correction_global =
            limiting_rotation * correction_local * limiting_rotation.conjugate();
        arena.rotate_local_with_global(bone_node, correction_global);
    }

    /// Apply orientation snap then twist snap, in that order.
    pub fn set_axes_to_snapped(&self, arena: &mut NodeArena, bone_node: NodeId) {
        self.set_axes_to_orientation_snap(arena, bone_node);
        self.set_snap_to_twist_limit(arena, bone_node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconstrained_is_always_in_bounds() {
        let kusudama = Kusudama::new(0);
        let (p, in_bounds) = kusudama.local_point_in_limits(Vec3::X);
        assert_eq!(in_bounds, 1);
        assert_eq!(p, Vec3::X);
    }

    #[test]
    fn single_cone_rejects_outside_direction() {
        let mut kusudama = Kusudama::new(0);
        kusudama.add_limit_cone(Vec3::Y, 0.2);
        let (_, in_bounds) = kusudama.local_point_in_limits(Vec3::X);
        assert_eq!(in_bounds, -1);
        let (_, in_bounds) = kusudama.local_point_in_limits(Vec3::Y);
        assert_eq!(in_bounds, 1);
    }

    #[test]
    fn snap_brings_bone_inside_cone() {
        let mut arena = NodeArena::new();
        let limiting_axes = arena.create_root(ik_core::math::Transform::IDENTITY);
        let bone = arena.create_root(ik_core::math::Transform::from_rotation(
            Quat::from_axis_angle(Vec3::X, 0.5),
        ));

        let mut kusudama = Kusudama::new(limiting_axes);
        kusudama.add_limit_cone(Vec3::Y, 0.1745); // ~10 degrees

        kusudama.set_axes_to_orientation_snap(&mut arena, bone);
        let y = arena.get_global(bone).rotation * Vec3::Y;
        assert!(y.dot(Vec3::Y) >= (0.1745f32).cos() - 1e-3);
    }

    #[test]
    fn twist_snap_clamps_to_range() {
        let mut arena = NodeArena::new();
        let limiting_axes = arena.create_root(ik_core::math::Transform::IDENTITY);
        let bone = arena.create_root(ik_core::math::Transform::from_rotation(
            Quat::from_axis_angle(Vec3::Y, std::f32::consts::FRAC_PI_2),
        ));

        let mut kusudama = Kusudama::new(limiting_axes);
        kusudama.set_axial_limits(-std::f32::consts::FRAC_PI_4, std::f32::consts::FRAC_PI_2);

        kusudama.set_snap_to_twist_limit(&mut arena, bone);
        let rotation = arena.get_global(bone).rotation;
        let (_, twist) = swing_twist_decompose(rotation, Vec3::Y);
        let angle = twist_angle(twist, Vec3::Y);
        assert!((angle - std::f32::consts::FRAC_PI_4).abs() < 1e-3);
    }

    #[test]
    fn rotational_freedom_bounds() {
        let mut kusudama = Kusudama::new(0);
        kusudama.add_limit_cone(Vec3::Y, PI / 4.0);
        kusudama.set_axial_limits(-PI / 2.0, PI);
        let freedom = kusudama.rotational_freedom();
        assert!(freedom > 0.0 && freedom <= 1.0);
    }
}
