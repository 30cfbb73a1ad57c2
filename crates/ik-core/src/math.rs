//! Shared 3D math types.
//!
//! The solver works entirely in terms of [`glam`]'s `Vec3` and `Quat`, plus
//! the rigid-transform type defined here. Re-exporting `glam`'s types
//! (rather than wrapping them) keeps the numeric kernels free of pointless
//! newtype friction while still giving the crate a single place to hang its
//! own `Transform` and axis-angle helpers.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid (rotation + translation) transform.
///
/// Scale is intentionally not modeled: the solver never needs it, and
/// `IKNode3D` orthonormalizes its composed basis whenever a node's
/// `disable_scale` flag is set, which is the only place scale could have
/// leaked in from a host skeleton's rest pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Rotation component.
    pub rotation: Quat,
    /// Translation component.
    pub translation: Vec3,
}

impl Transform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
    };

    /// Construct a transform from a rotation and a translation.
    #[must_use]
    pub const fn new(rotation: Quat, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Construct a pure-translation transform.
    #[must_use]
    pub const fn from_translation(translation: Vec3) -> Self {
        Self {
            rotation: Quat::IDENTITY,
            translation,
        }
    }

    /// Construct a pure-rotation transform.
    #[must_use]
    pub const fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            translation: Vec3::ZERO,
        }
    }

    /// Compose `self * other`, i.e. apply `other` first, then `self`.
    #[must_use]
    pub fn mul_transform(self, other: Self) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Transform a point from this transform's local space to its parent space.
    #[must_use]
    pub fn transform_point(self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }

    /// Transform a direction vector (ignores translation).
    #[must_use]
    pub fn transform_vector(self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    /// The affine inverse: `self.inverse() * self == IDENTITY`.
    #[must_use]
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self {
            rotation: inv_rot,
            translation: inv_rot * -self.translation,
        }
    }

    /// The 3x3 rotation matrix ("basis") of this transform.
    #[must_use]
    pub fn basis(self) -> Mat3 {
        Mat3::from_quat(self.rotation)
    }

    /// Replace the rotation with the nearest orthonormal rotation.
    ///
    /// A no-op in practice since `rotation` is always a `Quat`, which is
    /// already a valid rotation representation; kept as an explicit method
    /// because `IKNode3D::get_global` calls it after composing a parent
    /// chain so that accumulated floating-point drift in long chains is
    /// swept up in one place.
    #[must_use]
    pub fn orthonormalized(self) -> Self {
        Self {
            rotation: self.rotation.normalize(),
            translation: self.translation,
        }
    }

    /// True if every component is finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.rotation.is_finite() && self.translation.is_finite()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Transform {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.mul_transform(rhs)
    }
}

/// Any vector at or below this length is treated as the zero vector by
/// normalization helpers, matching the reference's `CMP_EPSILON` usage.
pub const EPSILON: f32 = 1e-5;

/// Pick an arbitrary unit vector orthogonal to `v`.
///
/// Used by [`crate`] consumers (limit cone tangent construction) when two
/// control points are colinear and the natural cross-product normal
/// degenerates to zero.
#[must_use]
pub fn arbitrary_orthogonal(v: Vec3) -> Vec3 {
    let candidate = if v.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    let ortho = v.cross(candidate);
    if ortho.length_squared() < EPSILON * EPSILON {
        v.cross(Vec3::Z).normalize_or_zero()
    } else {
        ortho.normalize()
    }
}

/// Clamp a rotation to a maximum half-angle `cos_half_angle = cos(max_angle / 2)`,
/// preserving axis and handedness.
///
/// This is "clamp by quadrance": it scales the quaternion's vector part so
/// its implied `cos(half angle)` never drops below `cos_half_angle`, which
/// avoids the trigonometric round-trip (and its associated precision loss)
/// that an angle-extract-then-rebuild approach would need.
#[must_use]
pub fn clamp_to_quadrance_angle(q: Quat, cos_half_angle: f32) -> Quat {
    let new_coeff = 1.0 - cos_half_angle * cos_half_angle;
    let current_coeff = q.x * q.x + q.y * q.y + q.z * q.z;
    if new_coeff > current_coeff || current_coeff <= f32::EPSILON {
        return q;
    }
    let composite = (new_coeff / current_coeff).sqrt();
    let w = if q.w < 0.0 {
        -cos_half_angle
    } else {
        cos_half_angle
    };
    Quat::from_xyzw(q.x * composite, q.y * composite, q.z * composite, w).normalize()
}

/// Clamp a rotation to a maximum angle (in radians), preserving axis.
#[must_use]
pub fn clamp_to_angle(q: Quat, max_angle: f32) -> Quat {
    clamp_to_quadrance_angle(q, (max_angle * 0.5).cos())
}

/// Decompose `q` into swing and twist components about the unit axis `u`,
/// such that `swing * twist == q` and `twist`'s axis is parallel to `u`.
///
/// Returns `(swing, twist)`. When the rotation axis is (near-)orthogonal to
/// `u` the twist component is numerically ill-conditioned; in that case this
/// returns an identity twist and the whole rotation as swing, per the
/// reference algorithm's documented near-singular handling.
#[must_use]
pub fn swing_twist_decompose(q: Quat, u: Vec3) -> (Quat, Quat) {
    let q = q.normalize();
    let axis = Vec3::new(q.x, q.y, q.z);
    let proj = axis.dot(u);
    let twist_unnormalized = Quat::from_xyzw(u.x * proj, u.y * proj, u.z * proj, q.w);
    let twist_len = twist_unnormalized.length();
    if twist_len < EPSILON {
        return (q, Quat::IDENTITY);
    }
    let twist = twist_unnormalized / twist_len;
    let swing = q * twist.conjugate();
    (swing, twist)
}

/// The signed twist angle (radians, in `(-2*PI, 2*PI)`) that `twist`
/// represents about `u`, assuming `twist` was produced by
/// [`swing_twist_decompose`] with the same axis.
#[must_use]
pub fn twist_angle(twist: Quat, u: Vec3) -> f32 {
    let axis = Vec3::new(twist.x, twist.y, twist.z);
    let sign = axis.dot(u).signum();
    let angle = 2.0 * twist.w.clamp(-1.0, 1.0).acos();
    sign * angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn transform_inverse_round_trips() {
        let t = Transform::new(
            Quat::from_axis_angle(Vec3::Y, FRAC_PI_2),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let round_trip = t.inverse() * t;
        assert!(round_trip.translation.length() < 1e-4);
        assert!((round_trip.rotation.dot(Quat::IDENTITY)).abs() > 1.0 - 1e-4);
    }

    #[test]
    fn transform_compose_matches_point_application() {
        let parent = Transform::new(Quat::from_axis_angle(Vec3::Z, FRAC_PI_2), Vec3::X);
        let local = Transform::from_translation(Vec3::Y);
        let composed = parent * local;
        let direct = parent.transform_point(local.transform_point(Vec3::ZERO));
        assert!((composed.translation - direct).length() < 1e-5);
    }

    #[test]
    fn clamp_to_angle_identity_when_within_bound() {
        let q = Quat::from_axis_angle(Vec3::Y, 0.1);
        let clamped = clamp_to_angle(q, 1.0);
        assert!((clamped.dot(q)).abs() > 1.0 - 1e-5);
    }

    #[test]
    fn clamp_to_angle_caps_large_rotation() {
        let q = Quat::from_axis_angle(Vec3::Y, PI);
        let max = FRAC_PI_2;
        let clamped = clamp_to_angle(q, max);
        let (_, angle) = clamped.to_axis_angle();
        assert!(angle <= max + 1e-4);
    }

    #[test]
    fn swing_twist_recomposes_to_original() {
        let q = Quat::from_axis_angle(Vec3::new(0.3, 1.0, 0.2).normalize(), 1.1);
        let (swing, twist) = swing_twist_decompose(q, Vec3::Y);
        let recomposed = swing * twist;
        assert!(recomposed.dot(q).abs() > 1.0 - 1e-4);
    }

    #[test]
    fn swing_twist_pure_twist_has_zero_swing() {
        let twist_only = Quat::from_axis_angle(Vec3::Y, 0.7);
        let (swing, twist) = swing_twist_decompose(twist_only, Vec3::Y);
        assert!(swing.dot(Quat::IDENTITY).abs() > 1.0 - 1e-4);
        assert!((twist_angle(twist, Vec3::Y) - 0.7).abs() < 1e-4);
    }

    #[test]
    fn arbitrary_orthogonal_is_perpendicular() {
        for v in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 1.0, 1.0).normalize()] {
            let o = arbitrary_orthogonal(v);
            assert!(o.dot(v).abs() < 1e-4);
            assert!((o.length() - 1.0).abs() < 1e-4);
        }
    }
}
