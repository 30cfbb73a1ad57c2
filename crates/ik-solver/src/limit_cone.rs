//! A single spherical limit cone and the tangent-circle construction that
//! smoothly joins it to the next cone in a [`crate::kusudama::Kusudama`]'s
//! sequence.
//!
//! This is a direct port of the reference `IKLimitCone`'s geometry: a
//! control point plus radius on the unit sphere, and — once linked to a
//! successor — the pair of small tangent circles whose arcs form the
//! "corridor" connecting the two caps into one smooth allowed region.

use crate::ray::Ray3D;
use glam::{Quat, Vec3};
use ik_core::math::{arbitrary_orthogonal, EPSILON};
use std::f32::consts::{FRAC_PI_2, PI};

fn rotate_about(v: Vec3, axis: Vec3, angle: f32) -> Vec3 {
    Quat::from_axis_angle(axis, angle) * v
}

/// A spherical cap: a unit control point plus a half-angle radius.
#[derive(Debug, Clone, Copy)]
pub struct LimitCone {
    /// Unit control point on the sphere, in the owning `Kusudama`'s
    /// `limiting_axes` frame.
    pub control_point: Vec3,
    /// Cap half-angle, in radians, `0 < r <= PI`.
    pub radius: f32,
    /// `cos(radius)`, cached since every bounds check needs it.
    pub radius_cosine: f32,
    tangent: Option<TangentCircles>,
}

#[derive(Debug, Clone, Copy)]
struct TangentCircles {
    /// Tangent circle center on the positive side of `control_point x next.control_point`.
    t1: Vec3,
    /// Tangent circle center on the negative side.
    t2: Vec3,
    radius: f32,
    radius_cosine: f32,
}

impl LimitCone {
    /// Construct a new cone from a (not necessarily normalized) direction
    /// and a radius in radians.
    #[must_use]
    pub fn new(direction: Vec3, radius: f32) -> Self {
        let control_point = direction.normalize_or_zero();
        let radius = radius.clamp(1e-6, PI);
        Self {
            control_point,
            radius,
            radius_cosine: radius.cos(),
            tangent: None,
        }
    }

    /// Whether this cone currently has valid tangent-circle data linking it
    /// to a successor (`false` for the last cone in a sequence, or when the
    /// pair degraded to full coverage / a degenerate colinear pair).
    #[must_use]
    pub fn has_tangent_data(&self) -> bool {
        self.tangent.is_some()
    }

    /// Recompute the tangent-circle centers and radius connecting this cone
    /// to `next`. Must be called after either cone's control point or
    /// radius changes.
    ///
    /// Degrades to "no tangent data" (full corridor coverage) when
    /// `self.radius + next.radius >= PI`, and falls back to an arbitrary
    /// orthogonal normal when the two control points are colinear, per the
    /// spec's documented edge cases.
    pub fn update_tangent_handles(&mut self, next: &Self) {
        self.tangent = Self::compute_tangent_circles(
            self.control_point,
            self.radius,
            next.control_point,
            next.radius,
        );
    }

    fn compute_tangent_circles(a: Vec3, ra: f32, b: Vec3, rb: f32) -> Option<TangentCircles> {
        let t = (PI - (ra + rb)) * 0.5;
        if t <= 1e-6 {
            // Radii sum to (near) a half turn: the two caps already cover
            // the whole corridor between them.
            return None;
        }

        let cross = a.cross(b);
        let n = if cross.length_squared() < EPSILON * EPSILON {
            arbitrary_orthogonal(a)
        } else {
            cross.normalize()
        };

        let p1_a = rotate_about(a, n, ra + t);
        let p2_a = rotate_about(p1_a, a, FRAC_PI_2);
        let p3_a = a * (ra + t).cos();

        let p1_b = rotate_about(b, n, -(rb + t));
        let p2_b = rotate_about(p1_b, b, FRAC_PI_2);
        let p3_b = b * (rb + t).cos();

        let r1 = Ray3D::new(p1_b, p3_b).intersects_plane(p1_a, p2_a, p3_a)?;
        let r2 = Ray3D::new(p1_b, p2_b).intersects_plane(p1_a, p2_a, p3_a)?;

        let hits = Ray3D::new(r1, r2).intersects_sphere(Vec3::ZERO, 1.0);
        if hits.len() < 2 {
            return None;
        }

        let side_normal = a.cross(b);
        let (t1, t2) = if hits[0].dot(side_normal) >= 0.0 {
            (hits[0], hits[1])
        } else {
            (hits[1], hits[0])
        };

        Some(TangentCircles {
            t1,
            t2,
            radius: t,
            radius_cosine: t.cos(),
        })
    }

    /// True iff `point` lies within this cap alone.
    #[must_use]
    pub fn in_bounds_from_this_cone(&self, point: Vec3) -> bool {
        point.dot(self.control_point) >= self.radius_cosine
    }

    /// True iff `point` lies within this cap, `next`'s cap, or the corridor
    /// between them.
    #[must_use]
    pub fn determine_if_in_bounds(&self, next: &Self, point: Vec3) -> bool {
        if self.in_bounds_from_this_cone(point) || next.in_bounds_from_this_cone(point) {
            return true;
        }
        let Some(tangent) = self.tangent else {
            // No tangent data: either a degenerate pair (treated as fully
            // covered per the spec's edge case) or caps already overlap.
            return true;
        };

        let a = self.control_point;
        let b = next.control_point;
        let side = a.cross(b).dot(point);
        if side >= 0.0 {
            a.cross(tangent.t1).dot(point) >= 0.0 && tangent.t1.cross(b).dot(point) >= 0.0
        } else {
            tangent.t2.cross(a).dot(point) >= 0.0 && b.cross(tangent.t2).dot(point) >= 0.0
        }
    }

    /// If `point` is outside both caps, in the general corridor wedge, and
    /// outside the tangent circle nearest it, returns the closest point on
    /// that tangent circle's boundary. Returns `None` ("not applicable")
    /// otherwise, in which case the caller should fall back to
    /// [`Self::closest_point_on_closest_cone`].
    #[must_use]
    pub fn get_on_great_tangent_triangle(&self, next: &Self, point: Vec3) -> Option<Vec3> {
        let tangent = self.tangent?;
        let a = self.control_point;
        let b = next.control_point;
        let side = a.cross(b).dot(point);
        let t = if side >= 0.0 { tangent.t1 } else { tangent.t2 };

        if point.dot(t) >= tangent.radius_cosine {
            // Inside the tangent circle's disk: already in the corridor.
            return None;
        }

        let axis = t.cross(point);
        let axis = if axis.length_squared() < EPSILON * EPSILON {
            arbitrary_orthogonal(t)
        } else {
            axis.normalize()
        };
        Some(rotate_about(t, axis, tangent.radius).normalize())
    }

    /// The closest point on this cap's boundary to `point`, and whether
    /// `point` was already inside the cap.
    #[must_use]
    pub fn closest_to_cone(&self, point: Vec3) -> (Vec3, bool) {
        if self.in_bounds_from_this_cone(point) {
            return (point, true);
        }
        let axis = self.control_point.cross(point);
        let axis = if axis.length_squared() < EPSILON * EPSILON {
            arbitrary_orthogonal(self.control_point)
        } else {
            axis.normalize()
        };
        (
            rotate_about(self.control_point, axis, self.radius).normalize(),
            false,
        )
    }

    /// The closer of this cap's and `next`'s boundary-closest-points to
    /// `point`, and whether `point` was already inside one of the two caps.
    #[must_use]
    pub fn closest_point_on_closest_cone(&self, next: &Self, point: Vec3) -> (Vec3, bool) {
        let (self_closest, self_in) = self.closest_to_cone(point);
        let (next_closest, next_in) = next.closest_to_cone(point);
        if self_in || next_in {
            return if self_in {
                (self_closest, true)
            } else {
                (next_closest, true)
            };
        }
        if self_closest.dot(point) >= next_closest.dot(point) {
            (self_closest, false)
        } else {
            (next_closest, false)
        }
    }

    /// The in-envelope point nearest `point`, considering both caps and the
    /// tangent-circle corridor boundary between them.
    #[must_use]
    pub fn get_closest_collision(&self, next: &Self, point: Vec3) -> Vec3 {
        if let Some(on_tangent) = self.get_on_great_tangent_triangle(next, point) {
            return on_tangent;
        }
        self.closest_point_on_closest_cone(next, point).0
    }

    /// Like [`Self::get_closest_collision`] but restricted to the direct
    /// geodesic path from this cone's control point to `next`'s, used for
    /// "soft channel" rectification rather than full-region rectification.
    #[must_use]
    pub fn get_closest_path_point(&self, next: &Self, point: Vec3) -> Vec3 {
        let a = self.control_point;
        let b = next.control_point;
        let total_angle = a.dot(b).clamp(-1.0, 1.0).acos();
        if total_angle < EPSILON {
            return a;
        }
        // Project `point` onto the great circle through a and b, then clamp
        // the arc-length fraction to [0, 1] along the geodesic segment.
        let normal = a.cross(b).normalize_or_zero();
        if normal == Vec3::ZERO {
            return a;
        }
        let projected = (point - normal * normal.dot(point)).normalize_or_zero();
        if projected == Vec3::ZERO {
            return a;
        }
        let angle_from_a = {
            let cos_a = a.dot(projected).clamp(-1.0, 1.0);
            let raw = cos_a.acos();
            // Determine whether `projected` lies on the a->b side of the arc.
            if normal.dot(a.cross(projected)) >= 0.0 {
                raw
            } else {
                -raw
            }
        };
        let t = (angle_from_a / total_angle).clamp(0.0, 1.0);
        rotate_about(a, normal, total_angle * t).normalize()
    }
}
