//! A directed segment between two points, with the plane/sphere intersection
//! queries the limit-cone tangent-circle construction needs.

use glam::Vec3;

/// A directed segment from `p1` to `p2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray3D {
    /// The ray's origin point.
    pub p1: Vec3,
    /// The ray's tip point.
    pub p2: Vec3,
}

impl Ray3D {
    /// Construct a ray from two points.
    #[must_use]
    pub const fn new(p1: Vec3, p2: Vec3) -> Self {
        Self { p1, p2 }
    }

    /// The vector from `p1` to `p2`.
    #[must_use]
    pub fn heading(self) -> Vec3 {
        self.p2 - self.p1
    }

    /// Replace this ray's heading, keeping `p1` fixed.
    pub fn set_heading(&mut self, heading: Vec3) {
        self.p2 = self.p1 + heading;
    }

    /// The ray's length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.heading().length()
    }

    /// A copy of this ray scaled to the given length, anchored at `p1`.
    #[must_use]
    pub fn scaled_to(self, length: f32) -> Self {
        let h = self.heading();
        let len = h.length();
        let new_heading = if len > f32::EPSILON {
            h * (length / len)
        } else {
            Vec3::ZERO
        };
        Self {
            p1: self.p1,
            p2: self.p1 + new_heading,
        }
    }

    /// Extend (or contract) the ray's tip by `amount` along its heading.
    #[must_use]
    pub fn elongated(self, amount: f32) -> Self {
        let len = self.length();
        self.scaled_to(len + amount)
    }

    /// Intersect this ray (treated as an infinite line through `p1`, `p2`)
    /// with the plane through `ta`, `tb`, `tc`. Returns `None` if the ray is
    /// parallel to the plane.
    #[must_use]
    pub fn intersects_plane(self, ta: Vec3, tb: Vec3, tc: Vec3) -> Option<Vec3> {
        let normal = (tb - ta).cross(tc - ta);
        let denom = normal.dot(self.heading());
        if denom.abs() < 1e-9 {
            return None;
        }
        let t = normal.dot(ta - self.p1) / denom;
        Some(self.p1 + self.heading() * t)
    }

    /// Intersect this ray (as an infinite line) with a sphere.
    ///
    /// Returns the zero, one, or two intersection points.
    #[must_use]
    pub fn intersects_sphere(self, center: Vec3, radius: f32) -> Vec<Vec3> {
        let d = self.heading().normalize_or_zero();
        if d == Vec3::ZERO {
            return Vec::new();
        }
        let m = self.p1 - center;
        let b = m.dot(d);
        let c = m.dot(m) - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return Vec::new();
        }
        if discriminant < 1e-9 {
            return vec![self.p1 - d * b];
        }
        let sqrt_disc = discriminant.sqrt();
        vec![
            self.p1 + d * (-b - sqrt_disc),
            self.p1 + d * (-b + sqrt_disc),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_and_length() {
        let r = Ray3D::new(Vec3::ZERO, Vec3::new(3.0, 4.0, 0.0));
        assert!((r.length() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn scaled_to_preserves_direction() {
        let r = Ray3D::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
        let scaled = r.scaled_to(10.0);
        assert!((scaled.heading() - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn intersects_plane_basic() {
        let r = Ray3D::new(Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 1.0));
        let hit = r
            .intersects_plane(
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            )
            .expect("ray is not parallel to plane");
        assert!(hit.length() < 1e-4);
    }

    #[test]
    fn intersects_sphere_two_points() {
        let r = Ray3D::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        let hits = r.intersects_sphere(Vec3::ZERO, 1.0);
        assert_eq!(hits.len(), 2);
        for h in hits {
            assert!((h.length() - 1.0).abs() < 1e-4);
        }
    }
}
