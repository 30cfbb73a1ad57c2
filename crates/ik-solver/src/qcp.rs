//! Quaternion Characteristic Polynomial (QCP): the closed-form
//! weighted-point-cloud rotation (and optional translation) fit used once
//! per bone per solver iteration.
//!
//! Given two equal-length point clouds and non-negative weights, finds the
//! unit quaternion (and, if enabled, translation) minimizing the weighted
//! squared distance between the rotated/translated first cloud and the
//! second. This is the hot path of the whole solver — called once per bone
//! per segment per iteration per frame — so it allocates nothing beyond the
//! small fixed-size scratch the algorithm itself needs.

use glam::{Quat, Vec3};

/// Default eigenvalue-iteration convergence threshold.
pub const DEFAULT_EVAL_PRECISION: f32 = 1e-11;
/// Default eigenvector-extraction degeneracy threshold.
pub const DEFAULT_EVEC_PRECISION: f32 = 1e-6;
/// Default cap on Newton iterations for the largest-eigenvalue search.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// The result of a QCP fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QcpResult {
    /// The fitted unit rotation.
    pub rotation: Quat,
    /// The fitted translation (zero unless translation was enabled).
    pub translation: Vec3,
    /// Weighted RMSD between the fitted clouds.
    pub rmsd: f32,
    /// Whether the Newton iteration converged within `max_iterations`.
    pub converged: bool,
    /// Number of Newton iterations actually taken.
    pub iterations: u32,
}

/// A configured QCP solver instance. Stateless aside from its convergence
/// thresholds; safe to share across bones.
#[derive(Debug, Clone, Copy)]
pub struct Qcp {
    eval_precision: f32,
    evec_precision: f32,
    max_iterations: u32,
}

impl Default for Qcp {
    fn default() -> Self {
        Self {
            eval_precision: DEFAULT_EVAL_PRECISION,
            evec_precision: DEFAULT_EVEC_PRECISION,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl Qcp {
    /// Construct a solver with the default precision/iteration settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a solver with explicit thresholds.
    #[must_use]
    pub fn with_precision(eval_precision: f32, evec_precision: f32, max_iterations: u32) -> Self {
        Self {
            eval_precision,
            evec_precision,
            max_iterations,
        }
    }

    /// Fit `moved` onto `target` under `weight`, optionally solving for
    /// translation. All three slices must have equal length; weights must
    /// be non-negative. Returns identity/zero when the cloud is empty or
    /// all weights are zero.
    #[must_use]
    pub fn weighted_superpose(
        &self,
        moved: &[Vec3],
        target: &[Vec3],
        weight: &[f32],
        translate: bool,
    ) -> QcpResult {
        debug_assert_eq!(moved.len(), target.len());
        debug_assert_eq!(moved.len(), weight.len());

        let n = moved.len();
        if n == 0 {
            return QcpResult {
                rotation: Quat::IDENTITY,
                translation: Vec3::ZERO,
                rmsd: 0.0,
                converged: true,
                iterations: 0,
            };
        }

        let weight_sum: f32 = weight.iter().sum();
        if weight_sum <= f32::EPSILON {
            return QcpResult {
                rotation: Quat::IDENTITY,
                translation: Vec3::ZERO,
                rmsd: 0.0,
                converged: true,
                iterations: 0,
            };
        }

        let weighted_centroid = |points: &[Vec3]| -> Vec3 {
            points.iter().zip(weight).map(|(p, w)| *p * *w).sum::<Vec3>() / weight_sum
        };

        let (translation, moved_centered, target_centered) = if translate {
            let centroid_moved = weighted_centroid(moved);
            let centroid_target = weighted_centroid(target);
            (
                centroid_target - centroid_moved,
                moved.iter().map(|p| *p - centroid_moved).collect(),
                target.iter().map(|p| *p - centroid_target).collect(),
            )
        } else {
            (Vec3::ZERO, moved.to_vec(), target.to_vec())
        };

        if n == 1 {
            let rotation = rotation_between(moved_centered[0], target_centered[0]);
            return QcpResult {
                rotation,
                translation,
                rmsd: 0.0,
                converged: true,
                iterations: 0,
            };
        }

        // Inner product matrix S[a][b] = sum w_i * moved_i[a] * target_i[b].
        let mut s = [[0.0f32; 3]; 3];
        let mut moved_sq = 0.0f32;
        let mut target_sq = 0.0f32;
        for i in 0..n {
            let w = weight[i];
            let m = moved_centered[i];
            let t = target_centered[i];
            let mv = [m.x, m.y, m.z];
            let tv = [t.x, t.y, t.z];
            for a in 0..3 {
                for b in 0..3 {
                    s[a][b] += w * mv[a] * tv[b];
                }
            }
            moved_sq += w * m.length_squared();
            target_sq += w * t.length_squared();
        }
        let e0 = 0.5 * (moved_sq + target_sq);

        let (sxx, sxy, sxz) = (s[0][0], s[0][1], s[0][2]);
        let (syx, syy, syz) = (s[1][0], s[1][1], s[1][2]);
        let (szx, szy, szz) = (s[2][0], s[2][1], s[2][2]);

        #[rustfmt::skip]
        let k: [[f32; 4]; 4] = [
            [sxx + syy + szz, syz - szy,       szx - sxz,       sxy - syx],
            [syz - szy,       sxx - syy - szz, sxy + syx,       szx + sxz],
            [szx - sxz,       sxy + syx,      -sxx + syy - szz, syz + szy],
            [sxy - syx,       szx + sxz,       syz + szy,      -sxx - syy + szz],
        ];

        let e2 = principal_minors_2(&k);
        let e3 = principal_minors_3(&k);
        let e4 = determinant_4(&k);

        let mut lambda = e0;
        let mut converged = false;
        let mut iterations = 0;
        for _ in 0..self.max_iterations {
            iterations += 1;
            let f = lambda.powi(4) + e2 * lambda * lambda - e3 * lambda + e4;
            let f_prime = 4.0 * lambda.powi(3) + 2.0 * e2 * lambda - e3;
            if f_prime.abs() < f32::EPSILON {
                break;
            }
            let delta = f / f_prime;
            lambda -= delta;
            if delta.abs() < self.eval_precision * lambda.abs() {
                converged = true;
                break;
            }
        }

        let adjugate = adjugate_4(&k, lambda);
        let mut best_col = 0usize;
        let mut best_norm_sq = -1.0f32;
        for col in 0..4 {
            let norm_sq = (0..4).map(|row| adjugate[row][col] * adjugate[row][col]).sum();
            if norm_sq > best_norm_sq {
                best_norm_sq = norm_sq;
                best_col = col;
            }
        }

        let rotation = if best_norm_sq < self.evec_precision * self.evec_precision {
            Quat::IDENTITY
        } else {
            let w = adjugate[0][best_col];
            let x = adjugate[1][best_col];
            let y = adjugate[2][best_col];
            let z = adjugate[3][best_col];
            Quat::from_xyzw(x, y, z, w).normalize()
        };

        let rmsd = (2.0 * (e0 - lambda)).max(0.0).sqrt() / weight_sum.sqrt();

        QcpResult {
            rotation,
            translation,
            rmsd,
            converged,
            iterations,
        }
    }
}

/// The rotation mapping unit-ish vector `from` onto `to`, via their cross
/// product axis — the single-point special case of the fit.
fn rotation_between(from: Vec3, to: Vec3) -> Quat {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(from, to)
}

fn principal_minors_2(k: &[[f32; 4]; 4]) -> f32 {
    let pairs = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
    pairs
        .iter()
        .map(|&(i, j)| k[i][i] * k[j][j] - k[i][j] * k[j][i])
        .sum()
}

fn det_3(k: &[[f32; 4]; 4], i: usize, j: usize, l: usize) -> f32 {
    let (a, b, c) = (k[i][i], k[i][j], k[i][l]);
    let (d, e, f) = (k[j][i], k[j][j], k[j][l]);
    let (g, h, ii) = (k[l][i], k[l][j], k[l][l]);
    a * (e * ii - f * h) - b * (d * ii - f * g) + c * (d * h - e * g)
}

fn principal_minors_3(k: &[[f32; 4]; 4]) -> f32 {
    let triples = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    triples.iter().map(|&(i, j, l)| det_3(k, i, j, l)).sum()
}

fn minor_3x3(m: &[[f32; 4]; 4], rows: &[usize; 3], cols: &[usize; 3]) -> f32 {
    let g = |r: usize, c: usize| m[rows[r]][cols[c]];
    g(0, 0) * (g(1, 1) * g(2, 2) - g(1, 2) * g(2, 1))
        - g(0, 1) * (g(1, 0) * g(2, 2) - g(1, 2) * g(2, 0))
        + g(0, 2) * (g(1, 0) * g(2, 1) - g(1, 1) * g(2, 0))
}

fn determinant_4(m: &[[f32; 4]; 4]) -> f32 {
    let rows = [1, 2, 3];
    let mut det = 0.0;
    for col in 0..4 {
        let cols: Vec<usize> = (0..4).filter(|&c| c != col).collect();
        let cols = [cols[0], cols[1], cols[2]];
        let sign = if col % 2 == 0 { 1.0 } else { -1.0 };
        det += sign * m[0][col] * minor_3x3(m, &rows, &cols);
    }
    det
}

/// The adjugate of `K - lambda*I`, used to extract the eigenvector for
/// `lambda` without an explicit inverse (which would be singular at the
/// true eigenvalue).
fn adjugate_4(k: &[[f32; 4]; 4], lambda: f32) -> [[f32; 4]; 4] {
    let mut shifted = *k;
    for i in 0..4 {
        shifted[i][i] -= lambda;
    }
    let mut adj = [[0.0f32; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            let rows: Vec<usize> = (0..4).filter(|&r| r != j).collect();
            let cols: Vec<usize> = (0..4).filter(|&c| c != i).collect();
            let rows = [rows[0], rows[1], rows[2]];
            let cols = [cols[0], cols[1], cols[2]];
            let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
            adj[i][j] = sign * minor_3x3(&shifted, &rows, &cols);
        }
    }
    adj
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn cloud() -> Vec<Vec3> {
        vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn identity_when_clouds_match() {
        let qcp = Qcp::new();
        let moved = cloud();
        let target = moved.clone();
        let weight = vec![1.0; moved.len()];
        let result = qcp.weighted_superpose(&moved, &target, &weight, false);
        assert!(result.rotation.dot(Quat::IDENTITY).abs() > 1.0 - 1e-5);
        assert!(result.rmsd < 1e-5);
    }

    #[test]
    fn recovers_known_rotation() {
        let qcp = Qcp::new();
        let q = Quat::from_axis_angle(Vec3::new(0.3, 0.6, 0.2).normalize(), 1.0);
        let moved = cloud();
        let target: Vec<Vec3> = moved.iter().map(|p| q * *p).collect();
        let weight = vec![1.0; moved.len()];
        let result = qcp.weighted_superpose(&moved, &target, &weight, false);
        let agree = result.rotation.dot(q).abs();
        assert!(agree > 1.0 - 1e-4, "agree = {agree}");
    }

    #[test]
    fn recovers_rotation_and_translation() {
        let qcp = Qcp::new();
        let q = Quat::from_axis_angle(Vec3::Y, FRAC_PI_2);
        let v = Vec3::new(2.0, -1.0, 0.5);
        let moved = cloud();
        let target: Vec<Vec3> = moved.iter().map(|p| q * *p + v).collect();
        let weight = vec![1.0; moved.len()];
        let result = qcp.weighted_superpose(&moved, &target, &weight, true);
        assert!(result.rotation.dot(q).abs() > 1.0 - 1e-3);
        assert!((result.translation - v).length() < 1e-2);
    }

    #[test]
    fn zero_weight_excludes_point() {
        let qcp = Qcp::new();
        let q = Quat::from_axis_angle(Vec3::X, 0.4);
        let mut moved = cloud();
        let mut target: Vec<Vec3> = moved.iter().map(|p| q * *p).collect();
        // Perturb one target point but zero its weight: result should be
        // identical to the un-perturbed 3-point fit.
        target[3] = Vec3::new(50.0, -30.0, 12.0);
        let weight = vec![1.0, 1.0, 1.0, 0.0];

        let result_with_zero = qcp.weighted_superpose(&moved, &target, &weight, false);

        moved.truncate(3);
        target.truncate(3);
        let weight3 = vec![1.0, 1.0, 1.0];
        let result_without = qcp.weighted_superpose(&moved, &target, &weight3, false);

        assert!(result_with_zero.rotation.dot(result_without.rotation).abs() > 1.0 - 1e-4);
    }

    #[test]
    fn single_point_maps_directly() {
        let qcp = Qcp::new();
        let moved = vec![Vec3::X];
        let target = vec![Vec3::Y];
        let weight = vec![1.0];
        let result = qcp.weighted_superpose(&moved, &target, &weight, false);
        let mapped = result.rotation * Vec3::X;
        assert!((mapped - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn all_zero_weights_yield_identity() {
        let qcp = Qcp::new();
        let moved = cloud();
        let target = cloud();
        let weight = vec![0.0; moved.len()];
        let result = qcp.weighted_superpose(&moved, &target, &weight, false);
        assert_eq!(result.rotation, Quat::IDENTITY);
        assert_eq!(result.translation, Vec3::ZERO);
    }
}
