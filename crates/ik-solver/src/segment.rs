//! `IKBoneSegment`: a contiguous bone chain from a segment root to a
//! segment tip (a pin or a branch point), owning child sub-segments and the
//! heading/weight buffers the per-bone QCP update consumes.

use crate::bone::IkBone;
use crate::node::NodeArena;
use crate::qcp::Qcp;
use glam::Vec3;

/// Stabilization passes above this are clamped, per the supplemented
/// default-validation rule; a higher configured value only ever logs a
/// warning and runs at the cap.
pub const MAX_STABILIZATION_PASSES: u32 = 4;

/// A contiguous bone chain, root to tip, plus its child sub-segments.
///
/// Segments never overlap: each bone in the shadow skeleton belongs to
/// exactly one segment's `bones_in_order`, and every bone in that list is
/// updated exactly once per segment pass (see [`Self::segment_solver`]).
pub struct IkSegment {
    /// Bones on the path from this segment's root to its tip, inclusive,
    /// in root-to-tip order.
    pub bones_in_order: Vec<usize>,
    /// Child segments, rooted at pinned descendants of this segment's tip.
    pub children: Vec<IkSegment>,
    /// Bone indices carrying an effector reachable through this segment,
    /// parallel to `effector_falloff` and `effector_offsets`.
    effector_bones: Vec<usize>,
    /// Accumulated depth-falloff product for each entry in `effector_bones`.
    effector_falloff: Vec<f32>,
    /// Offset into the heading/weight buffers where each effector's points
    /// begin.
    effector_offsets: Vec<usize>,
    /// Scratch: target-cloud points, rebuilt every `update_optimal_rotation`.
    target_headings: Vec<Vec3>,
    /// Scratch: tip-cloud points, rebuilt every `update_optimal_rotation`.
    tip_headings: Vec<Vec3>,
    /// Persistent: point weights, built once at segment construction.
    weights: Vec<f32>,
}

fn subtree_has_pin(bones: &[IkBone], idx: usize) -> bool {
    bones[idx].is_pinned() || bones[idx].children.iter().any(|&c| subtree_has_pin(bones, c))
}

impl IkSegment {
    /// Build the segment tree rooted at `root`, per spec 4.6's
    /// construction rule: follow single-pinned-child paths, close the
    /// segment at a pin or a branch (>= 2 pinned-descendant children), and
    /// recurse into each qualifying child.
    ///
    /// Returns `None` if `root` has no pinned descendants at all (nothing
    /// for this segment to do — the caller should treat this as
    /// `NoEffectivePins` for the subtree).
    #[must_use]
    pub fn build(bones: &[IkBone], root: usize) -> Option<Self> {
        if !subtree_has_pin(bones, root) {
            return None;
        }

        let mut path = vec![root];
        let mut current = root;
        loop {
            let pinned_children: Vec<usize> = bones[current]
                .children
                .iter()
                .copied()
                .filter(|&c| subtree_has_pin(bones, c))
                .collect();
            if bones[current].is_pinned() || pinned_children.len() != 1 {
                break;
            }
            current = pinned_children[0];
            path.push(current);
        }
        let tip = current;

        let pinned_children: Vec<usize> = bones[tip]
            .children
            .iter()
            .copied()
            .filter(|&c| subtree_has_pin(bones, c))
            .collect();
        let children: Vec<IkSegment> = pinned_children
            .into_iter()
            .filter_map(|c| Self::build(bones, c))
            .collect();

        let mut effector_bones = Vec::new();
        let mut effector_falloff = Vec::new();
        if bones[tip].is_pinned() {
            effector_bones.push(tip);
            effector_falloff.push(1.0);
        }
        for child in &children {
            // The multiplier at this boundary is the depth_falloff of the
            // *child segment's own tip pin* (the pin immediately reached by
            // crossing into that child), not its root. Using the root here
            // would silently default to 1.0 whenever the root bone carries
            // no effector of its own, defeating depth_falloff entirely for
            // any chain deeper than one level.
            let child_tip = child.tip();
            let multiplier = bones[child_tip].effector.as_ref().map_or(1.0, |e| e.depth_falloff);
            for (&b, &f) in child.effector_bones.iter().zip(&child.effector_falloff) {
                effector_bones.push(b);
                effector_falloff.push(f * multiplier);
            }
        }

        let mut segment = Self {
            bones_in_order: path,
            children,
            effector_bones,
            effector_falloff,
            effector_offsets: Vec::new(),
            target_headings: Vec::new(),
            tip_headings: Vec::new(),
            weights: Vec::new(),
        };
        segment.rebuild_buffers(bones);
        Some(segment)
    }

    fn rebuild_buffers(&mut self, bones: &[IkBone]) {
        let mut offset = 0;
        self.effector_offsets.clear();
        for &bone_idx in &self.effector_bones {
            self.effector_offsets.push(offset);
            let count = bones[bone_idx]
                .effector
                .as_ref()
                .map_or(0, super::effector::IkEffector::heading_count);
            offset += count;
        }
        self.target_headings = vec![Vec3::ZERO; offset];
        self.tip_headings = vec![Vec3::ZERO; offset];
        self.weights = vec![0.0; offset];
        for i in 0..self.effector_bones.len() {
            let bone_idx = self.effector_bones[i];
            let falloff = self.effector_falloff[i];
            let offset = self.effector_offsets[i];
            if let Some(eff) = bones[bone_idx].effector.as_ref() {
                eff.write_point_weights(&mut self.weights, offset, falloff);
            }
        }
    }

    /// Recurse children first (post-order), then update every bone in this
    /// segment tip-to-root.
    pub fn segment_solver(
        &mut self,
        arena: &mut NodeArena,
        bones: &mut [IkBone],
        qcp: &Qcp,
        damping_override: Option<f32>,
        allow_translate: bool,
        stabilization_passes: u32,
    ) {
        for child in &mut self.children {
            child.segment_solver(arena, bones, qcp, damping_override, allow_translate, stabilization_passes);
        }
        for i in (0..self.bones_in_order.len()).rev() {
            let bone_idx = self.bones_in_order[i];
            self.update_optimal_rotation(
                bone_idx,
                arena,
                bones,
                qcp,
                damping_override,
                allow_translate,
                stabilization_passes,
            );
        }
    }

    /// Per-bone QCP update: spec 4.6's `update_optimal_rotation`.
    fn update_optimal_rotation(
        &mut self,
        for_bone: usize,
        arena: &mut NodeArena,
        bones: &mut [IkBone],
        qcp: &Qcp,
        damping_override: Option<f32>,
        allow_translate: bool,
        stabilization_passes: u32,
    ) {
        if self.weights.is_empty() {
            return;
        }
        let node = bones[for_bone].aligned_transform;

        let passes = stabilization_passes.min(MAX_STABILIZATION_PASSES);
        if stabilization_passes > MAX_STABILIZATION_PASSES {
            tracing::warn!(
                configured = stabilization_passes,
                clamped_to = MAX_STABILIZATION_PASSES,
                "stabilization_passes clamped"
            );
        }

        let mut best_local = arena.get_local(node);
        let mut best_msd = f32::INFINITY;

        for _ in 0..=passes {
            let origin = arena.get_global(node).translation;
            for i in 0..self.effector_bones.len() {
                let bone_idx = self.effector_bones[i];
                let offset = self.effector_offsets[i];
                let eff_node = bones[bone_idx].aligned_transform;
                let bone_global = arena.get_global(eff_node);
                if let Some(eff) = bones[bone_idx].effector.as_ref() {
                    eff.write_target_headings(&mut self.target_headings, offset, origin);
                    eff.write_tip_headings(&mut self.tip_headings, offset, bone_global, origin);
                }
            }

            let result = qcp.weighted_superpose(&self.tip_headings, &self.target_headings, &self.weights, allow_translate);
            if !result.converged {
                tracing::warn!(
                    host_bone = bones[for_bone].host_id,
                    iterations = result.iterations,
                    "QCP did not converge within max_iterations; using best estimate"
                );
            }

            let damping_angle = damping_override.unwrap_or_else(|| bones[for_bone].damping());
            let q = if allow_translate {
                result.rotation
            } else {
                ik_core::math::clamp_to_angle(result.rotation, damping_angle)
            };

            arena.rotate_local_with_global(node, q);
            if allow_translate {
                let mut g = arena.get_global(node);
                g.translation += result.translation;
                arena.set_global(node, g);
            }

            let msd = self.weighted_tip_target_msd();
            if msd < best_msd {
                best_msd = msd;
                best_local = arena.get_local(node);
            }
            if passes == 0 {
                break;
            }
        }

        arena.set_local(node, best_local);

        if let Some(kusudama) = bones[for_bone].kusudama.clone() {
            kusudama.set_axes_to_snapped(arena, node);
        }
    }

    /// This segment's own tip bone index (the last entry of `bones_in_order`).
    #[must_use]
    pub fn tip(&self) -> usize {
        *self.bones_in_order.last().expect("a segment always has at least its root bone")
    }

    fn weighted_tip_target_msd(&self) -> f32 {
        let sum_w: f32 = self.weights.iter().sum();
        if sum_w <= f32::EPSILON {
            return 0.0;
        }
        let sq: f32 = self
            .tip_headings
            .iter()
            .zip(&self.target_headings)
            .zip(&self.weights)
            .map(|((a, b), w)| w * (*a - *b).length_squared())
            .sum();
        sq / sum_w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effector::IkEffector;
    use crate::node::NodeArena;
    use ik_core::math::Transform;

    fn make_chain(arena: &mut NodeArena, lengths: &[f32]) -> Vec<IkBone> {
        let mut bones = Vec::new();
        let mut parent_node = arena.create_root(Transform::IDENTITY);
        for (i, &len) in lengths.iter().enumerate() {
            let local = Transform::from_translation(Vec3::new(0.0, len, 0.0));
            let aligned = arena.create_child(parent_node, local);
            let dir = arena.create_child(aligned, Transform::IDENTITY);
            let constraint = arena.create_child(aligned, Transform::IDENTITY);
            let mut bone = IkBone::new(i as u32, aligned, dir, constraint);
            bone.parent = if i == 0 { None } else { Some(i - 1) };
            bones.push(bone);
            parent_node = aligned;
        }
        for i in 1..bones.len() {
            bones[i - 1].children.push(i);
        }
        bones
    }

    #[test]
    fn build_single_chain_segment() {
        let mut arena = NodeArena::new();
        let mut bones = make_chain(&mut arena, &[1.0, 1.0]);
        bones[1].effector = Some(IkEffector::new(bones[1].aligned_transform));
        let segment = IkSegment::build(&bones, 0).expect("has a pin");
        assert_eq!(segment.bones_in_order, vec![0, 1]);
        assert!(segment.children.is_empty());
    }

    #[test]
    fn no_pins_returns_none() {
        let mut arena = NodeArena::new();
        let bones = make_chain(&mut arena, &[1.0, 1.0]);
        assert!(IkSegment::build(&bones, 0).is_none());
    }

    #[test]
    fn two_bone_chain_converges_toward_target() {
        let mut arena = NodeArena::new();
        let mut bones = make_chain(&mut arena, &[1.0, 1.0]);
        let tip_node = bones[1].aligned_transform;
        let mut eff = IkEffector::new(tip_node);
        eff.target_global = Transform::from_translation(Vec3::new(1.2, 1.2, 0.0));
        bones[1].effector = Some(eff);

        let mut segment = IkSegment::build(&bones, 0).expect("has a pin");
        let qcp = Qcp::new();
        for _ in 0..20 {
            segment.segment_solver(&mut arena, &mut bones, &qcp, Some(std::f32::consts::PI / 36.0), false, 0);
        }
        let tip_global = arena.get_global(bones[1].aligned_transform);
        let dist = (tip_global.translation - Vec3::new(1.2, 1.2, 0.0)).length();
        assert!(dist < 0.05, "tip at {tip_global:?}, dist {dist}");
    }
}
