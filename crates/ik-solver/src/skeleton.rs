//! The external interface boundary: traits the host implements so the
//! driver can read/write its skeleton and resolve pin targets, per the
//! "Skeleton provider" / "Target-transform provider" contracts.

use crate::effector::TargetHandle;
use ik_core::math::Transform;

/// Stable identifier for a bone in the host's own skeleton representation
/// (an index, name hash, or whatever the host uses internally).
pub type HostBoneId = u32;

/// The host's skeleton data structure, transform hierarchy and pose store.
///
/// Everything outside this trait — scene-tree lifecycle, resources,
/// serialization, editor gizmos — is explicitly out of scope (spec 1); the
/// solver depends on the skeleton only through these reads and writes.
pub trait SkeletonProvider {
    /// Number of bones in the host skeleton.
    fn bone_count(&self) -> u32;

    /// Look up a bone by name.
    fn find_bone(&self, name: &str) -> Option<HostBoneId>;

    /// A bone's name, for diagnostics.
    fn bone_name(&self, id: HostBoneId) -> String;

    /// This bone's parent, or `None` for a skeleton root.
    fn bone_parent(&self, id: HostBoneId) -> Option<HostBoneId>;

    /// This bone's direct children.
    fn bone_children(&self, id: HostBoneId) -> Vec<HostBoneId>;

    /// The bone's bind/rest local transform.
    fn bone_rest_local(&self, id: HostBoneId) -> Transform;

    /// The bone's current local pose (pre-solve).
    fn bone_local_pose(&self, id: HostBoneId) -> Transform;

    /// Write a local pose override back for this bone.
    ///
    /// `strength` blends between the existing pose (`0.0`) and `local`
    /// (`1.0`); `persistent` marks the override as sticking across frames
    /// rather than being a one-shot application. The driver always calls
    /// this with `strength = 1.0, persistent = false` (spec 4.7 step 5);
    /// the parameters exist so hosts with blend-override pose stacks have
    /// somewhere to put them.
    fn set_bone_local_pose_override(
        &mut self,
        id: HostBoneId,
        local: Transform,
        strength: f32,
        persistent: bool,
    );

    /// The skeleton node's own world transform.
    fn global_transform(&self) -> Transform;
}

/// Resolves a pin's target handle to a current world-space transform.
///
/// Modeled as a trait with a single method per the spec's own design note
/// (9): the only pluggable surface the numeric core needs.
pub trait TargetProvider {
    /// Resolve `handle` to its current world-space transform, or `None` if
    /// the handle no longer resolves (a deleted node, for instance).
    fn resolve_global_transform(&self, handle: TargetHandle) -> Option<Transform>;
}
