//! The persisted configuration surface (spec 6): a flat, serde-serializable
//! record the host owns and edits between solves. The driver rebuilds its
//! runtime shadow skeleton from this whenever it's marked dirty.

use crate::effector::TargetHandle;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// One pin entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinConfig {
    /// Which bone carries this pin.
    pub bone: String,
    /// Where to try to put it.
    pub target: Option<TargetHandle>,
    /// If false, only the target origin is used; axis directions are
    /// ignored.
    pub use_node_rotation: bool,
    /// Point-cloud weight multiplier, `>= 0`.
    pub weight: f32,
    /// Per-axis direction weighting, each `>= 0`.
    pub priority_x: f32,
    /// Per-axis direction weighting, each `>= 0`.
    pub priority_y: f32,
    /// Per-axis direction weighting, each `>= 0`.
    pub priority_z: f32,
    /// Upstream propagation weight, in `[0, 1]`.
    pub depth_falloff: f32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            bone: String::new(),
            target: None,
            use_node_rotation: true,
            weight: 1.0,
            priority_x: 1.0,
            priority_y: 1.0,
            priority_z: 1.0,
            depth_falloff: 0.0,
        }
    }
}

/// One spherical cap within a `ConstraintConfig`'s swing envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConeConfig {
    /// Control point of this cap, in the bone's constraint frame.
    pub center: Vec3,
    /// Cap half-angle, in radians.
    pub radius: f32,
}

/// One constraint entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConfig {
    /// Which bone this constraint governs.
    pub bone: String,
    /// `theta_min`.
    pub twist_from: f32,
    /// `theta_min + theta_range`.
    pub twist_to: f32,
    /// Swing envelope caps, in sequence order.
    pub cones: Vec<ConeConfig>,
    /// Negates the chirality sign of the bone's transforms.
    pub flip_handedness: bool,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            bone: String::new(),
            twist_from: 0.0,
            twist_to: 0.0,
            cones: Vec::new(),
            flip_handedness: false,
        }
    }
}

/// The flat configuration surface of spec 6, owned and edited by the host
/// between solves. Structural edits (root/tip bone, pins, constraints)
/// should go through `IkDriver`'s setters so the dirty flag gets set;
/// constructing or mutating an `IkConfig` directly and handing it to
/// `IkDriver::set_config` always forces a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IkConfig {
    /// Upper bound of the IK subtree. Required.
    pub root_bone: String,
    /// Lower bound used only during auto-segmentation; empty means "all
    /// pinned descendants".
    pub tip_bone: String,
    /// Outer solver iterations per `execute`.
    pub iterations_per_frame: u32,
    /// Per-bone half-angle clamp when no per-bone damp is set, in radians.
    pub default_damp: f32,
    /// Per-bone stabilization retry count; clamped to 4 at solve time.
    pub stabilization_passes: u32,
    /// Pin entries.
    pub pins: Vec<PinConfig>,
    /// Constraint entries.
    pub constraints: Vec<ConstraintConfig>,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            root_bone: String::new(),
            tip_bone: String::new(),
            iterations_per_frame: 10,
            default_damp: std::f32::consts::PI / 36.0,
            stabilization_passes: 0,
            pins: Vec::new(),
            constraints: Vec::new(),
        }
    }
}
