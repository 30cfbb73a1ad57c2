//! # ik-solver
//!
//! Swing-twist constrained full-body IK: per-bone Kusudama joint limits plus
//! a QCP (Quaternion Characteristic Polynomial) rotation fit, composed by a
//! tip-to-root segment solver and driven once per frame by [`IkDriver`].
//!
//! Module map, roughly leaves first:
//! - [`node`]: the dirty-propagating shadow transform tree (arena-indexed).
//! - [`ray`]: directed-segment plane/sphere intersection helper.
//! - [`limit_cone`]: a single spherical swing cap plus the tangent-circle
//!   construction joining it to the next cone in sequence.
//! - [`kusudama`]: the swing-twist joint limit built from a cone sequence.
//! - [`effector`]: the pin attached to a segment-tip bone.
//! - [`bone`]: one bone of the shadow skeleton.
//! - [`qcp`]: the rotation(+translation)-fitting kernel.
//! - [`segment`]: a contiguous bone chain and its per-bone solve pass.
//! - [`skeleton`]: the `SkeletonProvider`/`TargetProvider` host boundary.
//! - [`config`]: the serializable pin/constraint/tuning configuration.
//! - [`driver`]: [`IkDriver`], the top-level per-frame entry point.
//!
//! Logging and error reporting both come from `ik-core`; call
//! [`ik_core::init`] once at host startup before driving a solver.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bone;
pub mod config;
pub mod driver;
pub mod effector;
pub mod kusudama;
pub mod limit_cone;
pub mod node;
pub mod qcp;
pub mod ray;
pub mod segment;
pub mod skeleton;

pub use bone::IkBone;
pub use config::{ConeConfig, ConstraintConfig, IkConfig, PinConfig};
pub use driver::IkDriver;
pub use effector::{IkEffector, TargetHandle};
pub use kusudama::Kusudama;
pub use limit_cone::LimitCone;
pub use node::{NodeArena, NodeId};
pub use qcp::{Qcp, QcpResult};
pub use ray::Ray3D;
pub use segment::IkSegment;
pub use skeleton::{HostBoneId, SkeletonProvider, TargetProvider};
