//! # ik-core
//!
//! Shared foundations for the `ik-solver` crate:
//! - [`error`]: the configuration-boundary error enum and `Result` alias.
//! - [`math`]: the `Transform` rigid-transform type and small vector/quaternion
//!   helpers (swing-twist decomposition, angle clamping) built on `glam`.
//! - [`id`]: stable, typed integer identifiers used for bone ids and target
//!   handles.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
pub mod id;
pub mod math;

pub use error::{Error, Result};
pub use math::Transform;

/// Crate version, re-exported for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a `tracing` subscriber driven by `RUST_LOG` (or `info` if unset).
///
/// Safe to call more than once; a second call is a no-op rather than an
/// error, since embedding hosts (editors, game runtimes) commonly
/// initialize logging themselves before loading this crate.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    tracing::info!("ik-core v{VERSION} initialized");
}
