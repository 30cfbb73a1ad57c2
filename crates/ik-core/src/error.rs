//! Error types for the IK solver.
//!
//! Only configuration-boundary failures are represented here: the numeric
//! kernels assume normalized inputs and use `debug_assert!` instead, since
//! those contracts are the caller's responsibility, not a recoverable
//! runtime condition.

use thiserror::Error;

/// Errors surfaced at the configuration boundary of the IK driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The skeleton handle was never set, or the host could not resolve it.
    ///
    /// This is the only error kind `execute` surfaces as a persistent
    /// "last error" on the driver; every other kind is recovered locally.
    #[error("invalid or unresolved skeleton handle")]
    InvalidSkeletonHandle,

    /// A root, tip, pin, or constraint entry named a bone the skeleton
    /// doesn't have.
    #[error("bone not found: {name}")]
    BoneNotFound {
        /// The bone name that failed to resolve.
        name: String,
    },

    /// No configured pin resolved to a valid bone; the solver has nothing
    /// to do this frame, which is a normal (not faulty) outcome.
    #[error("no effective pins")]
    NoEffectivePins,

    /// Adjacent limit cones produced a non-finite tangent-circle
    /// construction (typically from colinear control points with radii
    /// summing to ~PI).
    #[error("degenerate limit cone pair at index {index}")]
    DegenerateCone {
        /// Index of the first cone in the offending pair.
        index: usize,
    },

    /// The QCP eigenvalue Newton iteration did not converge within
    /// `max_iterations`; the best estimate found so far is used.
    #[error("QCP eigenvalue iteration did not converge after {iterations} iterations")]
    QcpNonConvergent {
        /// Number of Newton iterations attempted.
        iterations: u32,
    },

    /// A pin's target handle did not resolve to a transform this frame.
    #[error("pin target did not resolve for bone {bone}")]
    UnresolvedPinTarget {
        /// The bone carrying the pin whose target failed to resolve.
        bone: String,
    },
}

/// Result type alias using the solver's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::BoneNotFound {
            name: "left_hand".to_string(),
        };
        assert!(err.to_string().contains("left_hand"));
    }

    #[test]
    fn invalid_skeleton_handle_has_fixed_message() {
        assert_eq!(
            Error::InvalidSkeletonHandle.to_string(),
            "invalid or unresolved skeleton handle"
        );
    }
}
