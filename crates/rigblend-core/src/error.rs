//! Error taxonomy for the blending core.
//!
//! Only invalid operations surface as errors; missing channels,
//! degenerate weight sums, and unresolved targets are absorbed locally
//! by the per-frame math and never propagate.

use thiserror::Error;

use crate::ids::{SequenceId, TargetId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlendError {
    /// Attempted to activate a sequence that is already animating.
    #[error("sequence is already animating")]
    AlreadyActive,

    /// Attempted to deactivate (or adjust) an inactive sequence.
    #[error("sequence is not active")]
    NotActive,

    /// The requested time-sync partner failed the compatibility check.
    #[error("sequence cannot time-sync to the requested partner")]
    IncompatiblePartner,

    /// The operation is not valid in the sequence's current state
    /// (e.g. reversing an ease that is not in progress).
    #[error("operation not valid in the sequence's current state")]
    InvalidState,

    #[error("unknown sequence {0:?}")]
    UnknownSequence(SequenceId),

    #[error("unknown target {0:?}")]
    UnknownTarget(TargetId),

    /// Clip data failed validation while loading.
    #[error("invalid clip data: {0}")]
    InvalidClip(String),
}
