//! Frame-level error types.

use crate::graph::PassKind;
use crate::targets::TargetId;

/// A failure that aborts the current frame.
///
/// Every variant is fatal: the renderer never retries a frame, and the
/// application is expected to funnel the error into its termination path.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Incomplete render target, shader or pipeline failure, device loss, or
    /// a failed readback.
    #[error("GPU state error: {0}")]
    GpuState(String),

    /// A pass was started before one of its inputs was written this frame.
    #[error("{pass:?} pass reads {target:?}, which no earlier pass wrote this frame")]
    MissingInput {
        /// The pass that was refused.
        pass: PassKind,
        /// The first unwritten input.
        target: TargetId,
    },

    /// The backend has no render targets (never created, or destroyed).
    #[error("render targets have not been created")]
    TargetsNotCreated,

    /// A landscape lock was poisoned by a panicking editor.
    #[error("landscape lock poisoned")]
    LandscapeLock,
}

impl RenderError {
    /// Whether the error must end the process.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::GpuState(_)
            | Self::MissingInput { .. }
            | Self::TargetsNotCreated
            | Self::LandscapeLock => true,
        }
    }
}

/// A bounded container refused a new entry. The entry is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{what} is full ({capacity} entries); submission dropped")]
pub struct CapacityError {
    /// Which container overflowed.
    pub what: &'static str,
    /// Its fixed capacity.
    pub capacity: usize,
}
