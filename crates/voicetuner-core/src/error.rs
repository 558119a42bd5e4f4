// crates/voicetuner-core/src/error.rs
//
// Typed failures for every pipeline stage.
//
// Each stage maps its internal errors (ffmpeg `Error`, `String` messages from
// the packet loops, io errors) into one of these at its public boundary, so a
// caller always receives a specific reason instead of a silent drop.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::{EngineOp, EngineState};

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why audio extraction did not produce an asset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionFailure {
    /// The input container has no audio stream at all.
    #[error("no audio track in input")]
    NoAudioTrack,
    /// The pass-through export started but did not complete.
    #[error("audio export did not complete: {0}")]
    Export(String),
}

/// Why a mux did not produce an output file. Always carries a cause.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MuxFailure {
    #[error("mux failed: {0}")]
    Failed(String),
    #[error("mux cancelled: {0}")]
    Cancelled(String),
    /// The export finished in a state that is neither completed, failed nor
    /// cancelled. Kept distinct so callers never mistake it for success.
    #[error("mux ended with unexpected status: {0}")]
    Unexpected(String),
}

/// Which kind of background job a result or rejection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Extract,
    Mux,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Extract => "extract",
            JobKind::Mux     => "mux",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),

    /// Engine start, decode of the source, or node wiring failed.
    #[error("graph configuration failed: {0}")]
    GraphConfiguration(String),

    /// The capture never reached the source length within its bounds.
    #[error("render did not reach expected length ({written}/{expected} frames)")]
    RenderTimeoutOrMismatch { written: u64, expected: u64 },

    #[error(transparent)]
    Mux(#[from] MuxFailure),

    #[error("permission to save was not granted")]
    PermissionDenied,

    #[error("{op} is not valid while the engine is {state}")]
    InvalidState { op: EngineOp, state: EngineState },

    #[error("a {0} job is already in flight")]
    Busy(JobKind),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Short machine-friendly tag, used in log lines and CLI exit messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Extraction(_)                     => "extraction",
            PipelineError::GraphConfiguration(_)             => "graph",
            PipelineError::RenderTimeoutOrMismatch { .. }    => "render",
            PipelineError::Mux(_)                            => "mux",
            PipelineError::PermissionDenied                  => "permission",
            PipelineError::InvalidState { .. }               => "state",
            PipelineError::Busy(_)                           => "busy",
            PipelineError::Config(_)                         => "config",
            PipelineError::Io(_)                             => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_failure_message_keeps_cause() {
        let e: PipelineError = MuxFailure::Cancelled("user abort".into()).into();
        assert_eq!(e.kind(), "mux");
        assert!(e.to_string().contains("user abort"));
    }

    #[test]
    fn invalid_state_names_op_and_state() {
        let e = PipelineError::InvalidState { op: EngineOp::Render, state: EngineState::Stopped };
        assert_eq!(e.to_string(), "render is not valid while the engine is stopped");
    }
}
