// crates/voicetuner-core/src/state.rs
//
// Effect engine lifecycle as one explicit state machine.
//
//   Unconfigured ──configure──▶ Configured ──start──▶ Running
//        ▲                          ▲                   │
//        │                          └───configure───────┤ (tears down first)
//        │                                              │ render
//     (never)                                           ▼
//   Stopped ◀────────────complete / stop──────────── Rendering
//
// `stop` is accepted from every state and always lands on Stopped.
// Every other (state, op) pair not drawn above is rejected with
// `PipelineError::InvalidState` instead of being silently ignored.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EngineState {
    #[default]
    Unconfigured,
    Configured,
    Running,
    Rendering,
    Stopped,
}

/// Operations that drive the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineOp {
    Configure,
    /// Internal: the engine thread came up after `configure`.
    Start,
    ApplyPreset,
    Render,
    /// Internal: the capture reached the source length.
    Complete,
    Stop,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineState::Unconfigured => "unconfigured",
            EngineState::Configured   => "configured",
            EngineState::Running      => "running",
            EngineState::Rendering    => "rendering",
            EngineState::Stopped      => "stopped",
        })
    }
}

impl fmt::Display for EngineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineOp::Configure   => "configure",
            EngineOp::Start       => "start",
            EngineOp::ApplyPreset => "apply_preset",
            EngineOp::Render      => "render",
            EngineOp::Complete    => "complete",
            EngineOp::Stop        => "stop",
        })
    }
}

impl EngineState {
    /// Validate `op` against the current state and return the state it leads to.
    pub fn transition(self, op: EngineOp) -> Result<EngineState, PipelineError> {
        use EngineOp as Op;
        use EngineState as S;

        let next = match (self, op) {
            (_, Op::Stop) => S::Stopped,

            (S::Unconfigured | S::Stopped | S::Configured | S::Running, Op::Configure)
                => S::Configured,

            (S::Configured, Op::Start) => S::Running,

            (S::Configured, Op::ApplyPreset) => S::Configured,
            (S::Running,    Op::ApplyPreset) => S::Running,

            (S::Running,   Op::Render)   => S::Rendering,
            (S::Rendering, Op::Complete) => S::Stopped,

            (state, op) => return Err(PipelineError::InvalidState { op, state }),
        };
        Ok(next)
    }
}
