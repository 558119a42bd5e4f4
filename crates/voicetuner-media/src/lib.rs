// crates/voicetuner-media/src/lib.rs
//
// Everything that touches FFmpeg, threads or audio devices. The pure parts
// (graph nodes, state machine, presets, timeline maths) live in
// voicetuner-core; this crate wires them to real files.
//
// Callers must run `ffmpeg_the_third::init()` once before using any of it.

mod aac;
mod helpers;

pub mod capture;
pub mod decode;
pub mod engine;
pub mod extract;
pub mod mux;
pub mod probe;
pub mod session;
pub mod sink;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use engine::EffectEngine;
pub use extract::extract_audio;
pub use mux::ContainerMuxer;
pub use session::EditingSession;
pub use worker::PipelineWorker;
pub use voicetuner_core::media_types::{MediaAsset, MediaKind, MuxOutcome, PipelineResult};
