// crates/voicetuner-core/src/lib.rs
//
// Plain data and DSP for the voice pipeline. No ffmpeg in this crate.

pub mod capture;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod graph;
pub mod helpers;
pub mod media_types;
pub mod paths;
pub mod presets;
pub mod state;
pub mod timeline;

pub use error::{PipelineError, Result};
