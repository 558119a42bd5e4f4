// crates/voicetuner-media/src/helpers/mod.rs
//
// Internal helpers for the ffmpeg pipelines. Not re-exported from lib.rs.

pub mod yuv;
