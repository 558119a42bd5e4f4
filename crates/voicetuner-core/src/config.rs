// crates/voicetuner-core/src/config.rs
//
// Pipeline configuration. Every field has a default, so an empty JSON object
// (or no file at all) is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// How `render` drives the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Pull blocks as fast as possible; the sink is bypassed.
    #[default]
    Offline,
    /// Pull blocks at the sink's pace; the render is audible.
    RealTime,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Engine output rate. The source is decoded straight to this rate.
    pub output_sample_rate:  u32,
    /// Frames per tap callback.
    pub tap_buffer_frames:   usize,
    pub render_mode:         RenderMode,
    /// Wall-clock bound on one render.
    pub render_timeout_secs: u64,
    /// Extra tap callbacks allowed beyond what the source length needs.
    pub render_slack_blocks: u64,
    /// Displayed output frame size.
    pub mux_width:           u32,
    pub mux_height:          u32,
    pub mux_fps:             u32,
    /// x264 constant rate factor.
    pub mux_crf:             u8,
    pub mux_audio_rate:      u32,
    /// Where `convertedVideo.mp4` is written.
    pub output_dir:          PathBuf,
    /// Parent of the per-session working directories.
    pub work_dir_root:       PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_sample_rate:  44_100,
            tap_buffer_frames:   1024,
            render_mode:         RenderMode::Offline,
            render_timeout_secs: 120,
            render_slack_blocks: 64,
            mux_width:           480,
            mux_height:          640,
            mux_fps:             30,
            mux_crf:             18,
            mux_audio_rate:      44_100,
            output_dir:          default_output_dir(),
            work_dir_root:       std::env::temp_dir(),
        }
    }
}

/// The user's documents directory, or the temp dir when there is none.
pub fn default_output_dir() -> PathBuf {
    dirs::document_dir().unwrap_or_else(std::env::temp_dir)
}

impl PipelineConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("read {}: {e}", path.display())))?;
        let cfg: Self = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("parse {}: {e}", path.display())))?;
        cfg.validate()?;
        tracing::debug!("[config] loaded {}", path.display());
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(PipelineError::Config(msg.to_string()));
        if !(8_000..=192_000).contains(&self.output_sample_rate) {
            return bad("output_sample_rate must be within 8000–192000");
        }
        if !(64..=16_384).contains(&self.tap_buffer_frames) {
            return bad("tap_buffer_frames must be within 64–16384");
        }
        if self.render_timeout_secs == 0 {
            return bad("render_timeout_secs must be positive");
        }
        if self.mux_width == 0 || self.mux_height == 0 || self.mux_width % 2 != 0 || self.mux_height % 2 != 0 {
            return bad("mux_width and mux_height must be positive and even");
        }
        if self.mux_fps == 0 {
            return bad("mux_fps must be positive");
        }
        if self.mux_crf > 51 {
            return bad("mux_crf must be within 0–51");
        }
        if self.mux_audio_rate == 0 {
            return bad("mux_audio_rate must be positive");
        }
        Ok(())
    }

    pub fn output_video_path(&self) -> PathBuf {
        self.output_dir.join(crate::paths::OUTPUT_VIDEO_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = PipelineConfig::default();
        c.validate().unwrap();
        assert_eq!(c.output_sample_rate, 44_100);
        assert_eq!(c.tap_buffer_frames, 1024);
        assert_eq!((c.mux_width, c.mux_height, c.mux_fps), (480, 640, 30));
        assert_eq!(c.render_mode, RenderMode::Offline);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "render_mode": "real_time", "mux_crf": 23 }"#).unwrap();
        let c = PipelineConfig::load(&path).unwrap();
        assert_eq!(c.render_mode, RenderMode::RealTime);
        assert_eq!(c.mux_crf, 23);
        assert_eq!(c.tap_buffer_frames, 1024);
    }

    #[test]
    fn odd_dimensions_are_rejected() {
        let c = PipelineConfig { mux_width: 481, ..Default::default() };
        assert!(matches!(c.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let err = PipelineConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
