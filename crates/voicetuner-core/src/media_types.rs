// crates/voicetuner-core/src/media_types.rs
//
// Types that flow between voicetuner-media and its callers.
// No ffmpeg here, just plain data.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{JobKind, MuxFailure, PipelineError};
use crate::helpers::time::frames_to_secs;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Handle to an audio or video file on disk. Read-only once opened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub path:          PathBuf,
    pub kind:          MediaKind,
    /// Probed duration of the relevant track (audio track for `Audio`,
    /// video track for `Video`).
    pub duration_secs: f64,
}

impl MediaAsset {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind, duration_secs: f64) -> Self {
        Self { path: path.into(), kind, duration_secs }
    }

    pub fn path(&self) -> &Path { &self.path }
}

// ── PCM ───────────────────────────────────────────────────────────────────────

/// Planar f32 PCM: one `Vec` per channel, all of equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels:    Vec<Vec<f32>>,
}

impl PcmBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self { sample_rate, channels }
    }

    pub fn channel_count(&self) -> usize { self.channels.len() }

    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn duration_secs(&self) -> f64 {
        frames_to_secs(self.frames() as u64, self.sample_rate)
    }

    /// Average of all channels. A mono buffer is returned as-is.
    pub fn downmix_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => {
                let scale = 1.0 / n as f32;
                (0..self.frames())
                    .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                    .collect()
            }
        }
    }
}

// ── Job results ───────────────────────────────────────────────────────────────

/// Terminal state of a mux. Only `Completed` is success; the other three
/// always carry a cause.
#[derive(Clone, Debug, PartialEq)]
pub enum MuxOutcome {
    Completed(MediaAsset),
    Failed(String),
    Cancelled(String),
    Unexpected(String),
}

impl MuxOutcome {
    pub fn into_result(self) -> Result<MediaAsset, MuxFailure> {
        match self {
            MuxOutcome::Completed(asset) => Ok(asset),
            MuxOutcome::Failed(e)        => Err(MuxFailure::Failed(non_empty(e))),
            MuxOutcome::Cancelled(e)     => Err(MuxFailure::Cancelled(non_empty(e))),
            MuxOutcome::Unexpected(e)    => Err(MuxFailure::Unexpected(non_empty(e))),
        }
    }
}

fn non_empty(cause: String) -> String {
    if cause.trim().is_empty() { "unknown cause".into() } else { cause }
}

/// Results sent from the PipelineWorker background threads to the caller.
/// Every job produces exactly one of the terminal variants.
#[derive(Debug)]
pub enum PipelineResult {
    Progress       { job: Uuid, kind: JobKind, done: u64, total: u64 },
    AudioExtracted { job: Uuid, asset: MediaAsset },
    Muxed          { job: Uuid, asset: MediaAsset },
    Failed         { job: Uuid, kind: JobKind, error: PipelineError },
}

impl PipelineResult {
    pub fn job(&self) -> Uuid {
        match self {
            PipelineResult::Progress { job, .. }
            | PipelineResult::AudioExtracted { job, .. }
            | PipelineResult::Muxed { job, .. }
            | PipelineResult::Failed { job, .. } => *job,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineResult::Progress { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let pcm = PcmBuffer::new(44_100, vec![vec![1.0, 0.5], vec![0.0, -0.5]]);
        assert_eq!(pcm.downmix_mono(), vec![0.5, 0.0]);
        assert_eq!(pcm.frames(), 2);
    }

    #[test]
    fn duration_from_frames() {
        let pcm = PcmBuffer::new(44_100, vec![vec![0.0; 88_200]; 2]);
        assert!((pcm.duration_secs() - 2.0).abs() < 1e-9);
        assert_eq!(PcmBuffer::default().duration_secs(), 0.0);
    }

    #[test]
    fn failed_mux_outcome_always_has_cause() {
        let err = MuxOutcome::Unexpected(String::new()).into_result().unwrap_err();
        assert_eq!(err, MuxFailure::Unexpected("unknown cause".into()));
    }

    #[test]
    fn only_progress_is_non_terminal() {
        let job = Uuid::new_v4();
        let p = PipelineResult::Progress { job, kind: JobKind::Mux, done: 1, total: 2 };
        assert!(!p.is_terminal());
        let f = PipelineResult::Failed { job, kind: JobKind::Mux, error: PipelineError::Busy(JobKind::Mux) };
        assert!(f.is_terminal());
        assert_eq!(f.job(), job);
    }
}
