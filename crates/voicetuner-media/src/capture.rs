// crates/voicetuner-media/src/capture.rs
//
// Render capture writers. The engine's tap appends mono blocks; the writer
// owns the file until `finish`, which finalises it and hands back its path.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::output_as;

use crate::aac::AudioEncState;

/// Encoder bit rate for rendered audio: the top of the AAC range for mono.
const CAPTURE_BIT_RATE: usize = 256_000;

/// Sink for the rendered signal. Lives on the engine thread.
pub trait CaptureWriter: Send {
    /// Append mono samples in order.
    fn append(&mut self, samples: &[f32]) -> Result<(), String>;

    /// Frames accepted so far.
    fn frames_written(&self) -> u64;

    /// Finalise the file and return where it is.
    fn finish(self: Box<Self>) -> Result<PathBuf, String>;
}

// ── AacFileWriter ─────────────────────────────────────────────────────────────

/// Mono AAC in an MPEG-4 container at the engine's output rate.
pub struct AacFileWriter {
    path:    PathBuf,
    octx:    ffmpeg::format::context::Output,
    audio:   AudioEncState,
    written: u64,
}

// The output context holds raw FFmpeg pointers. The writer is created on one
// thread and then used exclusively by the engine thread, never shared.
unsafe impl Send for AacFileWriter {}

impl AacFileWriter {
    pub fn create(path: &Path, rate: u32) -> Result<Self, String> {
        let mut octx = output_as(path, "mp4")
            .map_err(|e| format!("create '{}': {e}", path.display()))?;

        let mut audio = AudioEncState::open(&mut octx, rate, 1, CAPTURE_BIT_RATE)?;

        octx.write_header().map_err(|e| format!("write header: {e}"))?;
        audio.bind_stream_timebase(&octx)?;

        tracing::debug!("[capture] writing {rate} Hz mono AAC → {}", path.display());
        Ok(Self { path: path.to_path_buf(), octx, audio, written: 0 })
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl CaptureWriter for AacFileWriter {
    fn append(&mut self, samples: &[f32]) -> Result<(), String> {
        self.audio.fifo.push_planar(&[samples]);
        self.written += samples.len() as u64;
        self.audio.drain_fifo(&mut self.octx, false)
    }

    fn frames_written(&self) -> u64 { self.written }

    fn finish(mut self: Box<Self>) -> Result<PathBuf, String> {
        self.audio.finish(&mut self.octx)?;
        self.octx.write_trailer().map_err(|e| format!("write trailer: {e}"))?;
        tracing::info!(
            "[capture] finalised {} frames ({} encoded) → {}",
            self.written, self.audio.samples_encoded(), self.path.display(),
        );
        Ok(self.path.clone())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory writer for engine tests.

    use std::path::PathBuf;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::CaptureWriter;

    #[derive(Clone, Default)]
    pub struct MemoryWriter {
        pub samples:  Arc<Mutex<Vec<f32>>>,
        pub finished: Arc<Mutex<bool>>,
    }

    impl CaptureWriter for MemoryWriter {
        fn append(&mut self, samples: &[f32]) -> Result<(), String> {
            self.samples.lock().extend_from_slice(samples);
            Ok(())
        }

        fn frames_written(&self) -> u64 { self.samples.lock().len() as u64 }

        fn finish(self: Box<Self>) -> Result<PathBuf, String> {
            *self.finished.lock() = true;
            Ok(PathBuf::from("memory"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::probe_audio_duration;

    #[test]
    fn writes_playable_mono_aac() {
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newAudio.aac");

        let mut w: Box<dyn CaptureWriter> = Box::new(AacFileWriter::create(&path, 44_100).unwrap());
        let tone: Vec<f32> = (0..1000)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 44_100.0).sin() * 0.5)
            .collect();
        for _ in 0..(44_100 / 1000) {
            w.append(&tone).unwrap();
        }
        assert_eq!(w.frames_written(), 44_000);
        let out = w.finish().unwrap();
        assert_eq!(out, path);

        let d = probe_audio_duration(&path).unwrap();
        assert!((d - 44_000.0 / 44_100.0).abs() < 0.05, "{d}");
    }
}
