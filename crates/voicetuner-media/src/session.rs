// crates/voicetuner-media/src/session.rs
//
// EditingSession: one input video from open to saved result.
//
//   open      → working dir, extract audio.m4a, configure the engine (preview)
//   preset    → engine parameters, any number of times
//   export    → render newAudio.aac → mux convertedVideo.mp4 → authorize → save
//
// Every intermediate file lives in the session's working directory, which is
// removed when the session is dropped. A failed export stops the engine and
// removes what that export produced; `restart` brings the preview back.

use std::io;
use std::path::{Path, PathBuf};

use voicetuner_core::collaborators::{CaptureOutcome, CaptureSource, Persistence, PickerOutcome, VideoPicker};
use voicetuner_core::config::PipelineConfig;
use voicetuner_core::error::{ExtractionFailure, PipelineError};
use voicetuner_core::media_types::{MediaAsset, MediaKind};
use voicetuner_core::paths::{self, SessionPaths};
use voicetuner_core::presets::EffectPreset;
use voicetuner_core::state::EngineState;
use voicetuner_core::Result;

use crate::engine::EffectEngine;
use crate::extract::extract_audio;
use crate::mux::ContainerMuxer;
use crate::probe::probe_video;

pub struct EditingSession {
    paths:  SessionPaths,
    video:  MediaAsset,
    audio:  MediaAsset,
    engine: EffectEngine,
    muxer:  ContainerMuxer,
    preset: EffectPreset,
}

impl EditingSession {
    /// Start a session on `video`. The video file itself is never modified.
    pub fn open(config: PipelineConfig, video: &Path) -> Result<Self> {
        config.validate()?;
        let paths = SessionPaths::create_in(&config.work_dir_root)?;
        tracing::info!("[session] {} in {}", video.display(), paths.dir().display());

        let audio = extract_audio(video, &paths.extracted_audio())?;
        let info  = probe_video(video)
            .map_err(|e| PipelineError::from(ExtractionFailure::Export(e)))?;
        let video = MediaAsset::new(video, MediaKind::Video, info.duration);

        let mut engine = EffectEngine::new(config.clone(), paths.rendered_audio());
        engine.configure(&audio)?;

        Ok(Self {
            paths,
            video,
            audio,
            engine,
            muxer:  ContainerMuxer::new(config),
            preset: EffectPreset::Default,
        })
    }

    /// Ask `picker` for a video and open it. `None` when the user cancels.
    pub fn from_picker(config: PipelineConfig, picker: &mut dyn VideoPicker) -> Result<Option<Self>> {
        match picker.pick() {
            PickerOutcome::Selected(path) => Self::open(config, &path).map(Some),
            PickerOutcome::Cancelled      => Ok(None),
        }
    }

    /// Record with `source` and open the recording. `None` when cancelled.
    pub fn from_capture(config: PipelineConfig, source: &mut dyn CaptureSource) -> Result<Option<Self>> {
        match source.record() {
            CaptureOutcome::Finished(path) => Self::open(config, &path).map(Some),
            CaptureOutcome::Cancelled      => Ok(None),
            CaptureOutcome::Failed(msg)    => Err(PipelineError::Io(io::Error::other(format!("recording failed: {msg}")))),
        }
    }

    pub fn video(&self)    -> &MediaAsset   { &self.video }
    pub fn audio(&self)    -> &MediaAsset   { &self.audio }
    pub fn preset(&self)   -> EffectPreset  { self.preset }
    pub fn engine(&self)   -> &EffectEngine { &self.engine }
    pub fn work_dir(&self) -> &Path         { self.paths.dir() }

    pub fn apply_preset(&mut self, preset: EffectPreset) -> Result<()> {
        self.engine.apply_preset(preset)?;
        self.preset = preset;
        Ok(())
    }

    /// Stop the preview (or a render in progress).
    pub fn stop(&mut self) {
        self.engine.stop();
    }

    /// Rebuild the graph from the extracted audio and re-apply the current
    /// preset. Used after an export, successful or not.
    pub fn restart(&mut self) -> Result<()> {
        self.engine.configure(&self.audio)?;
        self.engine.apply_preset(self.preset)
    }

    /// Render, mux and hand the result to `persistence`. Returns where it
    /// was saved.
    pub fn export(&mut self, persistence: &mut dyn Persistence) -> Result<PathBuf> {
        match self.try_export(persistence) {
            Ok(saved) => {
                tracing::info!("[session] saved {}", saved.display());
                self.restart()?;
                Ok(saved)
            }
            Err(e) => {
                tracing::error!("[session] export failed ({}): {e}", e.kind());
                self.engine.stop();
                let _ = paths::clear(&self.paths.rendered_audio());
                let _ = paths::clear(self.muxer.output_path());
                Err(e)
            }
        }
    }

    fn try_export(&mut self, persistence: &mut dyn Persistence) -> Result<PathBuf> {
        let rendered = self.engine.render_blocking()?;
        let muxed = self.muxer.mux_blocking(&self.video, &rendered).into_result()?;
        if !persistence.authorize() {
            return Err(PipelineError::PermissionDenied);
        }
        persistence.save(muxed.path())
    }

    pub fn engine_state(&self) -> EngineState { self.engine.state() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::probe_audio_duration;
    use crate::test_support::{ffmpeg_available, make_video};

    struct Folder {
        dir:     PathBuf,
        allowed: bool,
        saved:   Vec<PathBuf>,
    }

    impl Persistence for Folder {
        fn authorize(&mut self) -> bool { self.allowed }

        fn save(&mut self, path: &Path) -> Result<PathBuf> {
            let dst = self.dir.join("saved.mp4");
            std::fs::copy(path, &dst)?;
            self.saved.push(dst.clone());
            Ok(dst)
        }
    }

    fn config(root: &Path) -> PipelineConfig {
        let out = root.join("out");
        let work = root.join("work");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::create_dir_all(&work).unwrap();
        PipelineConfig { output_dir: out, work_dir_root: work, ..PipelineConfig::default() }
    }

    #[test]
    fn monster_export_end_to_end() {
        if !ffmpeg_available() { return; }
        ffmpeg_the_third::init().unwrap();
        let root = tempfile::tempdir().unwrap();
        let video = make_video(root.path(), "in.mp4", 2.0, Some(2.0), None);

        let mut s = EditingSession::open(config(root.path()), &video).unwrap();
        assert_eq!(s.engine_state(), EngineState::Running);
        assert!(s.work_dir().join("audio.m4a").exists());

        s.apply_preset(EffectPreset::Monster).unwrap();
        let mut folder = Folder { dir: root.path().to_path_buf(), allowed: true, saved: Vec::new() };
        let saved = s.export(&mut folder).unwrap();

        assert!(saved.exists());
        let audio = probe_audio_duration(&saved).unwrap();
        assert!((audio - 2.0).abs() < 0.15, "{audio}");
        assert!(video.exists());
        assert_eq!(s.engine_state(), EngineState::Running);
        assert_eq!(s.engine().parameters().pitch_cents, -800);
    }

    #[test]
    fn denied_save_is_reported_and_cleaned_up() {
        if !ffmpeg_available() { return; }
        ffmpeg_the_third::init().unwrap();
        let root = tempfile::tempdir().unwrap();
        let video = make_video(root.path(), "in.mp4", 1.0, Some(1.0), None);
        let cfg = config(root.path());
        let output = cfg.output_video_path();

        let mut s = EditingSession::open(cfg, &video).unwrap();
        let mut folder = Folder { dir: root.path().to_path_buf(), allowed: false, saved: Vec::new() };
        assert!(matches!(s.export(&mut folder), Err(PipelineError::PermissionDenied)));
        assert!(folder.saved.is_empty());
        assert!(!output.exists());
        assert_eq!(s.engine_state(), EngineState::Stopped);

        s.restart().unwrap();
        assert_eq!(s.engine_state(), EngineState::Running);
    }

    #[test]
    fn video_without_audio_fails_to_open_and_leaves_nothing() {
        if !ffmpeg_available() { return; }
        ffmpeg_the_third::init().unwrap();
        let root = tempfile::tempdir().unwrap();
        let video = make_video(root.path(), "mute.mp4", 1.0, None, None);
        let cfg = config(root.path());
        let work = cfg.work_dir_root.clone();

        let err = EditingSession::open(cfg, &video).err().unwrap();
        assert!(matches!(err, PipelineError::Extraction(ExtractionFailure::NoAudioTrack)));
        assert_eq!(std::fs::read_dir(work).unwrap().count(), 0);
    }

    #[test]
    fn cancelled_picker_opens_nothing() {
        struct Nope;
        impl VideoPicker for Nope {
            fn pick(&mut self) -> PickerOutcome { PickerOutcome::Cancelled }
        }
        let root = tempfile::tempdir().unwrap();
        assert!(EditingSession::from_picker(config(root.path()), &mut Nope).unwrap().is_none());
    }

    #[test]
    fn failed_recording_is_an_error() {
        struct Broken;
        impl CaptureSource for Broken {
            fn record(&mut self) -> CaptureOutcome { CaptureOutcome::Failed("camera busy".into()) }
        }
        let root = tempfile::tempdir().unwrap();
        let err = EditingSession::from_capture(config(root.path()), &mut Broken).err().unwrap();
        assert!(err.to_string().contains("camera busy"));
    }
}
