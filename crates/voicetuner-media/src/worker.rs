// crates/voicetuner-media/src/worker.rs
//
// PipelineWorker: runs extraction and mux jobs on background threads and
// reports on one shared result channel.
//
// Every job ends with exactly one terminal `PipelineResult` (AudioExtracted,
// Muxed or Failed). Only one job of each kind may be in flight; a second one
// is refused with `PipelineError::Busy`, delivered on the channel like any
// other failure so callers have a single place to look.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use uuid::Uuid;

use voicetuner_core::config::PipelineConfig;
use voicetuner_core::error::{ExtractionFailure, JobKind, MuxFailure, PipelineError};
use voicetuner_core::media_types::{MediaAsset, PipelineResult};

use crate::extract::extract_audio;
use crate::mux::ContainerMuxer;

type CancelMap = Arc<Mutex<HashMap<Uuid, Arc<AtomicBool>>>>;
type InFlight  = Arc<Mutex<HashMap<JobKind, Uuid>>>;

pub struct PipelineWorker {
    /// Progress and terminal results for every job.
    pub rx:    Receiver<PipelineResult>,
    tx:        Sender<PipelineResult>,
    muxer:     ContainerMuxer,
    shutdown:  Arc<AtomicBool>,
    /// Per-job cancel flags, keyed by job id so cancellation is targeted.
    cancels:   CancelMap,
    in_flight: InFlight,
}

/// Releases a job's in-flight slot and cancel flag when its thread ends.
struct JobGuard {
    job:       Uuid,
    kind:      JobKind,
    cancels:   CancelMap,
    in_flight: InFlight,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.cancels.lock().remove(&self.job);
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&self.kind) == Some(&self.job) {
            in_flight.remove(&self.kind);
        }
    }
}

impl PipelineWorker {
    pub fn new(config: PipelineConfig) -> Self {
        let (tx, rx) = bounded(512);
        Self {
            rx,
            tx,
            muxer:     ContainerMuxer::new(config),
            shutdown:  Arc::new(AtomicBool::new(false)),
            cancels:   Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cancel everything in flight and refuse new work.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for flag in self.cancels.lock().values() {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Signal job `job` to stop. A mux checks between frames and ends with
    /// `Failed { error: Mux(Cancelled) }`; an extraction is too short to stop
    /// midway and runs to its normal end.
    pub fn cancel(&self, job: Uuid) {
        if let Some(flag) = self.cancels.lock().get(&job) {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Claim the slot for `kind`, registering the cancel flag before any
    /// thread exists. Refusals are reported on the channel.
    fn begin(&self, job: Uuid, kind: JobKind) -> Option<(JobGuard, Arc<AtomicBool>)> {
        {
            let mut in_flight = self.in_flight.lock();
            if let Some(running) = in_flight.get(&kind) {
                tracing::warn!("[worker] {kind} job {job} refused, {running} still running");
                let _ = self.tx.send(PipelineResult::Failed {
                    job, kind, error: PipelineError::Busy(kind),
                });
                return None;
            }
            in_flight.insert(kind, job);
        }
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancels.lock().insert(job, Arc::clone(&cancel));
        let guard = JobGuard {
            job,
            kind,
            cancels:   Arc::clone(&self.cancels),
            in_flight: Arc::clone(&self.in_flight),
        };
        Some((guard, cancel))
    }

    /// Extract the audio track of `video` into `dst`.
    pub fn extract_audio(&self, job: Uuid, video: PathBuf, dst: PathBuf) {
        let Some((guard, _cancel)) = self.begin(job, JobKind::Extract) else { return };
        let tx = self.tx.clone();
        let sd = self.shutdown.clone();

        thread::spawn(move || {
            let result = if sd.load(Ordering::Relaxed) {
                PipelineResult::Failed {
                    job,
                    kind:  JobKind::Extract,
                    error: ExtractionFailure::Export("worker shutting down".into()).into(),
                }
            } else {
                match extract_audio(&video, &dst) {
                    Ok(asset) => PipelineResult::AudioExtracted { job, asset },
                    Err(error) => PipelineResult::Failed { job, kind: JobKind::Extract, error },
                }
            };
            // Free the slot before reporting, so a caller reacting to the
            // result can start the next job straight away.
            drop(guard);
            let _ = tx.send(result);
        });
    }

    /// Mux `video` with `audio` into the configured output file.
    pub fn mux(&self, job: Uuid, video: MediaAsset, audio: MediaAsset) {
        let Some((guard, cancel)) = self.begin(job, JobKind::Mux) else { return };
        let tx    = self.tx.clone();
        let sd    = self.shutdown.clone();
        let muxer = self.muxer.clone();

        thread::spawn(move || {
            let result = if sd.load(Ordering::Relaxed) {
                PipelineResult::Failed {
                    job,
                    kind:  JobKind::Mux,
                    error: MuxFailure::Cancelled("worker shutting down".into()).into(),
                }
            } else {
                let progress_tx = tx.clone();
                let mut progress = |done: u64, total: u64| {
                    let _ = progress_tx.send(PipelineResult::Progress {
                        job, kind: JobKind::Mux, done, total,
                    });
                };
                match muxer.mux_with(&video, &audio, &cancel, &mut progress).into_result() {
                    Ok(asset) => PipelineResult::Muxed { job, asset },
                    Err(e)    => PipelineResult::Failed { job, kind: JobKind::Mux, error: e.into() },
                }
            };
            drop(guard);
            let _ = tx.send(result);
        });
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voicetuner_core::media_types::MediaKind;
    use crate::test_support::{ffmpeg_available, make_audio, make_video};

    fn terminal(w: &PipelineWorker, job: Uuid) -> PipelineResult {
        loop {
            let r = w.rx.recv_timeout(Duration::from_secs(60)).expect("no result");
            if r.job() == job && r.is_terminal() {
                return r;
            }
        }
    }

    fn config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig { output_dir: dir.to_path_buf(), ..PipelineConfig::default() }
    }

    #[test]
    fn failed_extraction_is_reported_once() {
        ffmpeg_the_third::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let w = PipelineWorker::new(config(dir.path()));
        let job = Uuid::new_v4();
        w.extract_audio(job, dir.path().join("missing.mov"), dir.path().join("audio.m4a"));
        match terminal(&w, job) {
            PipelineResult::Failed { kind: JobKind::Extract, error: PipelineError::Extraction(_), .. } => {}
            other => panic!("unexpected {other:?}"),
        }
        assert!(w.rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn second_mux_while_busy_is_refused() {
        if !ffmpeg_available() { return; }
        ffmpeg_the_third::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "in.mp4", 4.0, None, None);
        let audio = make_audio(dir.path(), "a.m4a", 4.0);
        let v = MediaAsset::new(&video, MediaKind::Video, 4.0);
        let a = MediaAsset::new(&audio, MediaKind::Audio, 4.0);

        let w = PipelineWorker::new(config(dir.path()));
        let first  = Uuid::new_v4();
        let second = Uuid::new_v4();
        w.mux(first, v.clone(), a.clone());
        w.mux(second, v, a);

        match terminal(&w, second) {
            PipelineResult::Failed { error: PipelineError::Busy(JobKind::Mux), .. } => {}
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(terminal(&w, first), PipelineResult::Muxed { .. }));
    }

    #[test]
    fn cancelled_mux_reports_cancellation() {
        if !ffmpeg_available() { return; }
        ffmpeg_the_third::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "in.mp4", 10.0, None, None);
        let audio = make_audio(dir.path(), "a.m4a", 10.0);

        let w = PipelineWorker::new(config(dir.path()));
        let job = Uuid::new_v4();
        w.mux(
            job,
            MediaAsset::new(&video, MediaKind::Video, 10.0),
            MediaAsset::new(&audio, MediaKind::Audio, 10.0),
        );
        w.cancel(job);
        match terminal(&w, job) {
            PipelineResult::Failed { error: PipelineError::Mux(MuxFailure::Cancelled(_)), .. } => {}
            // The job may finish before the flag is seen on a fast machine.
            PipelineResult::Muxed { .. } => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extraction_then_mux_on_one_worker() {
        if !ffmpeg_available() { return; }
        ffmpeg_the_third::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "in.mp4", 1.0, Some(1.0), None);
        let w = PipelineWorker::new(config(dir.path()));

        let job = Uuid::new_v4();
        w.extract_audio(job, video.clone(), dir.path().join("audio.m4a"));
        let audio = match terminal(&w, job) {
            PipelineResult::AudioExtracted { asset, .. } => asset,
            other => panic!("unexpected {other:?}"),
        };

        let job = Uuid::new_v4();
        w.mux(job, MediaAsset::new(&video, MediaKind::Video, 1.0), audio);
        match terminal(&w, job) {
            PipelineResult::Muxed { asset, .. } => assert!(asset.path.exists()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
