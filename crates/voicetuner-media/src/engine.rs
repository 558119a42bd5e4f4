// crates/voicetuner-media/src/engine.rs
//
// EffectEngine: owns the processing graph for one editing session, previews
// it, and renders it to a file.
//
// Threading:
//   • The graph lives on one engine thread, spawned by `configure` and fed
//     through a crossbeam command channel. The tap, the completion check and
//     every write happen on that thread, in block order.
//   • Node parameters are shared through a mutex and re-applied before each
//     pulled block, so a preset change lands on the next block and never on
//     audio that was already captured.
//   • The render completion sits in a take-once slot. Whichever side takes it
//     first wins: the engine thread delivers it, or `stop` drops it unfired.
//
// After `configure` the engine plays the source once through the preview
// sink, then idles in Running until it is told to render or stop. A render
// rewinds the source, skips the graph's fixed latency and captures exactly
// `source_frames` mono frames.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;

use voicetuner_core::capture::{CaptureCounter, CaptureStep};
use voicetuner_core::config::{PipelineConfig, RenderMode};
use voicetuner_core::error::PipelineError;
use voicetuner_core::graph::{GraphParameters, ProcessingGraph};
use voicetuner_core::helpers::time::frames_to_secs;
use voicetuner_core::media_types::{MediaAsset, MediaKind, PcmBuffer};
use voicetuner_core::paths;
use voicetuner_core::presets::EffectPreset;
use voicetuner_core::state::{EngineOp, EngineState};
use voicetuner_core::Result;

use crate::capture::{AacFileWriter, CaptureWriter};
use crate::decode::decode_pcm;
use crate::sink::{preferred_rate, realtime_sink, NullSink, OutputSink};

/// Render completion. Fires at most once, on the engine thread.
pub type Completion = Box<dyn FnOnce(Result<MediaAsset>) + Send>;

enum EngineCmd {
    Render {
        writer:   Box<dyn CaptureWriter>,
        counter:  CaptureCounter,
        deadline: Instant,
    },
    Stop,
}

/// State shared between the handle and the engine thread.
struct Shared {
    state:      Mutex<EngineState>,
    params:     Mutex<GraphParameters>,
    completion: Mutex<Option<Completion>>,
}

pub struct EffectEngine {
    config:        PipelineConfig,
    render_path:   PathBuf,
    shared:        Arc<Shared>,
    cmd_tx:        Option<Sender<EngineCmd>>,
    thread:        Option<JoinHandle<()>>,
    sample_rate:   u32,
    source_frames: u64,
    latency:       u64,
}

impl EffectEngine {
    /// `render_path` is where `render` writes its AAC file.
    pub fn new(config: PipelineConfig, render_path: impl Into<PathBuf>) -> Self {
        Self {
            sample_rate:   preferred_rate(config.output_sample_rate),
            config,
            render_path:   render_path.into(),
            shared: Arc::new(Shared {
                state:      Mutex::new(EngineState::Unconfigured),
                params:     Mutex::new(GraphParameters::neutral()),
                completion: Mutex::new(None),
            }),
            cmd_tx:        None,
            thread:        None,
            source_frames: 0,
            latency:       0,
        }
    }

    pub fn state(&self) -> EngineState { *self.shared.state.lock() }

    /// Snapshot of the parameters the next block will be processed with.
    pub fn parameters(&self) -> GraphParameters { *self.shared.params.lock() }

    pub fn render_path(&self) -> &Path { &self.render_path }

    /// Frame count of the configured source at the engine rate.
    pub fn source_frames(&self) -> u64 { self.source_frames }

    /// Rate of the graph and of the rendered file.
    pub fn sample_rate(&self) -> u32 { self.sample_rate }

    // ── Configuration ─────────────────────────────────────────────────────────

    /// Decode `audio` and build a fresh graph around it.
    pub fn configure(&mut self, audio: &MediaAsset) -> Result<()> {
        self.state().transition(EngineOp::Configure)?;
        match decode_pcm(audio.path(), self.sample_rate) {
            Ok(pcm) => self.configure_pcm(pcm),
            Err(e) => {
                self.teardown();
                *self.shared.state.lock() = EngineState::Stopped;
                tracing::error!("[engine] decode {} failed: {e}", audio.path().display());
                Err(PipelineError::GraphConfiguration(e))
            }
        }
    }

    /// Build the graph around already-decoded PCM and start the engine thread.
    pub fn configure_pcm(&mut self, pcm: PcmBuffer) -> Result<()> {
        let configured = self.state().transition(EngineOp::Configure)?;
        self.teardown();

        if pcm.sample_rate != self.sample_rate {
            *self.shared.state.lock() = EngineState::Stopped;
            return Err(PipelineError::GraphConfiguration(format!(
                "source is {} Hz, engine runs at {} Hz", pcm.sample_rate, self.sample_rate,
            )));
        }

        let graph = ProcessingGraph::new(pcm);
        self.source_frames = graph.source_frames();
        self.latency       = graph.latency_frames() as u64;
        *self.shared.params.lock() = GraphParameters::neutral();
        *self.shared.state.lock()  = configured;

        let (tx, rx) = unbounded();
        let shared   = Arc::clone(&self.shared);
        let block    = self.config.tap_buffer_frames;
        let mode     = self.config.render_mode;

        let spawned = thread::Builder::new()
            .name("voicetuner-engine".into())
            .spawn(move || engine_thread(graph, shared, rx, block, mode));

        match spawned {
            Ok(handle) => {
                self.cmd_tx = Some(tx);
                self.thread = Some(handle);
            }
            Err(e) => {
                *self.shared.state.lock() = EngineState::Stopped;
                return Err(PipelineError::GraphConfiguration(format!("start engine thread: {e}")));
            }
        }

        let running = configured.transition(EngineOp::Start)?;
        *self.shared.state.lock() = running;
        tracing::info!(
            "[engine] configured: {} frames @ {} Hz, latency {} frames",
            self.source_frames, self.sample_rate, self.latency,
        );
        Ok(())
    }

    // ── Presets ───────────────────────────────────────────────────────────────

    /// Reset every node to neutral, then overlay `preset`.
    pub fn apply_preset(&mut self, preset: EffectPreset) -> Result<()> {
        let state = self.shared.state.lock();
        state.transition(EngineOp::ApplyPreset)?;
        *self.shared.params.lock() = GraphParameters::for_preset(preset);
        tracing::debug!("[engine] preset {preset} applied");
        Ok(())
    }

    // ── Render ────────────────────────────────────────────────────────────────

    /// Render the source through the graph into `render_path`. `on_complete`
    /// fires exactly once with the rendered asset, unless `stop` comes first.
    pub fn render(
        &mut self,
        on_complete: impl FnOnce(Result<MediaAsset>) + Send + 'static,
    ) -> Result<()> {
        self.state().transition(EngineOp::Render)?;
        paths::clear(&self.render_path)?;
        let writer = AacFileWriter::create(&self.render_path, self.sample_rate)
            .map_err(|e| PipelineError::Io(io::Error::other(e)))?;
        self.render_with_writer(Box::new(writer), on_complete)
    }

    /// Same as `render`, capturing into any `CaptureWriter`.
    pub fn render_with_writer(
        &mut self,
        writer:      Box<dyn CaptureWriter>,
        on_complete: impl FnOnce(Result<MediaAsset>) + Send + 'static,
    ) -> Result<()> {
        let mut state = self.shared.state.lock();
        let rendering = state.transition(EngineOp::Render)?;

        let block   = self.config.tap_buffer_frames;
        let budget  = CaptureCounter::callback_budget(
            self.source_frames, self.latency, block, self.config.render_slack_blocks,
        );
        let counter  = CaptureCounter::new(self.source_frames, self.latency, budget);
        let deadline = Instant::now() + self.render_allowance();

        let Some(tx) = self.cmd_tx.as_ref() else {
            return Err(PipelineError::GraphConfiguration("engine thread is not running".into()));
        };

        *self.shared.completion.lock() = Some(Box::new(on_complete));
        if tx.send(EngineCmd::Render { writer, counter, deadline }).is_err() {
            self.shared.completion.lock().take();
            *state = EngineState::Stopped;
            return Err(PipelineError::GraphConfiguration("engine thread is gone".into()));
        }
        *state = rendering;
        tracing::info!("[engine] render started: {} frames, budget {budget} blocks", self.source_frames);
        Ok(())
    }

    /// `render` and wait for the result.
    pub fn render_blocking(&mut self) -> Result<MediaAsset> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.render(move |r| { let _ = tx.send(r); })?;
        let result = rx.recv().unwrap_or_else(|_| Err(PipelineError::InvalidState {
            op:    EngineOp::Complete,
            state: EngineState::Stopped,
        }));
        self.join_finished();
        result
    }

    /// Wall-clock time a render may take before it is declared stuck. A
    /// real-time render cannot beat playback speed, so the source duration
    /// (plus the latency tail) comes on top of the configured timeout.
    fn render_allowance(&self) -> Duration {
        let timeout = Duration::from_secs(self.config.render_timeout_secs);
        match self.config.render_mode {
            RenderMode::Offline  => timeout,
            RenderMode::RealTime => {
                let frames = self.source_frames + self.latency;
                timeout + Duration::from_secs_f64(frames_to_secs(frames, self.sample_rate))
            }
        }
    }

    // ── Stop ──────────────────────────────────────────────────────────────────

    /// Stop the engine from any state. An undelivered render completion is
    /// dropped without firing and its partial file removed. Idempotent.
    pub fn stop(&mut self) {
        let undelivered = self.shared.completion.lock().take();
        self.teardown();
        if undelivered.is_some() {
            let _ = paths::clear(&self.render_path);
            tracing::info!("[engine] render stopped before completion");
        }
        let mut state = self.shared.state.lock();
        if *state != EngineState::Stopped {
            tracing::debug!("[engine] {} → stopped", *state);
        }
        *state = EngineState::Stopped;
    }

    /// Stop and join the engine thread, if there is one.
    fn teardown(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(EngineCmd::Stop);
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("[engine] engine thread panicked");
            }
        }
    }

    /// Reap a thread that already exited after delivering its render.
    fn join_finished(&mut self) {
        if self.state() == EngineState::Stopped {
            self.teardown();
        }
    }
}

impl Drop for EffectEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Engine thread ─────────────────────────────────────────────────────────────

fn engine_thread(
    mut graph: ProcessingGraph,
    shared:    Arc<Shared>,
    rx:        Receiver<EngineCmd>,
    block:     usize,
    mode:      RenderMode,
) {
    let rate     = graph.sample_rate();
    let channels = graph.channels();
    let mut preview: Option<Box<dyn OutputSink>> = Some(realtime_sink(rate, channels));

    loop {
        let cmd = if preview.is_some() {
            match rx.try_recv() {
                Ok(cmd)                         => Some(cmd),
                Err(TryRecvError::Empty)        => None,
                Err(TryRecvError::Disconnected) => return,
            }
        } else {
            match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_)  => return,
            }
        };

        match cmd {
            Some(EngineCmd::Stop) => return,
            Some(EngineCmd::Render { writer, counter, deadline }) => {
                preview = None;
                let result = run_render(&mut graph, &shared, &rx, writer, counter, deadline, block, mode);
                deliver(&shared, result);
                return;
            }
            None => {
                if let Some(sink) = preview.as_mut() {
                    graph.apply(&shared.params.lock());
                    let out = graph.pull(block);
                    sink.write(&out);
                    if graph.source_finished() {
                        tracing::debug!("[engine] preview finished on {} sink", sink.name());
                        preview = None;
                    }
                }
            }
        }
    }
}

enum RenderEnd {
    Done(MediaAsset),
    Failed(PipelineError),
    Stopped,
}

#[allow(clippy::too_many_arguments)]
fn run_render(
    graph:       &mut ProcessingGraph,
    shared:      &Shared,
    rx:          &Receiver<EngineCmd>,
    mut writer:  Box<dyn CaptureWriter>,
    mut counter: CaptureCounter,
    deadline:    Instant,
    block:       usize,
    mode:        RenderMode,
) -> RenderEnd {
    let rate = graph.sample_rate();
    let mut sink: Box<dyn OutputSink> = match mode {
        RenderMode::Offline  => Box::new(NullSink),
        RenderMode::RealTime => realtime_sink(rate, graph.channels()),
    };

    graph.rewind();
    let mismatch = |c: &CaptureCounter| PipelineError::RenderTimeoutOrMismatch {
        written:  c.written(),
        expected: c.expected(),
    };

    while !counter.is_complete() {
        match rx.try_recv() {
            Ok(EngineCmd::Stop) | Err(TryRecvError::Disconnected) => return RenderEnd::Stopped,
            Ok(EngineCmd::Render { .. }) | Err(TryRecvError::Empty) => {}
        }
        if Instant::now() >= deadline {
            tracing::warn!("[engine] render deadline passed at {}/{}", counter.written(), counter.expected());
            return RenderEnd::Failed(mismatch(&counter));
        }

        graph.apply(&shared.params.lock());
        let out = graph.pull(block);
        sink.write(&out);

        // Tap: mixer output, downmixed to mono.
        let mono = PcmBuffer::new(rate, out).downmix_mono();
        match counter.accept(mono.len()) {
            CaptureStep::Write { start, len, .. } => {
                if let Err(e) = writer.append(&mono[start..start + len]) {
                    return RenderEnd::Failed(PipelineError::Io(io::Error::other(e)));
                }
            }
            CaptureStep::Skip | CaptureStep::Closed => {}
            CaptureStep::Exhausted => return RenderEnd::Failed(mismatch(&counter)),
        }
    }

    graph.rewind();
    let frames = counter.written();
    match writer.finish() {
        Ok(path) => {
            let duration = frames_to_secs(frames, rate);
            tracing::info!("[engine] render complete: {frames} frames ({duration:.3}s)");
            RenderEnd::Done(MediaAsset::new(path, MediaKind::Audio, duration))
        }
        Err(e) => RenderEnd::Failed(PipelineError::Io(io::Error::other(e))),
    }
}

/// Settle the state and hand the result to the completion, if still there.
fn deliver(shared: &Shared, end: RenderEnd) {
    {
        let mut state = shared.state.lock();
        *state = match end {
            RenderEnd::Done(_) => state.transition(EngineOp::Complete).unwrap_or(EngineState::Stopped),
            _                  => EngineState::Stopped,
        };
    }
    let completion = shared.completion.lock().take();
    match (completion, end) {
        (Some(cb), RenderEnd::Done(asset)) => cb(Ok(asset)),
        (Some(cb), RenderEnd::Failed(e))   => {
            tracing::error!("[engine] render failed: {e}");
            cb(Err(e));
        }
        // Stopped: the completion was already taken by `stop`.
        _ => {}
    }
}
