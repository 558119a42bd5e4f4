// crates/voicetuner-media/src/mux.rs
//
// ContainerMuxer: original video frames + rendered audio → one H.264/AAC MP4.
//
// Stream layout in the output:
//   Stream 0: H.264 video (YUV420P, CRF from config, preset fast, fixed fps)
//   Stream 1: AAC audio  (FLTP stereo, mux_audio_rate, 128 kbps)
//
// Timeline: the video track is authoritative. The output lasts exactly the
// video's duration; longer audio is cut at that point and shorter audio is
// followed by silence up to it.
//
// Geometry: the configured size is the *displayed* size. The source's display
// matrix is copied verbatim onto the output stream, so for a quarter-turned
// source the coded frame is the configured size swapped. The picture is
// scaled to fit inside the coded frame and letterboxed on black.
//
// Frame rate: output frame i shows the latest source frame whose presentation
// time is ≤ i / fps. Source frames are duplicated or dropped as needed; the
// count of output frames is fixed up front from the video duration.
//
// Audio is interleaved with video: after each output frame the FIFO is topped
// up to that frame's end time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::{input as open_input, output as open_output, Pixel};
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::scaling::{Context as ScaleCtx, Flags as ScaleFlags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use voicetuner_core::config::PipelineConfig;
use voicetuner_core::error::MuxFailure;
use voicetuner_core::helpers::geometry::{coded_size, fit_inside};
use voicetuner_core::media_types::{MediaAsset, MediaKind, MuxOutcome, PcmBuffer};
use voicetuner_core::paths;
use voicetuner_core::timeline::{AudioFit, CompositionTimeline};

use crate::aac::AudioEncState;
use crate::decode::decode_pcm;
use crate::helpers::yuv::{blit, fill_black};
use crate::probe::{probe_video, write_display_matrix};

/// Report progress every this many output frames.
const PROGRESS_INTERVAL: u64 = 15;

const AUDIO_BIT_RATE: usize = 128_000;

// ── Public API ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ContainerMuxer {
    config: PipelineConfig,
    output: PathBuf,
}

impl ContainerMuxer {
    /// Muxer writing to `config.output_video_path()`.
    pub fn new(config: PipelineConfig) -> Self {
        let output = config.output_video_path();
        Self { config, output }
    }

    pub fn with_output(config: PipelineConfig, output: impl Into<PathBuf>) -> Self {
        Self { config, output: output.into() }
    }

    pub fn output_path(&self) -> &Path { &self.output }

    /// Mux on a background thread. Exactly one of the callbacks fires.
    pub fn mux(
        &self,
        video:      MediaAsset,
        audio:      MediaAsset,
        on_success: impl FnOnce(MediaAsset) + Send + 'static,
        on_failure: impl FnOnce(MuxFailure) + Send + 'static,
    ) -> JoinHandle<()> {
        let muxer = self.clone();
        thread::spawn(move || {
            match muxer.mux_blocking(&video, &audio).into_result() {
                Ok(asset) => on_success(asset),
                Err(e)    => on_failure(e),
            }
        })
    }

    /// Mux on the calling thread.
    pub fn mux_blocking(&self, video: &MediaAsset, audio: &MediaAsset) -> MuxOutcome {
        self.mux_with(video, audio, &AtomicBool::new(false), &mut |_, _| {})
    }

    /// Mux on the calling thread, polling `cancel` between frames and
    /// reporting `(frames_done, frames_total)` as it goes.
    pub fn mux_with(
        &self,
        video:    &MediaAsset,
        audio:    &MediaAsset,
        cancel:   &AtomicBool,
        progress: &mut dyn FnMut(u64, u64),
    ) -> MuxOutcome {
        if let Err(e) = paths::clear(&self.output) {
            return MuxOutcome::Failed(format!("remove stale output: {e}"));
        }

        let result = run_mux(video.path(), audio.path(), &self.output, &self.config, cancel, progress);
        let outcome = match result {
            Ok(()) => self.completed_asset(),
            Err(MuxAbort::Cancelled) => MuxOutcome::Cancelled("cancelled by caller".into()),
            Err(MuxAbort::Failed(e)) => MuxOutcome::Failed(e),
        };

        match &outcome {
            MuxOutcome::Completed(asset) => {
                tracing::info!("[mux] {:.3}s → {}", asset.duration_secs, asset.path.display());
            }
            other => {
                tracing::warn!("[mux] not completed: {other:?}");
                let _ = paths::clear(&self.output);
            }
        }
        outcome
    }

    /// The export reported success; confirm there is a readable file.
    fn completed_asset(&self) -> MuxOutcome {
        match std::fs::metadata(&self.output) {
            Ok(m) if m.len() > 0 => {}
            Ok(_)  => return MuxOutcome::Unexpected("output file is empty".into()),
            Err(e) => return MuxOutcome::Unexpected(format!("output file missing: {e}")),
        }
        match probe_video(&self.output) {
            Ok(info) => MuxOutcome::Completed(MediaAsset::new(&self.output, MediaKind::Video, info.duration)),
            Err(e)   => MuxOutcome::Unexpected(format!("output is not readable: {e}")),
        }
    }
}

// ── Internal implementation ───────────────────────────────────────────────────

enum MuxAbort {
    Cancelled,
    Failed(String),
}

impl From<String> for MuxAbort {
    fn from(s: String) -> Self { MuxAbort::Failed(s) }
}

/// Source audio cut or padded to the timeline, handed out in order.
struct AudioFeed {
    pcm:    PcmBuffer,
    cursor: usize,
    total:  u64,
}

impl AudioFeed {
    /// Push samples into `state`'s FIFO until `until` samples have been fed.
    fn feed_to(&mut self, state: &mut AudioEncState, until: u64) {
        let until = until.min(self.total) as usize;
        if until <= self.cursor { return; }

        let avail = self.pcm.frames();
        let real_end = until.min(avail);
        if real_end > self.cursor {
            let slices: Vec<&[f32]> = self.pcm.channels.iter()
                .map(|c| &c[self.cursor..real_end])
                .collect();
            state.fifo.push_planar(&slices);
        }
        let silent = until - real_end.max(self.cursor);
        if silent > 0 {
            state.fifo.push_silence(silent);
        }
        self.cursor = until;
    }
}

fn run_mux(
    video_path: &Path,
    audio_path: &Path,
    out_path:   &Path,
    cfg:        &PipelineConfig,
    cancel:     &AtomicBool,
    progress:   &mut dyn FnMut(u64, u64),
) -> Result<(), MuxAbort> {
    let info = probe_video(video_path)?;
    let pcm  = decode_pcm(audio_path, cfg.mux_audio_rate)?;

    let fps  = cfg.mux_fps;
    let rate = cfg.mux_audio_rate;
    let timeline = CompositionTimeline::video_authoritative(
        info.duration, pcm.duration_secs(), info.transform, 1.0 / fps as f64,
    );
    match timeline.audio_fit {
        AudioFit::Exact                 => {}
        AudioFit::Truncate { dropped }  => tracing::info!("[mux] audio longer than video, dropping {dropped:.3}s"),
        AudioFit::PadSilence { padded } => tracing::info!("[mux] audio shorter than video, padding {padded:.3}s"),
    }
    if info.fps > 0.0 && (info.fps - fps as f64).abs() > 0.01 {
        tracing::info!("[mux] source {:.2} fps, output {fps} fps: frames duplicated or dropped", info.fps);
    }

    let total_frames  = timeline.video_frames(fps).max(1);
    let total_samples = timeline.audio_samples(rate);
    let (out_w, out_h) = coded_size(cfg.mux_width, cfg.mux_height, &timeline.transform);

    // ── Output context ────────────────────────────────────────────────────────
    let mut octx = open_output(out_path)
        .map_err(|e| format!("could not open output '{}': {e}", out_path.display()))?;

    // ── Video encoder (stream 0) ──────────────────────────────────────────────
    let frame_tb = Rational::new(1, fps as i32);

    let h264 = encoder::find(CodecId::H264)
        .ok_or_else(|| "H.264 encoder not found, is libx264 available?".to_string())?;

    let mut ost_video = octx.add_stream(h264)
        .map_err(|e| format!("add video stream: {e}"))?;
    ost_video.set_time_base(frame_tb);

    let video_enc_ctx = codec::context::Context::new_with_codec(h264);
    let mut video_enc = video_enc_ctx.encoder().video()
        .map_err(|e| format!("create video encoder context: {e}"))?;

    video_enc.set_width(out_w);
    video_enc.set_height(out_h);
    video_enc.set_format(Pixel::YUV420P);
    video_enc.set_time_base(frame_tb);
    video_enc.set_frame_rate(Some(Rational::new(fps as i32, 1)));
    video_enc.set_bit_rate(0);

    let mut opts = ffmpeg::Dictionary::new();
    opts.set("crf",    &cfg.mux_crf.to_string());
    opts.set("preset", "fast");

    let mut video_encoder = video_enc.open_as_with(h264, opts)
        .map_err(|e| format!("open H.264 encoder: {e}"))?;

    // libavcodec resets the SAR during open; set it on the opened context.
    video_encoder.set_aspect_ratio(Rational::new(1, 1));

    unsafe {
        let par = (**(*octx.as_mut_ptr()).streams.add(0)).codecpar;
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(
            par,
            video_encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
        );
        if ret < 0 {
            return Err(format!("avcodec_parameters_from_context (video) failed: {ret}").into());
        }
        write_display_matrix(par, &timeline.transform)?;
    }

    // ── Audio encoder (stream 1) ──────────────────────────────────────────────
    let mut audio = AudioEncState::open(&mut octx, rate, 2, AUDIO_BIT_RATE)?;

    // ── Header ────────────────────────────────────────────────────────────────
    octx.write_header()
        .map_err(|e| format!("write output header: {e}"))?;
    audio.bind_stream_timebase(&octx)?;
    let ost_video_tb = octx.stream(0)
        .ok_or_else(|| "video stream missing after header".to_string())?
        .time_base();

    let mut feed = AudioFeed { pcm, cursor: 0, total: total_samples };
    let samples_at = |frame: u64| -> u64 {
        ((frame as f64) * rate as f64 / fps as f64).round() as u64
    };

    // ── Source video decode ───────────────────────────────────────────────────
    let mut ictx = open_input(video_path)
        .map_err(|e| format!("open '{}': {e}", video_path.display()))?;
    let video_idx = ictx.streams().best(MediaType::Video)
        .ok_or_else(|| format!("no video stream in '{}'", video_path.display()))?
        .index();
    let in_tb = ictx.stream(video_idx)
        .ok_or_else(|| "video stream vanished".to_string())?
        .time_base();

    let mut decoder = {
        let stream = ictx.stream(video_idx)
            .ok_or_else(|| "video stream vanished".to_string())?;
        codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| format!("video decoder context: {e}"))?
            .decoder().video()
            .map_err(|e| format!("open video decoder: {e}"))?
    };

    let (fit_w, fit_h, off_x, off_y) = fit_inside(info.width, info.height, out_w, out_h);

    let mut emitter = FrameEmitter {
        encoder:      &mut video_encoder,
        frame_tb,
        ost_tb:       ost_video_tb,
        next:         0,
        total:        total_frames,
        fps:          fps as f64,
        last:         None,
    };

    let mut scaler: Option<ScaleCtx> = None;
    let mut first_pts: Option<i64> = None;
    let mut decoded = VideoFrame::empty();

    let mut on_frame = |decoded: &VideoFrame,
                        emitter: &mut FrameEmitter,
                        octx: &mut ffmpeg::format::context::Output,
                        audio: &mut AudioEncState,
                        feed: &mut AudioFeed,
                        progress: &mut dyn FnMut(u64, u64)| -> Result<(), MuxAbort> {
        let ts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
        let origin = *first_pts.get_or_insert(ts);
        let t = (ts - origin) as f64 * f64::from(in_tb);

        // Slots before this frame's time belong to the previous frame.
        emitter.emit_until(t, octx, audio, feed, &samples_at, cancel, progress)?;
        if emitter.done() { return Ok(()); }

        if scaler.is_none() {
            let sc = ScaleCtx::get(
                decoded.format(), info.width, info.height,
                Pixel::YUV420P,   fit_w,      fit_h,
                ScaleFlags::BILINEAR,
            ).map_err(|e| format!("create swscale context: {e}"))?;
            scaler = Some(sc);
        }
        let Some(sc) = scaler.as_mut() else { return Ok(()) };

        let mut fitted = VideoFrame::empty();
        sc.run(decoded, &mut fitted)
            .map_err(|e| format!("scale video frame: {e}"))?;

        let mut canvas = VideoFrame::new(Pixel::YUV420P, out_w, out_h);
        fill_black(&mut canvas);
        blit(&fitted, &mut canvas, fit_w as usize, fit_h as usize, off_x as usize, off_y as usize);
        // swscale and fresh frames carry no SAR; players must not stretch.
        unsafe {
            (*canvas.as_mut_ptr()).sample_aspect_ratio = ffmpeg::ffi::AVRational { num: 1, den: 1 };
        }
        emitter.last = Some(canvas);
        Ok(())
    };

    // ── Packet loop ───────────────────────────────────────────────────────────
    for result in ictx.packets() {
        let (stream, packet) = result
            .map_err(|e| format!("read packet from '{}': {e}", video_path.display()))?;
        if cancel.load(Ordering::Relaxed) { return Err(MuxAbort::Cancelled); }
        if stream.index() != video_idx { continue; }

        decoder.send_packet(&packet)
            .map_err(|e| format!("send video packet to decoder: {e}"))?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            on_frame(&decoded, &mut emitter, &mut octx, &mut audio, &mut feed, &mut *progress)?;
        }
        if emitter.done() { break; }
    }

    // ── Drain video decoder ───────────────────────────────────────────────────
    if !emitter.done() {
        let _ = decoder.send_eof();
        while decoder.receive_frame(&mut decoded).is_ok() {
            on_frame(&decoded, &mut emitter, &mut octx, &mut audio, &mut feed, &mut *progress)?;
        }
    }

    // Remaining slots repeat the last source frame.
    emitter.emit_until(f64::INFINITY, &mut octx, &mut audio, &mut feed, &samples_at, cancel, &mut *progress)?;
    if emitter.next == 0 {
        return Err("no video frames decoded".to_string().into());
    }

    // ── Flush video encoder ───────────────────────────────────────────────────
    emitter.flush(&mut octx)?;

    // ── Flush audio: top up to the full length, then encoder tail ─────────────
    feed.feed_to(&mut audio, total_samples);
    audio.finish(&mut octx)?;

    octx.write_trailer()
        .map_err(|e| format!("write trailer: {e}"))?;

    tracing::debug!(
        "[mux] {} frames @ {fps} fps, {} audio samples, coded {out_w}x{out_h}",
        emitter.next, audio.samples_encoded(),
    );
    Ok(())
}

/// Turns source frames into a constant-rate output sequence.
struct FrameEmitter<'a> {
    encoder:  &'a mut encoder::video::Video,
    frame_tb: Rational,
    ost_tb:   Rational,
    /// Next output frame index (= its PTS in 1/fps).
    next:     u64,
    total:    u64,
    fps:      f64,
    /// Most recent composited source frame.
    last:     Option<VideoFrame>,
}

impl FrameEmitter<'_> {
    fn done(&self) -> bool { self.next >= self.total }

    /// Emit `last` for every output slot whose time is before `t`.
    #[allow(clippy::too_many_arguments)]
    fn emit_until(
        &mut self,
        t:          f64,
        octx:       &mut ffmpeg::format::context::Output,
        audio:      &mut AudioEncState,
        feed:       &mut AudioFeed,
        samples_at: &dyn Fn(u64) -> u64,
        cancel:     &AtomicBool,
        progress:   &mut dyn FnMut(u64, u64),
    ) -> Result<(), MuxAbort> {
        let Some(frame) = self.last.as_mut() else { return Ok(()) };

        while self.next < self.total && (self.next as f64) / self.fps < t - 1e-9 {
            if cancel.load(Ordering::Relaxed) { return Err(MuxAbort::Cancelled); }

            frame.set_pts(Some(self.next as i64));
            self.encoder.send_frame(frame)
                .map_err(|e| format!("send video frame to encoder: {e}"))?;

            let mut pkt = Packet::empty();
            while self.encoder.receive_packet(&mut pkt).is_ok() {
                pkt.set_stream(0);
                pkt.rescale_ts(self.frame_tb, self.ost_tb);
                pkt.write_interleaved(octx)
                    .map_err(|e| format!("write video packet: {e}"))?;
            }
            self.next += 1;

            feed.feed_to(audio, samples_at(self.next));
            audio.drain_fifo(octx, false)?;

            if self.next % PROGRESS_INTERVAL == 0 || self.next == self.total {
                progress(self.next, self.total);
            }
        }
        Ok(())
    }

    fn flush(&mut self, octx: &mut ffmpeg::format::context::Output) -> Result<(), String> {
        self.encoder.send_eof()
            .map_err(|e| format!("send EOF to video encoder: {e}"))?;
        let mut pkt = Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(0);
            pkt.rescale_ts(self.frame_tb, self.ost_tb);
            pkt.write_interleaved(octx)
                .map_err(|e| format!("write flush video packet: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::probe_audio_duration;
    use crate::test_support::{ffmpeg_available, make_audio, make_video};
    use voicetuner_core::timeline::VideoTransform;

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig { output_dir: dir.to_path_buf(), ..PipelineConfig::default() }
    }

    fn assets(video: &Path, audio: &Path, vsecs: f64, asecs: f64) -> (MediaAsset, MediaAsset) {
        (MediaAsset::new(video, MediaKind::Video, vsecs), MediaAsset::new(audio, MediaKind::Audio, asecs))
    }

    #[test]
    fn longer_audio_is_cut_to_video_duration() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "in.mp4", 3.0, None, None);
        let audio = make_audio(dir.path(), "long.m4a", 5.0);
        let (v, a) = assets(&video, &audio, 3.0, 5.0);

        let muxer = ContainerMuxer::new(config(dir.path()));
        let asset = match muxer.mux_blocking(&v, &a) {
            MuxOutcome::Completed(asset) => asset,
            other => panic!("mux failed: {other:?}"),
        };
        assert_eq!(asset.path, dir.path().join("convertedVideo.mp4"));
        assert!((asset.duration_secs - 3.0).abs() < 0.05, "video {}", asset.duration_secs);

        let audio_out = probe_audio_duration(&asset.path).unwrap();
        assert!((audio_out - 3.0).abs() < 0.1, "audio {audio_out}");

        let info = probe_video(&asset.path).unwrap();
        assert_eq!((info.width, info.height), (480, 640));
        assert_eq!(info.transform, VideoTransform::IDENTITY);
    }

    #[test]
    fn shorter_audio_is_padded_with_silence() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "in.mp4", 2.0, None, None);
        let audio = make_audio(dir.path(), "short.m4a", 1.0);
        let (v, a) = assets(&video, &audio, 2.0, 1.0);

        let asset = ContainerMuxer::new(config(dir.path())).mux_blocking(&v, &a)
            .into_result().unwrap();
        let audio_out = probe_audio_duration(&asset.path).unwrap();
        assert!((audio_out - 2.0).abs() < 0.1, "audio {audio_out}");
    }

    #[test]
    fn quarter_turn_source_keeps_its_orientation() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "rot.mp4", 1.0, Some(1.0), Some(90));
        let source = probe_video(&video).unwrap();
        let audio = make_audio(dir.path(), "a.m4a", 1.0);
        let (v, a) = assets(&video, &audio, 1.0, 1.0);

        let asset = ContainerMuxer::new(config(dir.path())).mux_blocking(&v, &a)
            .into_result().unwrap();
        let info = probe_video(&asset.path).unwrap();
        assert_eq!(info.transform, source.transform);
        // Coded 640x480, displayed 480x640 once rotated.
        assert_eq!((info.width, info.height), (640, 480));
    }

    #[test]
    fn cancelled_mux_leaves_no_file() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "in.mp4", 2.0, None, None);
        let audio = make_audio(dir.path(), "a.m4a", 2.0);
        let (v, a) = assets(&video, &audio, 2.0, 2.0);

        let muxer = ContainerMuxer::new(config(dir.path()));
        let cancel = AtomicBool::new(true);
        let outcome = muxer.mux_with(&v, &a, &cancel, &mut |_, _| {});
        assert!(matches!(outcome, MuxOutcome::Cancelled(ref c) if !c.is_empty()));
        assert!(!muxer.output_path().exists());
    }

    #[test]
    fn missing_input_goes_to_failure_callback() {
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (v, a) = assets(&dir.path().join("nope.mov"), &dir.path().join("nope.m4a"), 1.0, 1.0);
        let (tx, rx) = crossbeam_channel::bounded(1);
        let tx2 = tx.clone();
        ContainerMuxer::new(config(dir.path()))
            .mux(v, a, move |_| { let _ = tx.send(None); }, move |e| { let _ = tx2.send(Some(e)); })
            .join()
            .unwrap();
        match rx.recv().unwrap() {
            Some(MuxFailure::Failed(cause)) => assert!(!cause.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn progress_reaches_total() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "in.mp4", 1.0, None, None);
        let audio = make_audio(dir.path(), "a.m4a", 1.0);
        let (v, a) = assets(&video, &audio, 1.0, 1.0);

        let mut last = (0, 0);
        let outcome = ContainerMuxer::new(config(dir.path()))
            .mux_with(&v, &a, &AtomicBool::new(false), &mut |d, t| last = (d, t));
        assert!(matches!(outcome, MuxOutcome::Completed(_)));
        assert_eq!(last.0, last.1);
        assert!((29..=31).contains(&last.1), "{last:?}");
    }
}
