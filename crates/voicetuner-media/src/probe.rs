// crates/voicetuner-media/src/probe.rs
//
// In-process FFmpeg probing: durations, video dimensions, display matrix.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::media::Type;

use voicetuner_core::timeline::{VideoTransform, DISPLAY_MATRIX_BYTES};

/// What the muxer needs to know about the source video track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoInfo {
    pub duration:  f64,
    pub width:     u32,
    pub height:    u32,
    /// Average frame rate; 0 when the container does not say.
    pub fps:       f64,
    pub transform: VideoTransform,
}

/// Duration of the best stream of `kind`, in seconds. Falls back to the
/// container duration when the stream does not carry one.
pub fn probe_stream_duration(path: &Path, kind: Type) -> Result<f64, String> {
    let ctx = input(path).map_err(|e| format!("open '{}': {e}", path.display()))?;
    let stream = ctx.streams().best(kind)
        .ok_or_else(|| format!("no {kind:?} stream in '{}'", path.display()))?;

    let tb = stream.time_base();
    if stream.duration() > 0 && tb.denominator() != 0 {
        let d = stream.duration() as f64 * tb.numerator() as f64 / tb.denominator() as f64;
        tracing::debug!("[probe] {kind:?} stream {d:.3}s ← {}", path.display());
        return Ok(d);
    }

    let d = ctx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;
    if d > 0.0 {
        tracing::debug!("[probe] container {d:.3}s ← {}", path.display());
        return Ok(d);
    }
    Err(format!("duration unknown for '{}'", path.display()))
}

pub fn probe_audio_duration(path: &Path) -> Result<f64, String> {
    probe_stream_duration(path, Type::Audio)
}

pub fn probe_video(path: &Path) -> Result<VideoInfo, String> {
    let duration = probe_stream_duration(path, Type::Video)?;
    let ctx = input(path).map_err(|e| format!("open '{}': {e}", path.display()))?;
    let stream = ctx.streams().best(Type::Video)
        .ok_or_else(|| format!("no video stream in '{}'", path.display()))?;

    let (width, height) = unsafe {
        let p = stream.parameters().as_ptr();
        ((*p).width as u32, (*p).height as u32)
    };
    let rate = stream.avg_frame_rate();
    let fps = if rate.denominator() != 0 { f64::from(rate) } else { 0.0 };
    let transform = unsafe { read_display_matrix(stream.parameters().as_ptr()) }
        .unwrap_or(VideoTransform::IDENTITY);

    tracing::info!(
        "[probe] video {width}x{height} @ {fps:.2} fps, {duration:.3}s, rotation {:?} ccw ← {}",
        transform.rotation_degrees(),
        path.display(),
    );
    Ok(VideoInfo { duration, width, height, fps, transform })
}

// ── Display matrix side data ──────────────────────────────────────────────────
//
// The matrix lives in the stream's codec parameters as DISPLAYMATRIX coded
// side data (FFmpeg 6.1+). ffmpeg-the-third has no safe accessor for it, so
// both directions go through the raw API.

/// Read the display matrix from `par`, if present.
///
/// # Safety
/// `par` must point to a valid `AVCodecParameters`.
pub unsafe fn read_display_matrix(
    par: *const ffmpeg::ffi::AVCodecParameters,
) -> Option<VideoTransform> {
    let sd = ffmpeg::ffi::av_packet_side_data_get(
        (*par).coded_side_data,
        (*par).nb_coded_side_data,
        ffmpeg::ffi::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
    );
    if sd.is_null() || (*sd).size < DISPLAY_MATRIX_BYTES {
        return None;
    }
    let bytes = std::slice::from_raw_parts((*sd).data as *const u8, DISPLAY_MATRIX_BYTES);
    VideoTransform::from_ne_bytes(bytes)
}

/// Attach `transform` to `par` as DISPLAYMATRIX coded side data. Identity is
/// not written, matching what encoders do for unrotated video.
///
/// # Safety
/// `par` must point to a valid, writable `AVCodecParameters`.
pub unsafe fn write_display_matrix(
    par:       *mut ffmpeg::ffi::AVCodecParameters,
    transform: &VideoTransform,
) -> Result<(), String> {
    if *transform == VideoTransform::IDENTITY {
        return Ok(());
    }
    let sd = ffmpeg::ffi::av_packet_side_data_new(
        &mut (*par).coded_side_data,
        &mut (*par).nb_coded_side_data,
        ffmpeg::ffi::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        DISPLAY_MATRIX_BYTES,
        0,
    );
    if sd.is_null() {
        return Err("allocate display matrix side data".into());
    }
    let bytes = transform.to_ne_bytes();
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), (*sd).data, DISPLAY_MATRIX_BYTES);
    Ok(())
}
