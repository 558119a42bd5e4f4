// crates/voicetuner-media/src/extract.rs
//
// AudioExtractor: pull the audio track out of a video container without
// re-encoding it.
//
// The best audio stream is stream-copied into an MPEG-4 audio file. Packet
// timestamps are shifted so the first packet lands at zero, which keeps the
// extracted track aligned with the start of the video even when the source
// audio carried a start offset (edit lists, priming).
//
// Failure policy:
//   • no audio stream         → ExtractionFailure::NoAudioTrack, nothing written
//   • anything after that     → ExtractionFailure::Export(cause), partial file removed

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec;
use ffmpeg::encoder;
use ffmpeg::format::{input, output_as};
use ffmpeg::media::Type as MediaType;

use voicetuner_core::error::{ExtractionFailure, PipelineError};
use voicetuner_core::media_types::{MediaAsset, MediaKind};
use voicetuner_core::paths;

use crate::probe::probe_audio_duration;

/// Extract the audio track of `video` into `dst` (an `.m4a` path).
pub fn extract_audio(video: &Path, dst: &Path) -> Result<MediaAsset, PipelineError> {
    paths::clear(dst)?;

    let outcome = copy_audio_track(video, dst);
    match outcome {
        Ok(()) => {}
        Err(CopyError::NoAudio) => {
            tracing::warn!("[extract] no audio track in {}", video.display());
            return Err(ExtractionFailure::NoAudioTrack.into());
        }
        Err(CopyError::Failed(cause)) => {
            tracing::error!("[extract] {} failed: {cause}", video.display());
            let _ = paths::clear(dst);
            return Err(ExtractionFailure::Export(cause).into());
        }
    }

    let duration = probe_audio_duration(dst).map_err(|cause| {
        let _ = paths::clear(dst);
        PipelineError::from(ExtractionFailure::Export(cause))
    })?;

    tracing::info!("[extract] audio {duration:.3}s → {}", dst.display());
    Ok(MediaAsset::new(dst, MediaKind::Audio, duration))
}

enum CopyError {
    NoAudio,
    Failed(String),
}

impl From<String> for CopyError {
    fn from(s: String) -> Self { CopyError::Failed(s) }
}

fn copy_audio_track(video: &Path, dst: &Path) -> Result<(), CopyError> {
    let mut ictx = input(video).map_err(|e| format!("open '{}': {e}", video.display()))?;

    let (audio_idx, in_tb) = match ictx.streams().best(MediaType::Audio) {
        Some(s) => (s.index(), s.time_base()),
        None    => return Err(CopyError::NoAudio),
    };

    let mut octx = output_as(dst, "mp4")
        .map_err(|e| format!("create '{}': {e}", dst.display()))?;

    {
        let ist = ictx.stream(audio_idx).ok_or_else(|| "audio stream vanished".to_string())?;
        let mut ost = octx.add_stream(encoder::find(codec::Id::None))
            .map_err(|e| format!("add audio stream: {e}"))?;
        ost.set_parameters(ist.parameters());
        // The source container's codec tag may not be valid in MP4; let the
        // muxer pick its own.
        unsafe {
            (*ost.parameters().as_mut_ptr()).codec_tag = 0;
        }
        ost.set_time_base(in_tb);
    }

    octx.write_header().map_err(|e| format!("write header: {e}"))?;
    let out_tb = octx.stream(0).ok_or_else(|| "output stream missing".to_string())?.time_base();

    // Offset of the first packet, in input timebase units.
    let mut origin: Option<i64> = None;
    let mut packets = 0u64;

    for result in ictx.packets() {
        let (stream, mut packet) = result.map_err(|e| format!("read packet: {e}"))?;
        if stream.index() != audio_idx { continue; }

        let first = *origin.get_or_insert_with(|| packet.dts().or(packet.pts()).unwrap_or(0));
        packet.set_pts(packet.pts().map(|t| t - first));
        packet.set_dts(packet.dts().map(|t| t - first));
        packet.rescale_ts(in_tb, out_tb);
        packet.set_position(-1);
        packet.set_stream(0);
        packet.write_interleaved(&mut octx)
            .map_err(|e| format!("write packet: {e}"))?;
        packets += 1;
    }

    if packets == 0 {
        return Err(CopyError::Failed("audio stream has no packets".into()));
    }

    octx.write_trailer().map_err(|e| format!("write trailer: {e}"))?;
    tracing::debug!("[extract] copied {packets} packets");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ffmpeg_available, make_video};

    #[test]
    fn extracted_duration_matches_source_audio() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "in.mp4", 3.0, Some(3.0), None);
        let source_audio = probe_audio_duration(&video).unwrap();

        let dst = dir.path().join("audio.m4a");
        let asset = extract_audio(&video, &dst).unwrap();
        assert_eq!(asset.kind, MediaKind::Audio);
        assert!(dst.exists());
        // One AAC frame at 44.1 kHz.
        let unit = 1024.0 / 44_100.0;
        assert!((asset.duration_secs - source_audio).abs() <= unit + 1e-3,
            "{} vs {source_audio}", asset.duration_secs);
        assert!(video.exists(), "input must not be touched");
    }

    #[test]
    fn video_without_audio_is_a_typed_failure() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "mute.mp4", 1.0, None, None);
        let dst = dir.path().join("audio.m4a");
        let err = extract_audio(&video, &dst).unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(ExtractionFailure::NoAudioTrack)));
        assert!(!dst.exists());
    }

    #[test]
    fn unreadable_input_is_an_export_failure() {
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.mov");
        std::fs::write(&bogus, b"not a movie").unwrap();
        let dst = dir.path().join("audio.m4a");
        let err = extract_audio(&bogus, &dst).unwrap_err();
        match err {
            PipelineError::Extraction(ExtractionFailure::Export(cause)) => assert!(!cause.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!dst.exists());
    }

    #[test]
    fn stale_output_is_replaced() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video = make_video(dir.path(), "in.mp4", 1.0, Some(1.0), None);
        let dst = dir.path().join("audio.m4a");
        std::fs::write(&dst, b"stale").unwrap();
        extract_audio(&video, &dst).unwrap();
        assert!(std::fs::metadata(&dst).unwrap().len() > 5);
    }
}
