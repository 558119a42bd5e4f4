// crates/voicetuner-media/src/decode.rs
//
// Decode an audio asset to planar f32 PCM at the engine's output rate.
//
// The graph never resamples: whatever the source format, it arrives here and
// leaves as FLTP at `rate`, mono if the source is mono and stereo otherwise.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::format::sample::{Sample, Type as SampleType};
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::frame::audio::Audio as AudioFrame;

use voicetuner_core::media_types::PcmBuffer;

const OUT_FMT: Sample = Sample::F32(SampleType::Planar);

/// Decode the best audio stream of `path` to `rate` Hz planar f32.
pub fn decode_pcm(path: &Path, rate: u32) -> Result<PcmBuffer, String> {
    decode_pcm_counted(path, rate).map(|(pcm, _)| pcm)
}

/// `decode_pcm`, also returning how many packets the decoder rejected.
/// Rejected packets leave a gap in the PCM; each one is logged.
pub(crate) fn decode_pcm_counted(path: &Path, rate: u32) -> Result<(PcmBuffer, usize), String> {
    let mut ictx = input(path).map_err(|e| format!("open '{}': {e}", path.display()))?;

    let audio_idx = ictx
        .streams()
        .best(MediaType::Audio)
        .ok_or_else(|| format!("no audio stream in '{}'", path.display()))?
        .index();

    let params = ictx.stream(audio_idx)
        .ok_or_else(|| "audio stream vanished".to_string())?
        .parameters();
    let dec_ctx = ffmpeg::codec::context::Context::from_parameters(params)
        .map_err(|e| format!("codec context: {e}"))?;
    let mut decoder = dec_ctx.decoder().audio()
        .map_err(|e| format!("audio decoder: {e}"))?;

    // Built lazily on the first frame, once the real source format is known.
    let mut resampler: Option<resampling::Context> = None;
    let mut channels: Vec<Vec<f32>> = Vec::new();
    let mut rejected = 0usize;

    for result in ictx.packets() {
        let (stream, packet) = result.map_err(|e| format!("read packet: {e}"))?;
        if stream.index() != audio_idx { continue; }
        if let Err(e) = decoder.send_packet(&packet) {
            rejected += 1;
            tracing::warn!(
                "[decode] packet at pts {:?} rejected ({e}), audio gap in {}",
                packet.pts(), path.display(),
            );
            continue;
        }

        let mut frame = AudioFrame::empty();
        while decoder.receive_frame(&mut frame).is_ok() {
            append_resampled(&frame, rate, &mut resampler, &mut channels)?;
        }
    }

    let _ = decoder.send_eof();
    let mut frame = AudioFrame::empty();
    while decoder.receive_frame(&mut frame).is_ok() {
        append_resampled(&frame, rate, &mut resampler, &mut channels)?;
    }

    // Drain whatever the resampler is still holding.
    if let Some(rs) = resampler.as_mut() {
        let mut tail = AudioFrame::empty();
        if rs.flush(&mut tail).is_ok() && tail.samples() > 0 {
            append_planar(&tail, &mut channels);
        }
    }

    if channels.first().map(|c| c.is_empty()).unwrap_or(true) {
        return Err("no audio samples decoded".into());
    }

    let pcm = PcmBuffer::new(rate, channels);
    tracing::info!(
        "[decode] {} frames × {} ch @ {rate} Hz ({:.3}s, {rejected} packets rejected) ← {}",
        pcm.frames(), pcm.channel_count(), pcm.duration_secs(), path.display(),
    );
    Ok((pcm, rejected))
}

fn append_resampled(
    frame:     &AudioFrame,
    rate:      u32,
    resampler: &mut Option<resampling::Context>,
    out:       &mut Vec<Vec<f32>>,
) -> Result<(), String> {
    let src_channels = frame.ch_layout().channels();
    let out_layout = if src_channels >= 2 { ChannelLayout::STEREO } else { ChannelLayout::MONO };

    let needs_resample = frame.format() != OUT_FMT
        || frame.rate()                 != rate
        || src_channels                 >  2;

    if !needs_resample {
        append_planar(frame, out);
        return Ok(());
    }

    if resampler.is_none() {
        // Mono sources must be declared MONO or swr misreads the channel count.
        let src_layout = if src_channels >= 2 { frame.ch_layout() } else { ChannelLayout::MONO };
        let rs = resampling::Context::get2(
            frame.format(), src_layout, frame.rate(),
            OUT_FMT,        out_layout, rate,
        ).map_err(|e| format!("create resampler: {e}"))?;
        *resampler = Some(rs);
    }
    if let Some(rs) = resampler.as_mut() {
        let mut resampled = AudioFrame::empty();
        rs.run(frame, &mut resampled).map_err(|e| format!("resample: {e}"))?;
        if resampled.samples() > 0 {
            append_planar(&resampled, out);
        }
    }
    Ok(())
}

/// Copy each plane of an FLTP frame onto the end of the matching channel.
fn append_planar(frame: &AudioFrame, out: &mut Vec<Vec<f32>>) {
    let n = frame.samples();
    let planes = frame.ch_layout().channels().clamp(1, 2) as usize;
    if out.is_empty() {
        out.resize_with(planes, Vec::new);
    }
    for (ch, dst) in out.iter_mut().enumerate() {
        let plane = ch.min(planes - 1);
        let src = unsafe {
            std::slice::from_raw_parts(frame.data(plane).as_ptr() as *const f32, n)
        };
        dst.extend_from_slice(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ffmpeg_available, make_audio};

    #[test]
    fn decodes_to_requested_rate() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = make_audio(dir.path(), "tone.m4a", 1.0);
        let pcm = decode_pcm(&path, 48_000).unwrap();
        assert_eq!(pcm.sample_rate, 48_000);
        assert_eq!(pcm.channel_count(), 1);
        assert!((pcm.duration_secs() - 1.0).abs() < 0.05, "{}", pcm.duration_secs());
        assert!(pcm.channels[0].iter().any(|&s| s.abs() > 0.1));
    }

    #[test]
    fn clean_file_has_no_rejected_packets() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = make_audio(dir.path(), "tone.m4a", 0.5);
        let (pcm, rejected) = decode_pcm_counted(&path, 44_100).unwrap();
        assert_eq!(rejected, 0);
        assert!(pcm.frames() > 0);
    }

    #[test]
    fn file_without_audio_is_an_error() {
        if !ffmpeg_available() { return; }
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = crate::test_support::make_video(dir.path(), "mute.mp4", 1.0, None, None);
        assert!(decode_pcm(&path, 44_100).unwrap_err().contains("no audio stream"));
    }
}
