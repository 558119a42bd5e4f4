// crates/voicetuner-media/src/aac.rs
//
// AAC encode plumbing shared by the render capture writer and the muxer.
//
// AAC requires exactly `encoder.frame_size()` (typically 1024) samples per
// input frame, but PCM arrives in whatever block size the producer uses. All
// PCM is therefore queued in a planar FIFO; full frames are popped from the
// front and sent to the encoder, and at the very end the tail is zero-padded
// and flushed.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::Sample;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

// ── Audio FIFO ────────────────────────────────────────────────────────────────

/// Planar f32 sample queue with a fixed channel count (1 or 2).
pub(crate) struct AudioFifo {
    planes: Vec<Vec<f32>>,
}

impl AudioFifo {
    pub fn new(channels: usize) -> Self {
        Self { planes: vec![Vec::new(); channels.clamp(1, 2)] }
    }

    /// Samples buffered per channel.
    pub fn len(&self) -> usize { self.planes[0].len() }

    pub fn channels(&self) -> usize { self.planes.len() }

    /// Append planar PCM. A source with fewer planes than the FIFO repeats its
    /// last plane; extra source planes are ignored.
    pub fn push_planar<S: AsRef<[f32]>>(&mut self, src: &[S]) {
        if src.is_empty() { return; }
        for (ch, dst) in self.planes.iter_mut().enumerate() {
            dst.extend_from_slice(src[ch.min(src.len() - 1)].as_ref());
        }
    }

    pub fn push_silence(&mut self, n: usize) {
        for dst in &mut self.planes {
            dst.resize(dst.len() + n, 0.0);
        }
    }

    /// Pop one encoder-sized frame from the front. If fewer than `n` samples
    /// remain the tail is zero-padded. PTS is `sample_idx` in 1/rate.
    pub fn pop_frame(&mut self, n: usize, sample_idx: i64, rate: u32) -> AudioFrame {
        let available = self.len().min(n);
        let mask = if self.channels() == 2 { ChannelLayoutMask::STEREO } else { ChannelLayoutMask::MONO };

        let mut frame = AudioFrame::new(Sample::F32(SampleType::Planar), n, mask);
        frame.set_rate(rate);
        frame.set_pts(Some(sample_idx));

        for (ch, plane) in self.planes.iter_mut().enumerate() {
            unsafe {
                let data = frame.data_mut(ch);
                let dst  = std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut f32, n);
                dst[..available].copy_from_slice(&plane[..available]);
                if available < n { dst[available..].fill(0.0); }
            }
            plane.drain(..available);
        }
        frame
    }
}

// ── Audio encoder state ───────────────────────────────────────────────────────

/// An opened AAC encoder bound to one output stream.
pub(crate) struct AudioEncState {
    encoder:        encoder::Audio,
    /// Output stream index in the muxer.
    stream:         usize,
    rate:           u32,
    /// Next output frame's PTS in samples (encoder timebase = 1/rate).
    out_sample_idx: i64,
    frame_size:     usize,
    pub fifo:       AudioFifo,
    enc_tb:         Rational,
    /// Muxer-assigned timebase; only final after `write_header`.
    ost_tb:         Rational,
}

impl AudioEncState {
    /// Add an AAC stream to `octx` and open an encoder for it. Must be called
    /// before `write_header`; call `bind_stream_timebase` after it.
    pub fn open(
        octx:     &mut ffmpeg::format::context::Output,
        rate:     u32,
        channels: usize,
        bit_rate: usize,
    ) -> Result<Self, String> {
        let channels = channels.clamp(1, 2);
        let enc_tb = Rational::new(1, rate as i32);

        let aac = encoder::find(CodecId::AAC)
            .ok_or_else(|| "AAC encoder not found".to_string())?;

        let mut ost = octx.add_stream(aac)
            .map_err(|e| format!("add audio stream: {e}"))?;
        ost.set_time_base(enc_tb);
        let stream = ost.index();

        let enc_ctx = codec::context::Context::new_with_codec(aac);
        let mut enc = enc_ctx.encoder().audio()
            .map_err(|e| format!("create audio encoder context: {e}"))?;

        enc.set_rate(rate as i32);
        enc.set_ch_layout(if channels == 2 { ChannelLayout::STEREO } else { ChannelLayout::MONO });
        enc.set_format(Sample::F32(SampleType::Planar));
        enc.set_bit_rate(bit_rate);
        enc.set_time_base(enc_tb);

        let encoder = enc.open_as_with(aac, ffmpeg::Dictionary::new())
            .map_err(|e| format!("open AAC encoder: {e}"))?;

        let frame_size = (encoder.frame_size() as usize).max(1024);

        unsafe {
            let ret = ffmpeg::ffi::avcodec_parameters_from_context(
                (**(*octx.as_mut_ptr()).streams.add(stream)).codecpar,
                encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            );
            if ret < 0 {
                return Err(format!("avcodec_parameters_from_context (audio) failed: {ret}"));
            }
        }

        Ok(Self {
            encoder,
            stream,
            rate,
            out_sample_idx: 0,
            frame_size,
            fifo: AudioFifo::new(channels),
            enc_tb,
            ost_tb: enc_tb,
        })
    }

    /// Pick up the timebase the muxer settled on during `write_header`.
    pub fn bind_stream_timebase(&mut self, octx: &ffmpeg::format::context::Output) -> Result<(), String> {
        self.ost_tb = octx.stream(self.stream)
            .ok_or_else(|| format!("audio stream {} missing", self.stream))?
            .time_base();
        Ok(())
    }

    /// Samples handed to the encoder so far (per channel).
    pub fn samples_encoded(&self) -> u64 { self.out_sample_idx as u64 }

    /// Drain buffered samples → encode → write interleaved to `octx`.
    /// With `flush` a partial tail frame is zero-padded and sent as well.
    pub fn drain_fifo(
        &mut self,
        octx:  &mut ffmpeg::format::context::Output,
        flush: bool,
    ) -> Result<(), String> {
        while self.fifo.len() >= self.frame_size
            || (flush && self.fifo.len() > 0)
        {
            let take  = self.fifo.len().min(self.frame_size);
            let frame = self.fifo.pop_frame(self.frame_size, self.out_sample_idx, self.rate);
            self.out_sample_idx += take as i64;

            self.encoder.send_frame(&frame)
                .map_err(|e| format!("send audio frame to encoder: {e}"))?;

            self.drain_packets(octx)?;
        }
        Ok(())
    }

    fn drain_packets(
        &mut self,
        octx: &mut ffmpeg::format::context::Output,
    ) -> Result<(), String> {
        let mut pkt = Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(self.stream);
            pkt.rescale_ts(self.enc_tb, self.ost_tb);
            pkt.write_interleaved(octx)
                .map_err(|e| format!("write audio packet: {e}"))?;
        }
        Ok(())
    }

    /// Flush the FIFO tail, send EOF and write the remaining packets.
    pub fn finish(
        &mut self,
        octx: &mut ffmpeg::format::context::Output,
    ) -> Result<(), String> {
        self.drain_fifo(octx, true)?;
        self.encoder.send_eof()
            .map_err(|e| format!("send EOF to audio encoder: {e}"))?;
        self.drain_packets(octx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_source_fills_both_stereo_planes() {
        let mut fifo = AudioFifo::new(2);
        fifo.push_planar(&[vec![0.25f32; 10]]);
        assert_eq!(fifo.len(), 10);
        assert_eq!(fifo.planes[1], vec![0.25; 10]);
    }

    #[test]
    fn silence_extends_every_plane() {
        let mut fifo = AudioFifo::new(1);
        fifo.push_planar(&[[1.0f32, 1.0]]);
        fifo.push_silence(3);
        assert_eq!(fifo.planes[0], vec![1.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn pop_pads_short_tail() {
        let mut fifo = AudioFifo::new(1);
        fifo.push_planar(&[vec![0.5f32; 3]]);
        let frame = fifo.pop_frame(8, 0, 44_100);
        assert_eq!(frame.samples(), 8);
        let plane = unsafe { std::slice::from_raw_parts(frame.data(0).as_ptr() as *const f32, 8) };
        assert_eq!(&plane[..3], &[0.5; 3]);
        assert!(plane[3..].iter().all(|&s| s == 0.0));
        assert_eq!(fifo.len(), 0);
    }
}
