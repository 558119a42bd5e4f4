// crates/voicetuner-media/src/sink.rs
//
// Output sinks at the end of the processing graph.
//
//   NullSink:   discards; used while rendering offline.
//   ClockSink:  discards, but blocks so blocks leave at the sample rate.
//   DeviceSink: plays through the default output device (feature
//                `device-output`). Falls back to ClockSink when no usable
//                device exists.
//
// With `device-output` the engine adopts the device's default rate
// (`preferred_rate`), so the rendered file matches what the device plays.
// Sinks are created on the engine thread and never leave it.

use std::time::{Duration, Instant};

pub trait OutputSink {
    /// Consume one planar block. May block to pace the caller.
    fn write(&mut self, block: &[Vec<f32>]);
    fn name(&self) -> &'static str;
}

// ── NullSink ──────────────────────────────────────────────────────────────────

pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&mut self, _block: &[Vec<f32>]) {}
    fn name(&self) -> &'static str { "null" }
}

// ── ClockSink ─────────────────────────────────────────────────────────────────

/// Real-time pacing without a device: each write sleeps until the wall clock
/// has caught up with the frames sent so far.
pub struct ClockSink {
    rate:   u32,
    origin: Option<Instant>,
    frames: u64,
}

impl ClockSink {
    pub fn new(rate: u32) -> Self {
        Self { rate: rate.max(1), origin: None, frames: 0 }
    }

    fn due(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.rate as f64)
    }
}

impl OutputSink for ClockSink {
    fn write(&mut self, block: &[Vec<f32>]) {
        let origin = *self.origin.get_or_insert_with(Instant::now);
        self.frames += block.first().map(|c| c.len()).unwrap_or(0) as u64;
        let elapsed = origin.elapsed();
        let due = self.due();
        if due > elapsed {
            std::thread::sleep(due - elapsed);
        }
    }

    fn name(&self) -> &'static str { "clock" }
}

/// Best real-time sink available for `rate` Hz × `channels`.
pub fn realtime_sink(rate: u32, channels: usize) -> Box<dyn OutputSink> {
    #[cfg(feature = "device-output")]
    {
        match device::DeviceSink::open(rate, channels) {
            Ok(sink) => return Box::new(sink),
            Err(e)   => tracing::warn!("[sink] output device unavailable ({e}), using clock pacing"),
        }
    }
    #[cfg(not(feature = "device-output"))]
    let _ = channels;
    Box::new(ClockSink::new(rate))
}

/// Rate the engine should run at: the default output device's rate when
/// device output is enabled and a device exists, otherwise `configured`.
pub fn preferred_rate(configured: u32) -> u32 {
    #[cfg(feature = "device-output")]
    {
        if let Some(rate) = device::default_rate() {
            if rate != configured {
                tracing::info!("[sink] output device runs at {rate} Hz, using it instead of {configured} Hz");
            }
            return rate;
        }
    }
    configured
}

/// Interleave a planar block into `out` with `channels` output channels.
/// Missing source channels repeat the last one.
pub fn interleave(block: &[Vec<f32>], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    let frames = block.first().map(|c| c.len()).unwrap_or(0);
    if block.is_empty() || channels == 0 { return; }
    out.reserve(frames * channels);
    for i in 0..frames {
        for ch in 0..channels {
            out.push(block[ch.min(block.len() - 1)][i]);
        }
    }
}

// ── DeviceSink ────────────────────────────────────────────────────────────────

#[cfg(feature = "device-output")]
pub use device::DeviceSink;

#[cfg(feature = "device-output")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use crossbeam_channel::{bounded, Receiver, Sender};

    use super::{interleave, OutputSink};

    /// Blocks queued ahead of the device callback. Sending blocks when full,
    /// which is what paces the engine thread.
    const QUEUE_BLOCKS: usize = 4;

    pub fn default_rate() -> Option<u32> {
        let device = cpal::default_host().default_output_device()?;
        let config = device.default_output_config().ok()?;
        Some(config.sample_rate().0)
    }

    pub struct DeviceSink {
        tx:       Sender<Vec<f32>>,
        channels: usize,
        scratch:  Vec<f32>,
        _stream:  cpal::Stream,
    }

    impl DeviceSink {
        pub fn open(rate: u32, _channels: usize) -> Result<Self, String> {
            let host = cpal::default_host();
            let device = host.default_output_device()
                .ok_or_else(|| "no default output device".to_string())?;
            let supported = device.default_output_config()
                .map_err(|e| format!("default output config: {e}"))?;

            if supported.sample_format() != cpal::SampleFormat::F32 {
                return Err(format!("device sample format {:?} is not f32", supported.sample_format()));
            }
            if supported.sample_rate().0 != rate {
                return Err(format!("device runs at {} Hz, graph at {rate} Hz", supported.sample_rate().0));
            }

            let channels = supported.channels() as usize;
            let (tx, rx): (Sender<Vec<f32>>, Receiver<Vec<f32>>) = bounded(QUEUE_BLOCKS);
            let mut pending: Vec<f32> = Vec::new();
            let mut cursor = 0usize;

            let stream = device.build_output_stream(
                &supported.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        if cursor >= pending.len() {
                            match rx.try_recv() {
                                Ok(next) => { pending = next; cursor = 0; }
                                // Underrun: output silence rather than block.
                                Err(_) => { *sample = 0.0; continue; }
                            }
                        }
                        *sample = pending[cursor];
                        cursor += 1;
                    }
                },
                |err| tracing::error!("[sink] output stream error: {err}"),
                None,
            ).map_err(|e| format!("build output stream: {e}"))?;

            stream.play().map_err(|e| format!("start output stream: {e}"))?;
            tracing::info!("[sink] playing through default device ({channels} ch @ {rate} Hz)");

            Ok(Self { tx, channels, scratch: Vec::new(), _stream: stream })
        }
    }

    impl OutputSink for DeviceSink {
        fn write(&mut self, block: &[Vec<f32>]) {
            interleave(block, self.channels, &mut self.scratch);
            let _ = self.tx.send(std::mem::take(&mut self.scratch));
        }

        fn name(&self) -> &'static str { "device" }
    }
}
