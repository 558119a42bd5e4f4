// crates/voicetuner-core/src/graph/reverb.rs
//
// Freeverb-style reverb: eight parallel lowpass-feedback combs into four
// series allpasses, one bank per channel. Channels after the first get their
// delay lines lengthened by a small spread so stereo sources decorrelate.
//
// Room size and damping are fixed at a medium-hall setting; the only exposed
// parameter is the wet/dry mix. At mix 0 the output is the input, bit for bit.

use super::{AudioNode, NodeKind};

/// Comb delays in samples at 44.1 kHz.
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
/// Allpass delays in samples at 44.1 kHz.
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;

const ROOM_SIZE:  f32 = 0.7;
const DAMPING:    f32 = 0.5;
const INPUT_GAIN: f32 = 0.015;
const WET_SCALE:  f32 = 3.0;

struct Comb {
    buffer: Vec<f32>,
    index:  usize,
    store:  f32,
}

impl Comb {
    fn new(size: usize) -> Self {
        Self { buffer: vec![0.0; size.max(1)], index: 0, store: 0.0 }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let out = self.buffer[self.index];
        self.store = out * (1.0 - DAMPING) + self.store * DAMPING;
        self.buffer[self.index] = input + self.store * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
        self.store = 0.0;
    }
}

struct Allpass {
    buffer: Vec<f32>,
    index:  usize,
}

impl Allpass {
    fn new(size: usize) -> Self {
        Self { buffer: vec![0.0; size.max(1)], index: 0 }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

struct Bank {
    combs:     [Comb; 8],
    allpasses: [Allpass; 4],
}

impl Bank {
    fn new(scale: f32, spread: usize) -> Self {
        Self {
            combs:     std::array::from_fn(|i| Comb::new((COMB_TUNINGS[i] as f32 * scale) as usize + spread)),
            allpasses: std::array::from_fn(|i| Allpass::new((ALLPASS_TUNINGS[i] as f32 * scale) as usize + spread)),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let x = input * INPUT_GAIN;
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(x, feedback);
        }
        for ap in &mut self.allpasses {
            out = ap.process(out);
        }
        out * WET_SCALE
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(Comb::reset);
        self.allpasses.iter_mut().for_each(Allpass::reset);
    }
}

pub struct Reverb {
    banks:    Vec<Bank>,
    feedback: f32,
    /// 0.0–1.0
    mix:      f32,
}

impl Reverb {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let scale  = sample_rate as f32 / 44_100.0;
        let spread = (STEREO_SPREAD as f32 * scale) as usize;
        Self {
            banks:    (0..channels.max(1)).map(|ch| Bank::new(scale, spread * ch)).collect(),
            feedback: ROOM_SIZE * 0.28 + 0.7,
            mix:      0.0,
        }
    }

    /// Wet/dry mix in percent, clamped to 0–100.
    pub fn set_wet_dry_mix(&mut self, percent: f32) {
        self.mix = percent.clamp(0.0, 100.0) / 100.0;
    }

    pub fn wet_dry_mix(&self) -> f32 { self.mix * 100.0 }
}

impl AudioNode for Reverb {
    fn kind(&self) -> NodeKind { NodeKind::Reverb }

    fn process(&mut self, block: &mut [Vec<f32>]) {
        let mix = self.mix;
        let dry = 1.0 - mix;
        for (channel, bank) in block.iter_mut().zip(self.banks.iter_mut()) {
            for s in channel.iter_mut() {
                // The tail keeps running at mix 0 so raising the mix mid-stream
                // does not start from an empty room.
                let wet = bank.process(*s, self.feedback);
                if mix > 0.0 {
                    *s = *s * dry + wet * mix;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.banks.iter_mut().for_each(Bank::reset);
    }
}
