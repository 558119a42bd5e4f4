// crates/voicetuner-core/src/graph/distortion.rs
//
// Distortion node with two factory algorithms:
//
//   DrumsBitBrush       bit-depth reduction with light sample-and-hold
//   SpeechAlienChatter  ring modulation followed by sample-rate decimation
//
// Pre-gain is applied to the wet path only; the dry path is untouched, so at
// mix 0 the node is an exact passthrough whatever the pre-gain.

use std::f32::consts::TAU;

use super::{AudioNode, NodeKind};
use crate::presets::{DistortionParams, DistortionPreset};

const BIT_BRUSH_BITS:       u32 = 8;
const BIT_BRUSH_DOWNSAMPLE: u32 = 2;
const CHATTER_CARRIER_HZ:   f32 = 280.0;
const CHATTER_DOWNSAMPLE:   u32 = 4;

#[derive(Clone, Copy, Default)]
struct Hold {
    value:   f32,
    counter: u32,
}

pub struct Distortion {
    sample_rate: f32,
    params:      DistortionParams,
    pre_gain:    f32,
    mix:         f32,
    holds:       Vec<Hold>,
    /// Carrier phase in radians; shared by all channels.
    phase:       f32,
}

impl Distortion {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let params = DistortionParams::load_factory(DistortionPreset::DrumsBitBrush);
        let mut d = Self {
            sample_rate: sample_rate.max(1) as f32,
            params,
            pre_gain:    1.0,
            mix:         0.0,
            holds:       vec![Hold::default(); channels.max(1)],
            phase:       0.0,
        };
        d.set_params(params);
        d
    }

    pub fn set_params(&mut self, params: DistortionParams) {
        self.params   = params;
        self.pre_gain = db_to_gain(params.pre_gain_db);
        self.mix      = params.wet_dry_mix.clamp(0.0, 100.0) / 100.0;
    }

    pub fn params(&self) -> DistortionParams { self.params }

    #[inline]
    fn crush(sample: f32, bits: u32) -> f32 {
        let half_levels = (1u32 << bits) as f32 * 0.5;
        ((sample * half_levels).round() / half_levels).clamp(-1.0, 1.0)
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

impl AudioNode for Distortion {
    fn kind(&self) -> NodeKind { NodeKind::Distortion }

    fn process(&mut self, block: &mut [Vec<f32>]) {
        let frames = block.first().map(|c| c.len()).unwrap_or(0);
        let step = TAU * CHATTER_CARRIER_HZ / self.sample_rate;

        if self.mix == 0.0 {
            // Keep the carrier running so switching the mix up is seamless.
            self.phase = (self.phase + step * frames as f32) % TAU;
            return;
        }

        let mix = self.mix;
        let dry = 1.0 - mix;
        let start_phase = self.phase;

        for (channel, hold) in block.iter_mut().zip(self.holds.iter_mut()) {
            let mut phase = start_phase;
            for s in channel.iter_mut() {
                let x = *s * self.pre_gain;
                let (wet, downsample) = match self.params.preset {
                    DistortionPreset::DrumsBitBrush => {
                        (Self::crush(x, BIT_BRUSH_BITS), BIT_BRUSH_DOWNSAMPLE)
                    }
                    DistortionPreset::SpeechAlienChatter => (x * phase.sin(), CHATTER_DOWNSAMPLE),
                };
                if hold.counter == 0 {
                    hold.value = wet;
                }
                hold.counter = (hold.counter + 1) % downsample;
                *s = *s * dry + hold.value * mix;
                phase = (phase + step) % TAU;
            }
        }
        self.phase = (start_phase + step * frames as f32) % TAU;
    }

    fn reset(&mut self) {
        self.holds.fill(Hold::default());
        self.phase = 0.0;
    }
}
