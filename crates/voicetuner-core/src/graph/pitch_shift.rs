// crates/voicetuner-core/src/graph/pitch_shift.rs
//
// Streaming phase-vocoder pitch shifter.
//
// Per channel, input is collected into a window of PITCH_WINDOW samples; every
// PITCH_HOP samples the window is Hann-weighted, transformed, its bins moved
// by the pitch ratio with phase propagation, inverse-transformed and
// overlap-added into the output. The node therefore delays the signal by a
// constant PITCH_WINDOW - PITCH_HOP frames.
//
// At 0 cents the vocoder keeps running (so history stays warm) but the node
// emits the input through a delay line of the same length. That keeps the
// latency constant across preset changes and makes neutral exact.

use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::{AudioNode, NodeKind};

pub const PITCH_WINDOW: usize = 2048;
pub const PITCH_HOP:    usize = 512;
const LATENCY: usize = PITCH_WINDOW - PITCH_HOP;
const BINS:    usize = PITCH_WINDOW / 2 + 1;

/// Convert cents to a frequency ratio (1200 cents = one octave).
pub fn cents_to_ratio(cents: i32) -> f32 {
    2f32.powf(cents as f32 / 1200.0)
}

fn wrap_phase(p: f32) -> f32 {
    (p + PI).rem_euclid(TAU) - PI
}

struct ChannelState {
    in_fifo:      Vec<f32>,
    out_fifo:     Vec<f32>,
    accum:        Vec<f32>,
    last_phase:   Vec<f32>,
    sum_phase:    Vec<f32>,
    ana_mag:      Vec<f32>,
    ana_freq:     Vec<f32>,
    syn_mag:      Vec<f32>,
    syn_freq:     Vec<f32>,
    rover:        usize,
    /// Plain delay used at 0 cents; same length as the vocoder latency.
    delay:        Vec<f32>,
    delay_pos:    usize,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            in_fifo:    vec![0.0; PITCH_WINDOW],
            out_fifo:   vec![0.0; PITCH_WINDOW],
            accum:      vec![0.0; PITCH_WINDOW * 2],
            last_phase: vec![0.0; BINS],
            sum_phase:  vec![0.0; BINS],
            ana_mag:    vec![0.0; BINS],
            ana_freq:   vec![0.0; BINS],
            syn_mag:    vec![0.0; BINS],
            syn_freq:   vec![0.0; BINS],
            rover:      LATENCY,
            delay:      vec![0.0; LATENCY],
            delay_pos:  0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

pub struct PitchShift {
    cents:    i32,
    ratio:    f32,
    channels: Vec<ChannelState>,
    window:   Vec<f32>,
    /// Output gain compensating Hann analysis × synthesis overlap.
    ola_gain: f32,
    forward:  Arc<dyn Fft<f32>>,
    inverse:  Arc<dyn Fft<f32>>,
    scratch:  Vec<Complex<f32>>,
}

impl PitchShift {
    pub fn new(channels: usize) -> Self {
        let mut planner = FftPlanner::new();
        let window: Vec<f32> = (0..PITCH_WINDOW)
            .map(|i| 0.5 * (1.0 - (TAU * i as f32 / PITCH_WINDOW as f32).cos()))
            .collect();
        let energy: f32 = window.iter().map(|w| w * w).sum();
        Self {
            cents:    0,
            ratio:    1.0,
            channels: (0..channels.max(1)).map(|_| ChannelState::new()).collect(),
            ola_gain: PITCH_HOP as f32 / energy,
            window,
            forward:  planner.plan_fft_forward(PITCH_WINDOW),
            inverse:  planner.plan_fft_inverse(PITCH_WINDOW),
            scratch:  vec![Complex::default(); PITCH_WINDOW],
        }
    }

    pub fn set_cents(&mut self, cents: i32) {
        self.cents = cents;
        self.ratio = cents_to_ratio(cents);
    }

    pub fn cents(&self) -> i32 { self.cents }

    fn process_frame(&mut self, ch: usize) {
        let hop_phase = TAU * PITCH_HOP as f32 / PITCH_WINDOW as f32;
        let bin_scale = PITCH_WINDOW as f32 / (PITCH_HOP as f32 * TAU);
        let ratio     = self.ratio;
        let state     = &mut self.channels[ch];

        for (i, c) in self.scratch.iter_mut().enumerate() {
            *c = Complex::new(state.in_fifo[i] * self.window[i], 0.0);
        }
        self.forward.process(&mut self.scratch);

        // Analysis: true frequency of each bin, in fractional bins.
        for k in 0..BINS {
            let (mag, phase) = self.scratch[k].to_polar();
            let delta = wrap_phase(phase - state.last_phase[k] - k as f32 * hop_phase);
            state.last_phase[k] = phase;
            state.ana_mag[k]  = mag;
            state.ana_freq[k] = k as f32 + delta * bin_scale;
        }

        // Shift: output bin k takes analysis bin k / ratio.
        state.syn_mag.fill(0.0);
        state.syn_freq.fill(0.0);
        for k in 0..BINS {
            let src = (k as f32 / ratio).round() as usize;
            if src >= BINS {
                break;
            }
            state.syn_mag[k]  = state.ana_mag[src];
            state.syn_freq[k] = state.ana_freq[src] * ratio;
        }

        // Synthesis: accumulate phase from the shifted true frequency.
        for k in 0..BINS {
            let advance = (state.syn_freq[k] - k as f32) / bin_scale + k as f32 * hop_phase;
            state.sum_phase[k] = wrap_phase(state.sum_phase[k] + advance);
            self.scratch[k] = Complex::from_polar(state.syn_mag[k], state.sum_phase[k]);
        }
        for k in 1..PITCH_WINDOW / 2 {
            self.scratch[PITCH_WINDOW - k] = self.scratch[k].conj();
        }
        self.inverse.process(&mut self.scratch);

        let norm = self.ola_gain / PITCH_WINDOW as f32;
        for i in 0..PITCH_WINDOW {
            state.accum[i] += self.scratch[i].re * self.window[i] * norm;
        }

        state.out_fifo[..PITCH_HOP].copy_from_slice(&state.accum[..PITCH_HOP]);
        state.accum.copy_within(PITCH_HOP.., 0);
        let len = state.accum.len();
        state.accum[len - PITCH_HOP..].fill(0.0);
        state.in_fifo.copy_within(PITCH_HOP.., 0);
    }
}

impl AudioNode for PitchShift {
    fn kind(&self) -> NodeKind { NodeKind::PitchShift }

    fn process(&mut self, block: &mut [Vec<f32>]) {
        let bypass = self.cents == 0;
        for ch in 0..block.len().min(self.channels.len()) {
            for i in 0..block[ch].len() {
                let x = block[ch][i];
                let state = &mut self.channels[ch];

                state.in_fifo[state.rover] = x;
                let shifted = state.out_fifo[state.rover - LATENCY];
                state.rover += 1;

                let delayed = state.delay[state.delay_pos];
                state.delay[state.delay_pos] = x;
                state.delay_pos = (state.delay_pos + 1) % LATENCY;

                block[ch][i] = if bypass { delayed } else { shifted };

                if self.channels[ch].rover >= PITCH_WINDOW {
                    self.channels[ch].rover = LATENCY;
                    self.process_frame(ch);
                }
            }
        }
    }

    fn reset(&mut self) {
        self.channels.iter_mut().for_each(ChannelState::reset);
    }

    fn latency_frames(&self) -> usize { LATENCY }
}
