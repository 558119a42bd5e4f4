// crates/voicetuner-core/src/graph/mod.rs
//
// The effect processing graph.
//
// ── Architecture ─────────────────────────────────────────────────────────────
//
//   Layer 1: `GraphParameters`
//             Plain, serializable snapshot of every node parameter. Presets
//             produce one; the engine shares one behind a mutex; tests compare
//             them bit for bit.
//
//   Layer 2: `AudioNode` trait
//             Pure block algorithm over planar f32 buffers. No ffmpeg and no
//             threads cross this boundary.
//
//   Layer 3: `ProcessingGraph`
//             Fixed topology, pulled one block at a time:
//
//               source ─▶ reverb ─▶ distortion ─▶ pitch_shift ─▶ mixer ─▶ sink
//
//             The sink is not a node here; whoever pulls blocks (the engine
//             thread) hands the mixer output to its `OutputSink` and to the
//             render tap.

mod distortion;
mod mixer;
mod pitch_shift;
mod reverb;
mod source;

pub use distortion::Distortion;
pub use mixer::Mixer;
pub use pitch_shift::{PitchShift, PITCH_HOP, PITCH_WINDOW};
pub use reverb::Reverb;
pub use source::SourcePlayer;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::media_types::PcmBuffer;
use crate::presets::{DistortionParams, EffectPreset, PresetParams};

/// Planar block: one `Vec<f32>` per channel, equal lengths.
pub type AudioBlock = Vec<Vec<f32>>;

// ── Topology ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Source,
    Reverb,
    Distortion,
    PitchShift,
    Mixer,
    Sink,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Source     => "source",
            NodeKind::Reverb     => "reverb",
            NodeKind::Distortion => "distortion",
            NodeKind::PitchShift => "pitch_shift",
            NodeKind::Mixer      => "mixer",
            NodeKind::Sink       => "sink",
        })
    }
}

/// Node order of the signal chain. Never changes at runtime.
pub const CHAIN: [NodeKind; 6] = [
    NodeKind::Source,
    NodeKind::Reverb,
    NodeKind::Distortion,
    NodeKind::PitchShift,
    NodeKind::Mixer,
    NodeKind::Sink,
];

/// The fixed edges of the chain as `(from, to)` pairs.
pub fn edges() -> impl Iterator<Item = (NodeKind, NodeKind)> {
    CHAIN.windows(2).map(|w| (w[0], w[1]))
}

/// A block processor in the chain.
pub trait AudioNode: Send {
    fn kind(&self) -> NodeKind;

    /// Process `block` in place. Every channel has the same length.
    fn process(&mut self, block: &mut [Vec<f32>]);

    /// Drop all internal history (delay lines, overlap buffers).
    fn reset(&mut self);

    /// Constant delay, in frames, this node adds between input and output.
    fn latency_frames(&self) -> usize { 0 }
}

// ── Parameters ────────────────────────────────────────────────────────────────

/// Snapshot of every node parameter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphParameters {
    pub pitch_cents:        i32,
    pub reverb_wet_dry_mix: f32,
    pub distortion:         DistortionParams,
    pub mixer_volume:       f32,
}

impl GraphParameters {
    pub fn neutral() -> Self { Self::from(PresetParams::neutral()) }

    /// Absolute parameters for `preset`: neutral state overlaid with the
    /// preset's values. Independent of whatever was set before.
    pub fn for_preset(preset: EffectPreset) -> Self { Self::from(preset.params()) }
}

impl Default for GraphParameters {
    fn default() -> Self { Self::neutral() }
}

impl From<PresetParams> for GraphParameters {
    fn from(p: PresetParams) -> Self {
        Self {
            pitch_cents:        p.pitch_cents,
            reverb_wet_dry_mix: p.reverb_wet_dry_mix,
            distortion:         p.distortion,
            mixer_volume:       1.0,
        }
    }
}

// ── ProcessingGraph ───────────────────────────────────────────────────────────

pub struct ProcessingGraph {
    sample_rate: u32,
    channels:    usize,
    source:      SourcePlayer,
    reverb:      Reverb,
    distortion:  Distortion,
    pitch:       PitchShift,
    mixer:       Mixer,
    applied:     GraphParameters,
}

impl ProcessingGraph {
    /// Build the chain around decoded source PCM. Parameters start neutral.
    pub fn new(pcm: PcmBuffer) -> Self {
        let sample_rate = pcm.sample_rate;
        let channels    = pcm.channel_count().max(1);
        let mut graph = Self {
            sample_rate,
            channels,
            source:     SourcePlayer::new(pcm),
            reverb:     Reverb::new(sample_rate, channels),
            distortion: Distortion::new(sample_rate, channels),
            pitch:      PitchShift::new(channels),
            mixer:      Mixer::new(),
            applied:    GraphParameters::neutral(),
        };
        graph.apply(&GraphParameters::neutral());
        graph
    }

    pub fn sample_rate(&self) -> u32 { self.sample_rate }
    pub fn channels(&self) -> usize { self.channels }
    pub fn parameters(&self) -> GraphParameters { self.applied }

    /// Frame count of the scheduled source.
    pub fn source_frames(&self) -> u64 { self.source.total_frames() as u64 }

    pub fn source_finished(&self) -> bool { self.source.is_finished() }

    /// Total constant latency from source to mixer output.
    pub fn latency_frames(&self) -> usize {
        self.reverb.latency_frames()
            + self.distortion.latency_frames()
            + self.pitch.latency_frames()
            + self.mixer.latency_frames()
    }

    /// Overwrite every node parameter with `params`. Takes effect on the next
    /// pulled block.
    pub fn apply(&mut self, params: &GraphParameters) {
        self.reverb.set_wet_dry_mix(params.reverb_wet_dry_mix);
        self.distortion.set_params(params.distortion);
        self.pitch.set_cents(params.pitch_cents);
        self.mixer.set_volume(params.mixer_volume);
        self.applied = *params;
    }

    /// Restart the source from frame 0 and clear every node's history, so a
    /// render starts from the same state the preview did.
    pub fn rewind(&mut self) {
        self.source.rewind();
        self.reverb.reset();
        self.distortion.reset();
        self.pitch.reset();
        self.mixer.reset();
    }

    /// Pull `frames` frames of mixer output. After the source ends the
    /// player emits silence, and the chain keeps flushing its tails.
    pub fn pull(&mut self, frames: usize) -> AudioBlock {
        let mut block = vec![vec![0.0f32; frames]; self.channels];
        self.source.render(&mut block);
        self.reverb.process(&mut block);
        self.distortion.process(&mut block);
        self.pitch.process(&mut block);
        self.mixer.process(&mut block);
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> PcmBuffer {
        let ch: Vec<f32> = (0..frames).map(|i| ((i % 200) as f32 / 200.0) - 0.5).collect();
        PcmBuffer::new(44_100, vec![ch])
    }

    #[test]
    fn edges_follow_the_chain() {
        let e: Vec<_> = edges().collect();
        assert_eq!(e.len(), 5);
        assert_eq!(e[0], (NodeKind::Source, NodeKind::Reverb));
        assert_eq!(e[2], (NodeKind::Distortion, NodeKind::PitchShift));
        assert_eq!(e[4], (NodeKind::Mixer, NodeKind::Sink));
    }

    #[test]
    fn new_graph_is_neutral() {
        let g = ProcessingGraph::new(ramp(10));
        assert_eq!(g.parameters(), GraphParameters::neutral());
    }

    #[test]
    fn preset_then_default_restores_neutral_bits() {
        let mut g = ProcessingGraph::new(ramp(10));
        let initial = g.parameters();
        for p in EffectPreset::ALL {
            g.apply(&GraphParameters::for_preset(p));
            g.apply(&GraphParameters::for_preset(EffectPreset::Default));
            assert_eq!(g.parameters(), initial, "{p}");
        }
    }

    #[test]
    fn neutral_graph_passes_source_through_after_latency() {
        let src = ramp(8192);
        let expected = src.channels[0].clone();
        let mut g = ProcessingGraph::new(src);
        let lat = g.latency_frames();
        let mut out = Vec::new();
        while out.len() < expected.len() + lat {
            out.extend(g.pull(1024).remove(0));
        }
        let aligned = &out[lat..lat + expected.len()];
        for (i, (a, b)) in aligned.iter().zip(&expected).enumerate() {
            assert!((a - b).abs() < 1e-6, "frame {i}: {a} vs {b}");
        }
    }

    #[test]
    fn rewind_restarts_source() {
        let mut g = ProcessingGraph::new(ramp(2048));
        let first = g.pull(1024);
        g.pull(4096);
        assert!(g.source_finished());
        g.rewind();
        assert!(!g.source_finished());
        assert_eq!(g.pull(1024), first);
    }
}
