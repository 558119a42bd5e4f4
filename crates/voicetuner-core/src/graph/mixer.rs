// crates/voicetuner-core/src/graph/mixer.rs
//
// Main mixer: single input bus and output volume, limited to full scale.
// Its output is what the sink plays and what the render tap captures.

use super::{AudioNode, NodeKind};

pub struct Mixer {
    volume: f32,
}

impl Mixer {
    pub fn new() -> Self { Self { volume: 1.0 } }

    pub fn set_volume(&mut self, volume: f32) { self.volume = volume.clamp(0.0, 2.0); }
    pub fn volume(&self) -> f32 { self.volume }
}

impl Default for Mixer {
    fn default() -> Self { Self::new() }
}

impl AudioNode for Mixer {
    fn kind(&self) -> NodeKind { NodeKind::Mixer }

    fn process(&mut self, block: &mut [Vec<f32>]) {
        let v = self.volume;
        for s in block.iter_mut().flat_map(|c| c.iter_mut()) {
            *s = (*s * v).clamp(-1.0, 1.0);
        }
    }

    fn reset(&mut self) {}
}
