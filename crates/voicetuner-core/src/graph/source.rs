// crates/voicetuner-core/src/graph/source.rs
//
// Player node: plays the scheduled PCM once, then emits silence.

use super::{AudioNode, NodeKind};
use crate::media_types::PcmBuffer;

pub struct SourcePlayer {
    pcm:      PcmBuffer,
    position: usize,
}

impl SourcePlayer {
    pub fn new(pcm: PcmBuffer) -> Self {
        Self { pcm, position: 0 }
    }

    pub fn total_frames(&self) -> usize { self.pcm.frames() }
    pub fn position(&self) -> usize { self.position }
    pub fn is_finished(&self) -> bool { self.position >= self.pcm.frames() }

    pub fn rewind(&mut self) { self.position = 0; }

    /// Fill `block` from the current position. Channels beyond the source's
    /// repeat its last channel; frames past the end are zero.
    pub fn render(&mut self, block: &mut [Vec<f32>]) {
        let frames = block.first().map(|c| c.len()).unwrap_or(0);
        let n = frames.min(self.pcm.frames().saturating_sub(self.position));
        let src_channels = self.pcm.channel_count();

        for (ch, out) in block.iter_mut().enumerate() {
            out.fill(0.0);
            if src_channels == 0 {
                continue;
            }
            let src = &self.pcm.channels[ch.min(src_channels - 1)];
            out[..n].copy_from_slice(&src[self.position..self.position + n]);
        }
        self.position += n;
    }
}

impl AudioNode for SourcePlayer {
    fn kind(&self) -> NodeKind { NodeKind::Source }

    fn process(&mut self, block: &mut [Vec<f32>]) { self.render(block); }

    fn reset(&mut self) { self.rewind(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plays_once_then_silence() {
        let mut p = SourcePlayer::new(PcmBuffer::new(8, vec![vec![1.0, 2.0, 3.0]]));
        let mut block = vec![vec![9.0; 2]];
        p.render(&mut block);
        assert_eq!(block[0], vec![1.0, 2.0]);
        p.render(&mut block);
        assert_eq!(block[0], vec![3.0, 0.0]);
        assert!(p.is_finished());
        p.render(&mut block);
        assert_eq!(block[0], vec![0.0, 0.0]);
    }

    #[test]
    fn mono_source_fills_every_output_channel() {
        let mut p = SourcePlayer::new(PcmBuffer::new(8, vec![vec![0.5, 0.25]]));
        let mut block = vec![vec![0.0; 2]; 2];
        p.render(&mut block);
        assert_eq!(block[0], block[1]);
    }
}
