// crates/voicetuner-core/src/capture.rs
//
// Frame accounting for the render tap.
//
// The tap hands over fixed-size blocks; the counter decides, per block, how
// much of it may still be written. Completion is decided on frame counts, not
// on elapsed time, so it cannot drift: the first time `written` reaches the
// source length the counter closes and every later block is rejected.
//
// Two guards keep a render bounded:
//   • `skip` drops the graph's fixed latency from the head of the stream so the
//     capture lines up with the source.
//   • `max_callbacks` turns "never reaches the expected length" into an
//     explicit `Exhausted` step instead of an endless tap.

/// What the tap should do with the block it just received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStep {
    /// Write `block[start .. start + len]`. `complete` is set on the write that
    /// brings `written` up to the expected length.
    Write { start: usize, len: usize, complete: bool },
    /// The whole block lies in the latency window.
    Skip,
    /// The capture already completed; nothing may be written.
    Closed,
    /// Callback budget spent before reaching the expected length.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct CaptureCounter {
    expected:       u64,
    written:        u64,
    skip_remaining: u64,
    callbacks:      u64,
    max_callbacks:  u64,
    closed:         bool,
}

impl CaptureCounter {
    /// `expected` is the source length in frames, `skip` the graph latency in
    /// frames, `max_callbacks` the hard bound on tap invocations.
    pub fn new(expected: u64, skip: u64, max_callbacks: u64) -> Self {
        Self {
            expected,
            written:        0,
            skip_remaining: skip,
            callbacks:      0,
            max_callbacks:  max_callbacks.max(1),
            closed:         expected == 0,
        }
    }

    /// Budget for a source of `expected` frames tapped in `block`-sized
    /// buffers: enough blocks to cover the source and the latency, plus slack.
    pub fn callback_budget(expected: u64, skip: u64, block: usize, slack: u64) -> u64 {
        let block = block.max(1) as u64;
        (expected + skip).div_ceil(block) + slack
    }

    pub fn expected(&self) -> u64 { self.expected }
    pub fn written(&self)  -> u64 { self.written }
    pub fn is_complete(&self) -> bool { self.closed }

    /// Account for one tap callback carrying `frames` frames.
    pub fn accept(&mut self, frames: usize) -> CaptureStep {
        if self.closed {
            return CaptureStep::Closed;
        }
        self.callbacks += 1;

        let mut start = 0usize;
        if self.skip_remaining > 0 {
            let skipped = self.skip_remaining.min(frames as u64);
            self.skip_remaining -= skipped;
            start = skipped as usize;
        }

        let available = (frames - start) as u64;
        let len = available.min(self.expected - self.written);

        if len == 0 {
            return if self.callbacks >= self.max_callbacks {
                CaptureStep::Exhausted
            } else {
                CaptureStep::Skip
            };
        }

        let complete = self.written + len >= self.expected;
        if !complete && self.callbacks >= self.max_callbacks {
            return CaptureStep::Exhausted;
        }
        self.written += len;
        self.closed = complete;

        CaptureStep::Write { start, len: len as usize, complete }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_exactly_at_expected_length() {
        let mut c = CaptureCounter::new(2500, 0, 100);
        assert_eq!(c.accept(1024), CaptureStep::Write { start: 0, len: 1024, complete: false });
        assert_eq!(c.accept(1024), CaptureStep::Write { start: 0, len: 1024, complete: false });
        assert_eq!(c.accept(1024), CaptureStep::Write { start: 0, len: 452,  complete: true  });
        assert_eq!(c.written(), 2500);
        assert!(c.is_complete());
    }

    #[test]
    fn nothing_is_written_after_completion() {
        let mut c = CaptureCounter::new(1024, 0, 100);
        assert!(matches!(c.accept(1024), CaptureStep::Write { complete: true, .. }));
        for _ in 0..5 {
            assert_eq!(c.accept(1024), CaptureStep::Closed);
        }
        assert_eq!(c.written(), 1024);
    }

    #[test]
    fn written_is_monotonic() {
        let mut c = CaptureCounter::new(10_000, 300, 1000);
        let mut last = 0;
        while !c.is_complete() {
            c.accept(1024);
            assert!(c.written() >= last);
            last = c.written();
        }
        assert_eq!(last, 10_000);
    }

    #[test]
    fn latency_is_skipped_across_blocks() {
        let mut c = CaptureCounter::new(4096, 1500, 100);
        assert_eq!(c.accept(1024), CaptureStep::Skip);
        assert_eq!(c.accept(1024), CaptureStep::Write { start: 476, len: 548, complete: false });
        assert_eq!(c.written(), 548);
    }

    #[test]
    fn exhausted_when_budget_runs_out() {
        let mut c = CaptureCounter::new(10_000, 0, 3);
        assert!(matches!(c.accept(100), CaptureStep::Write { .. }));
        assert!(matches!(c.accept(100), CaptureStep::Write { .. }));
        assert_eq!(c.accept(100), CaptureStep::Exhausted);
        assert!(!c.is_complete());
    }

    #[test]
    fn empty_source_is_complete_immediately() {
        let mut c = CaptureCounter::new(0, 0, 10);
        assert!(c.is_complete());
        assert_eq!(c.accept(1024), CaptureStep::Closed);
    }

    #[test]
    fn budget_covers_source_and_latency() {
        assert_eq!(CaptureCounter::callback_budget(2048, 0, 1024, 0), 2);
        assert_eq!(CaptureCounter::callback_budget(2049, 1024, 1024, 4), 8);
    }
}
