//! Look-back ring for the send path.
//!
//! Voice-activity gating would clip the first syllable of every utterance:
//! by the time the gate opens, the onset frames are already gone. The send
//! pipeline therefore parks every processed frame here and transmits the
//! whole ring once the gate opens, oldest first.
//!
//! The ring doubles as the gap detector: when it fills up with gated-off
//! frames, the silence has outlasted the look-back window and the codec
//! state must be reset before the next transmitted frame.

use std::collections::VecDeque;

/// Fixed-capacity ring of recently processed frames.
pub struct LookbackRing {
    frames: VecDeque<Vec<i16>>,
    capacity: usize,
}

impl LookbackRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Park a frame, discarding the oldest when the ring is at capacity.
    pub fn push(&mut self, frame: Vec<i16>) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// True once an entire window of frames has been retained without a
    /// drain in between.
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Take every retained frame, oldest first, leaving the ring empty.
    pub fn drain(&mut self) -> impl Iterator<Item = Vec<i16>> + '_ {
        self.frames.drain(..)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_is_oldest_first() {
        let mut ring = LookbackRing::new(3);
        ring.push(vec![1]);
        ring.push(vec![2]);
        ring.push(vec![3]);

        let drained: Vec<_> = ring.drain().collect();
        assert_eq!(drained, vec![vec![1], vec![2], vec![3]]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_overflow_discards_oldest() {
        let mut ring = LookbackRing::new(2);
        ring.push(vec![1]);
        ring.push(vec![2]);
        ring.push(vec![3]);

        assert!(ring.is_full());
        let drained: Vec<_> = ring.drain().collect();
        assert_eq!(drained, vec![vec![2], vec![3]]);
    }

    #[test]
    fn test_full_only_after_whole_window() {
        let mut ring = LookbackRing::new(3);
        ring.push(vec![1]);
        ring.push(vec![2]);
        assert!(!ring.is_full());
        ring.push(vec![3]);
        assert!(ring.is_full());

        ring.drain().count();
        assert!(!ring.is_full());
    }
}
