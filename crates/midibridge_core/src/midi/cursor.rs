//! Frame-accurate playback of one block's message batch.

use arrayvec::ArrayVec;

use crate::types::{BlockInput, TimestampedMessage};

/// Events kept per block. Anything past this is dropped for that block.
pub const MAX_BLOCK_EVENTS: usize = 512;

/// Walks a block's batch sample by sample.
///
/// Each sample, [`pop_due`](Self::pop_due) yields the events whose frame is at
/// or before the current frame, in batch order, and [`advance`](Self::advance)
/// moves to the next sample. Hosts deliver batches sorted by frame.
#[derive(Debug, Clone)]
pub struct MessageCursor {
    events: ArrayVec<TimestampedMessage, MAX_BLOCK_EVENTS>,
    next: usize,
    frame: u32,
    last_generation: Option<u64>,
    dropped: u64,
}

impl Default for MessageCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCursor {
    pub fn new() -> Self {
        Self {
            events: ArrayVec::new(),
            next: 0,
            frame: 0,
            last_generation: None,
            dropped: 0,
        }
    }

    /// Pick up a new batch when the host's block generation changed.
    /// Returns true when a new block started.
    pub fn sync(&mut self, input: &BlockInput<'_>) -> bool {
        if self.last_generation == Some(input.generation) {
            return false;
        }
        self.last_generation = Some(input.generation);
        self.load(input.events);
        true
    }

    /// Replace the pending batch and restart frame numbering at 0.
    pub fn load(&mut self, events: &[TimestampedMessage]) {
        self.events.clear();
        self.next = 0;
        self.frame = 0;

        let take = events.len().min(MAX_BLOCK_EVENTS);
        self.events.extend(events[..take].iter().copied());
        self.dropped += (events.len() - take) as u64;
    }

    /// Next event due at the current frame, if any.
    pub fn pop_due(&mut self) -> Option<TimestampedMessage> {
        let event = *self.events.get(self.next)?;
        if event.frame > self.frame {
            return None;
        }
        self.next += 1;
        Some(event)
    }

    pub fn advance(&mut self) {
        self.frame = self.frame.saturating_add(1);
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Events of the current batch not yet dispatched.
    pub fn pending(&self) -> usize {
        self.events.len() - self.next
    }

    /// Events dropped because a batch exceeded [`MAX_BLOCK_EVENTS`].
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn reset(&mut self) {
        self.events.clear();
        self.next = 0;
        self.frame = 0;
        self.last_generation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(frame: u32, n: u8) -> TimestampedMessage {
        TimestampedMessage::note_on(frame, 0, n, 100)
    }

    #[test]
    fn test_events_dispatch_at_their_frame() {
        let batch = [note(0, 60), note(0, 61), note(2, 62)];
        let mut cursor = MessageCursor::new();
        assert!(cursor.sync(&BlockInput::new(1, &batch)));

        let mut per_sample = Vec::new();
        for _ in 0..4 {
            let mut count = 0;
            while cursor.pop_due().is_some() {
                count += 1;
            }
            per_sample.push(count);
            cursor.advance();
        }
        assert_eq!(per_sample, vec![2, 0, 1, 0]);
    }

    #[test]
    fn test_same_generation_does_not_reload() {
        let batch = [note(0, 60)];
        let mut cursor = MessageCursor::new();
        assert!(cursor.sync(&BlockInput::new(7, &batch)));
        assert!(cursor.pop_due().is_some());
        cursor.advance();
        assert!(!cursor.sync(&BlockInput::new(7, &batch)));
        assert_eq!(cursor.pending(), 0);
        assert_eq!(cursor.frame(), 1);
    }

    #[test]
    fn test_overflow_drops_newest() {
        let batch: Vec<_> = (0..MAX_BLOCK_EVENTS + 3).map(|_| note(0, 1)).collect();
        let mut cursor = MessageCursor::new();
        cursor.load(&batch);
        assert_eq!(cursor.pending(), MAX_BLOCK_EVENTS);
        assert_eq!(cursor.dropped(), 3);
    }
}
