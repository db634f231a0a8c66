//! Ring Buffer Implementation

use crate::BufferError;
use serde::Serialize;

/// Running counters kept alongside the queue contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// Entries accepted since creation
    pub total_pushed: u64,
    /// Entries refused because the buffer was full
    pub total_dropped: u64,
    /// Highest occupancy ever observed
    pub peak_len: usize,
}

/// Single-producer/single-consumer queue with fixed capacity `N`
///
/// All `N` slots are usable: an explicit occupancy counter distinguishes
/// full from empty, so `head` (write position) and `tail` (read position)
/// are equal in both states but never alias live data.
///
/// When full, new entries are refused and the oldest unread entry is kept.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    /// Pre-allocated storage
    storage: [T; N],
    /// Head position (write pointer)
    head: usize,
    /// Tail position (read pointer)
    tail: usize,
    /// Number of unread entries
    len: usize,
    /// Statistics
    stats: BufferStats,
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            storage: [T::default(); N],
            head: 0,
            tail: 0,
            len: 0,
            stats: BufferStats::default(),
        }
    }

    /// Append an entry, refusing it if the buffer is full
    pub fn try_push(&mut self, item: T) -> Result<(), BufferError> {
        if self.len == N {
            self.stats.total_dropped += 1;
            return Err(BufferError::Full { capacity: N });
        }

        self.storage[self.head] = item;
        self.head = (self.head + 1) % N;
        self.len += 1;

        self.stats.total_pushed += 1;
        self.stats.peak_len = self.stats.peak_len.max(self.len);
        Ok(())
    }

    /// Remove and return the oldest entry
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }

        let item = self.storage[self.tail];
        self.tail = (self.tail + 1) % N;
        self.len -= 1;
        Some(item)
    }

    /// Look at the oldest entry without removing it
    pub fn peek(&self) -> Option<T> {
        (self.len > 0).then(|| self.storage[self.tail])
    }

    /// Push as many entries from `items` as fit, returning how many were taken
    pub fn extend_from_slice(&mut self, items: &[T]) -> usize {
        let mut taken = 0;
        for item in items {
            if self.try_push(*item).is_err() {
                break;
            }
            taken += 1;
        }
        taken
    }
}

impl<T, const N: usize> RingBuffer<T, N> {
    /// Get the number of entries currently in the buffer
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Get the buffer capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Free slots remaining
    pub fn free(&self) -> usize {
        N - self.len
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len as f64 / N as f64
    }

    /// Counters since creation
    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    /// Discard all unread entries
    pub fn clear(&mut self) {
        self.tail = self.head;
        self.len = 0;
    }
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[test]
    fn test_push_and_pop() {
        let mut buffer: RingBuffer<u8, 8> = RingBuffer::new();

        for i in 0..5 {
            buffer.try_push(i).unwrap();
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.pop(), Some(0));
        assert_eq!(buffer.pop(), Some(1));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_full_buffer_keeps_oldest() {
        let mut buffer: RingBuffer<u8, 4> = RingBuffer::new();

        for i in 0..4 {
            buffer.try_push(i).unwrap();
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.try_push(99), Err(BufferError::Full { capacity: 4 }));

        // Oldest survives, the refused byte never appears
        let drained: Vec<u8> = std::iter::from_fn(|| buffer.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert_eq!(buffer.stats().total_dropped, 1);
        assert_eq!(buffer.stats().total_pushed, 4);
    }

    #[test]
    fn test_wraparound() {
        let mut buffer: RingBuffer<u8, 3> = RingBuffer::new();

        for round in 0..10u8 {
            buffer.try_push(round).unwrap();
            buffer.try_push(round.wrapping_add(100)).unwrap();
            assert_eq!(buffer.pop(), Some(round));
            assert_eq!(buffer.pop(), Some(round.wrapping_add(100)));
        }
        assert!(buffer.is_empty());
        assert_eq!(buffer.stats().peak_len, 2);
    }

    #[test]
    fn test_extend_stops_when_full() {
        let mut buffer: RingBuffer<u8, 4> = RingBuffer::new();
        assert_eq!(buffer.extend_from_slice(b"AT+BTINQ"), 4);
        assert_eq!(buffer.peek(), Some(b'A'));
        assert_eq!(buffer.free(), 0);
    }

    #[test]
    fn test_fill_ratio_and_clear() {
        let mut buffer: RingBuffer<u8, 10> = RingBuffer::new();
        assert_eq!(buffer.fill_ratio(), 0.0);

        buffer.extend_from_slice(&[0; 5]);
        assert!((buffer.fill_ratio() - 0.5).abs() < 0.01);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.pop(), None);
    }

    proptest! {
        #[test]
        fn prop_matches_bounded_queue_model(ops in prop::collection::vec(any::<Option<u8>>(), 0..200)) {
            let mut buffer: RingBuffer<u8, 16> = RingBuffer::new();
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    Some(byte) => {
                        let accepted = buffer.try_push(byte).is_ok();
                        prop_assert_eq!(accepted, model.len() < 16);
                        if accepted {
                            model.push_back(byte);
                        }
                    }
                    None => prop_assert_eq!(buffer.pop(), model.pop_front()),
                }
                prop_assert!(buffer.len() <= buffer.capacity());
                prop_assert_eq!(buffer.len(), model.len());
            }
        }
    }
}
