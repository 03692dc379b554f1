//! Reordering buffer for out-of-order completions.
//!
//! Parallel workers finish blocks in whatever order the scheduler lets them.
//! The buffer accepts items tagged with their sequence number and releases
//! them strictly in ascending order.
//!
//! ```
//! use bam_codec::reorder::ReorderBuffer;
//!
//! let mut buffer = ReorderBuffer::new();
//! buffer.insert(1, "second");
//! assert_eq!(buffer.try_pop_next(), None);
//! buffer.insert(0, "first");
//! assert_eq!(buffer.try_pop_next(), Some("first"));
//! assert_eq!(buffer.try_pop_next(), Some("second"));
//! ```

use std::collections::VecDeque;

/// Slot `i` of `slots` holds the item with sequence number `next_seq + i`.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    slots: VecDeque<Option<T>>,
    next_seq: u64,
    count: usize,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    /// Creates an empty buffer expecting sequence number 0 first.
    pub fn new() -> Self {
        Self { slots: VecDeque::new(), next_seq: 0, count: 0 }
    }

    /// Stores an item.
    ///
    /// # Panics
    ///
    /// Panics if `seq` was already released or is already buffered.
    pub fn insert(&mut self, seq: u64, item: T) {
        assert!(seq >= self.next_seq, "sequence number {} was already released", seq);
        let index = (seq - self.next_seq) as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        assert!(self.slots[index].is_none(), "duplicate sequence number {}", seq);
        self.slots[index] = Some(item);
        self.count += 1;
    }

    /// Releases the item carrying the next expected sequence number, if it has
    /// arrived.
    pub fn try_pop_next(&mut self) -> Option<T> {
        match self.slots.front_mut().and_then(Option::take) {
            Some(item) => {
                self.slots.pop_front();
                self.next_seq += 1;
                self.count -= 1;
                Some(item)
            }
            None => None,
        }
    }

    /// The sequence number that will be released next.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Number of items waiting for an earlier sequence number.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
