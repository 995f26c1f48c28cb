use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Fixed-capacity FIFO window over the most recent accepted items.
///
/// Insertion order is kept. Offering to a full buffer evicts the oldest item
/// first, so after any number of offers the buffer holds the last
/// `capacity` of them.
#[derive(Debug, Clone)]
pub struct FrameBuffer<T> {
    items: VecDeque<T>,
    capacity: NonZeroUsize,
}

impl<T> FrameBuffer<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.get()),
            capacity,
        }
    }

    /// Append `item`, returning the evicted front element when at capacity.
    pub fn offer(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity.get()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Consume the buffer, oldest first.
    pub fn into_vec(self) -> Vec<T> {
        self.items.into()
    }
}
