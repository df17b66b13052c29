//! Capped newest-first buffer
//!
//! Shared by operation history, the checkpoint list and the audit log. Once
//! the buffer is full, each push drops the oldest entry.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Bounded buffer that keeps the most recent `capacity` items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    capacity: usize,
    /// Newest item at the front
    items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Rebuild from a newest-first list, dropping anything past capacity
    pub fn from_newest_first(capacity: usize, items: Vec<T>) -> Self {
        let mut ring = Self::new(capacity);
        ring.items = items.into_iter().take(ring.capacity).collect();
        ring
    }

    /// Push a new item, returning the evicted oldest item if any
    pub fn push(&mut self, item: T) -> Option<T> {
        self.items.push_front(item);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    /// Iterate newest-first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Newest-first copy of the contents
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_newest_first() {
        let mut ring = RingBuffer::new(3);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.to_vec(), vec![3, 2, 1]);
    }

    #[test]
    fn test_push_past_capacity_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        for i in 1..=3 {
            assert!(ring.push(i).is_none());
        }
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.push(5), Some(2));
        assert_eq!(ring.to_vec(), vec![5, 4, 3]);
    }

    #[test]
    fn test_iter_mut_updates_in_place() {
        let mut ring = RingBuffer::new(3);
        ring.push(1);
        ring.push(2);
        if let Some(item) = ring.iter_mut().find(|i| **i == 1) {
            *item = 10;
        }
        assert_eq!(ring.to_vec(), vec![2, 10]);
    }

    #[test]
    fn test_from_newest_first_truncates() {
        let ring = RingBuffer::from_newest_first(2, vec![9, 8, 7, 6]);
        assert_eq!(ring.to_vec(), vec![9, 8]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut ring = RingBuffer::new(0);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.to_vec(), vec!["b"]);
    }

    #[test]
    fn test_many_pushes_keep_last_n() {
        let mut ring = RingBuffer::new(100);
        for i in 0..250 {
            ring.push(i);
        }
        let items = ring.to_vec();
        assert_eq!(items.len(), 100);
        assert_eq!(items[0], 249);
        assert_eq!(items[99], 150);
    }
}
