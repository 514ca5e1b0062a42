use std::collections::VecDeque;

use serde::Serialize;

/// Fixed-capacity FIFO of recent samples. Pushing into a full history evicts
/// the oldest entry, so `len() <= capacity()` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundedHistory<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    /// A capacity of zero is bumped to one so the latest sample is always kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `item`, returning the evicted entry if the history was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// `max - min` of a sequence of floats, or `None` if it is empty.
pub(crate) fn span_of(values: impl Iterator<Item = f32>) -> Option<f32> {
    values
        .fold(None, |acc: Option<(f32, f32)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .map(|(lo, hi)| hi - lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut h = BoundedHistory::new(3);
        assert!(h.is_empty());
        assert_eq!(h.push(1), None);
        assert_eq!(h.push(2), None);
        assert_eq!(h.len(), 2);
        assert_eq!(h.latest(), Some(&2));
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut h = BoundedHistory::new(3);
        for i in 0..3 {
            h.push(i);
        }
        assert_eq!(h.push(3), Some(0));
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut h = BoundedHistory::new(0);
        h.push('a');
        h.push('b');
        assert_eq!(h.capacity(), 1);
        assert_eq!(h.latest(), Some(&'b'));
    }

    #[test]
    fn test_span_of() {
        assert_eq!(span_of(std::iter::empty()), None);
        let span = span_of([0.3, 0.1, 0.25].into_iter()).unwrap();
        assert!((span - 0.2).abs() < 1e-6);
    }
}
