//! Binary min-heap with lazily read scores and arbitrary removal
//!
//! The heap never caches scores. Every comparison calls the scoring function
//! supplied with the operation, so callers keep priorities in their own
//! mutable state and express "decrease key" as [`IndexedHeap::remove`]
//! followed by [`IndexedHeap::push`] after updating that state.
//!
//! A slot map from element to heap position makes `remove` O(log n).
//! Elements with equal scores are ordered by their own `Ord`, which for node
//! indices means the lowest index is popped first.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Array-backed min-heap keyed by an external score
#[derive(Debug, Clone)]
pub struct IndexedHeap<T> {
    content: Vec<T>,
    slots: HashMap<T, usize>,
}

impl<T> Default for IndexedHeap<T> {
    fn default() -> Self {
        Self {
            content: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<T: Copy + Eq + Hash + Ord> IndexedHeap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            content: Vec::with_capacity(capacity),
            slots: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.slots.contains_key(item)
    }

    /// The element that the next `pop` would return, given unchanged scores
    pub fn peek(&self) -> Option<&T> {
        self.content.first()
    }

    /// Insert `item`. Pushing an element that is already queued repositions
    /// it according to its current score instead of duplicating it.
    pub fn push<F>(&mut self, item: T, score: F)
    where
        F: Fn(&T) -> f64,
    {
        if let Some(&slot) = self.slots.get(&item) {
            self.repair(slot, &score);
            return;
        }
        self.content.push(item);
        let slot = self.content.len() - 1;
        self.slots.insert(item, slot);
        self.bubble_up(slot, &score);
    }

    /// Remove and return the element with the minimum score
    pub fn pop<F>(&mut self, score: F) -> Result<T>
    where
        F: Fn(&T) -> f64,
    {
        if self.content.is_empty() {
            return Err(Error::EmptyQueue);
        }
        let last = self.content.len() - 1;
        self.swap(0, last);
        let item = self.content.pop().ok_or(Error::EmptyQueue)?;
        self.slots.remove(&item);
        if !self.content.is_empty() {
            self.sink_down(0, &score);
        }
        Ok(item)
    }

    /// Remove a specific element. Returns `false` if it was not queued.
    pub fn remove<F>(&mut self, item: &T, score: F) -> bool
    where
        F: Fn(&T) -> f64,
    {
        let Some(slot) = self.slots.remove(item) else {
            return false;
        };
        let last = self.content.len() - 1;
        self.content.swap_remove(slot);
        if slot != last {
            // The former last element now sits in `slot`; which way it has
            // to move is unknown.
            let moved = self.content[slot];
            self.slots.insert(moved, slot);
            self.repair(slot, &score);
        }
        true
    }

    fn repair<F>(&mut self, slot: usize, score: &F)
    where
        F: Fn(&T) -> f64,
    {
        let slot = self.bubble_up(slot, score);
        self.sink_down(slot, score);
    }

    fn less<F>(&self, a: usize, b: usize, score: &F) -> bool
    where
        F: Fn(&T) -> f64,
    {
        let (x, y) = (&self.content[a], &self.content[b]);
        match score(x).total_cmp(&score(y)) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => x < y,
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.content.swap(a, b);
        self.slots.insert(self.content[a], a);
        self.slots.insert(self.content[b], b);
    }

    /// Returns the final position of the element that started at `n`
    fn bubble_up<F>(&mut self, mut n: usize, score: &F) -> usize
    where
        F: Fn(&T) -> f64,
    {
        while n > 0 {
            let parent = (n - 1) / 2;
            if !self.less(n, parent, score) {
                break;
            }
            self.swap(n, parent);
            n = parent;
        }
        n
    }

    fn sink_down<F>(&mut self, mut n: usize, score: &F)
    where
        F: Fn(&T) -> f64,
    {
        let len = self.content.len();
        loop {
            let left = 2 * n + 1;
            let right = left + 1;
            let mut smallest = n;
            if left < len && self.less(left, smallest, score) {
                smallest = left;
            }
            if right < len && self.less(right, smallest, score) {
                smallest = right;
            }
            if smallest == n {
                break;
            }
            self.swap(n, smallest);
            n = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(heap: &mut IndexedHeap<usize>, scores: &[f64]) -> Vec<usize> {
        let mut out = Vec::new();
        while !heap.is_empty() {
            out.push(heap.pop(|i| scores[*i]).unwrap());
        }
        out
    }

    #[test]
    fn pops_in_ascending_score_order() {
        let scores = [5.0, 1.0, 4.0, 2.0, 3.0, 0.5];
        let mut heap = IndexedHeap::new();
        for i in 0..scores.len() {
            heap.push(i, |i| scores[*i]);
        }
        assert_eq!(heap.peek(), Some(&5));
        assert_eq!(drain(&mut heap, &scores), vec![5, 1, 3, 4, 2, 0]);
    }

    #[test]
    fn pop_on_empty_fails() {
        let mut heap: IndexedHeap<usize> = IndexedHeap::new();
        assert!(matches!(heap.pop(|_| 0.0), Err(Error::EmptyQueue)));
    }

    #[test]
    fn remove_then_pop_yields_remaining_sorted() {
        let scores: Vec<f64> = (0..20).map(|i| ((i * 7) % 20) as f64).collect();
        let mut heap = IndexedHeap::new();
        for i in 0..scores.len() {
            heap.push(i, |i| scores[*i]);
        }
        for victim in [0, 7, 13, 19, 4] {
            assert!(heap.remove(&victim, |i| scores[*i]));
        }
        let popped = drain(&mut heap, &scores);
        assert_eq!(popped.len(), 15);
        assert!(popped.windows(2).all(|w| scores[w[0]] <= scores[w[1]]));
        assert!(!popped.contains(&7));
    }

    #[test]
    fn push_then_remove_restores_size() {
        let scores = [3.0, 1.0, 2.0, 0.0];
        let mut heap = IndexedHeap::new();
        for i in 0..3 {
            heap.push(i, |i| scores[*i]);
        }
        let before = heap.len();
        heap.push(3, |i| scores[*i]);
        assert!(heap.remove(&3, |i| scores[*i]));
        assert_eq!(heap.len(), before);
        assert!(!heap.contains(&3));
    }

    #[test]
    fn remove_absent_is_noop() {
        let scores = [1.0, 2.0];
        let mut heap = IndexedHeap::new();
        heap.push(0, |i| scores[*i]);
        assert!(!heap.remove(&1, |i| scores[*i]));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn decrease_key_by_remove_and_push() {
        let mut scores = vec![10.0, 20.0, 30.0, 40.0];
        let mut heap = IndexedHeap::new();
        for i in 0..scores.len() {
            heap.push(i, |i| scores[*i]);
        }
        heap.remove(&3, |i| scores[*i]);
        scores[3] = 1.0;
        heap.push(3, |i| scores[*i]);
        assert_eq!(heap.pop(|i| scores[*i]).unwrap(), 3);
        assert_eq!(heap.pop(|i| scores[*i]).unwrap(), 0);
    }

    #[test]
    fn equal_scores_pop_lowest_index_first() {
        let scores = [f64::INFINITY; 6];
        let mut heap = IndexedHeap::new();
        for i in [4, 1, 5, 0, 3, 2] {
            heap.push(i, |i| scores[*i]);
        }
        assert_eq!(drain(&mut heap, &scores), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn repeated_push_repositions() {
        let mut scores = vec![5.0, 6.0, 7.0];
        let mut heap = IndexedHeap::new();
        for i in 0..3 {
            heap.push(i, |i| scores[*i]);
        }
        scores[2] = 0.0;
        heap.push(2, |i| scores[*i]);
        assert_eq!(heap.len(), 3);
        assert_eq!(heap.pop(|i| scores[*i]).unwrap(), 2);
    }

    #[test]
    fn interleaved_operations_match_sorted_reference() {
        // Deterministic pseudo-random workload
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        let scores: Vec<f64> = (0..200).map(|_| (next() % 1000) as f64).collect();
        let mut heap = IndexedHeap::with_capacity(scores.len());
        for i in 0..scores.len() {
            heap.push(i, |i| scores[*i]);
        }
        let mut removed = Vec::new();
        for _ in 0..50 {
            let victim = (next() % scores.len() as u64) as usize;
            if heap.remove(&victim, |i| scores[*i]) {
                removed.push(victim);
            }
        }
        let mut expected: Vec<usize> = (0..scores.len()).filter(|i| !removed.contains(i)).collect();
        expected.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]).then(a.cmp(b)));
        assert_eq!(drain(&mut heap, &scores), expected);
    }
}
