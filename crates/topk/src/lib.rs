// This software is licensed under a dual license model:
//
// GNU Affero General Public License v3 (AGPLv3): You may use, modify, and
// distribute this software under the terms of the AGPLv3.
//
// Elastic License v2 (ELv2): You may also use, modify, and distribute this
// software under the Elastic License v2, which has specific restrictions.
//
// We welcome any commercial collaboration or support. For inquiries
// regarding the licenses, please contact us at:
// vectorchord-inquiry@tensorchord.ai
//
// Copyright (c) 2025 TensorChord Inc.

use distance::Scalar;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::num::NonZero;

// a payload that never takes part in ranking
struct AlwaysEqual<T>(T);

impl<T> PartialEq for AlwaysEqual<T> {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl<T> Eq for AlwaysEqual<T> {}

#[allow(clippy::non_canonical_partial_ord_impl)]
impl<T> PartialOrd for AlwaysEqual<T> {
    fn partial_cmp(&self, _: &Self) -> Option<Ordering> {
        Some(Ordering::Equal)
    }
}

impl<T> Ord for AlwaysEqual<T> {
    fn cmp(&self, _: &Self) -> Ordering {
        Ordering::Equal
    }
}

// (distance, arrival, item)
type Entry<D, T> = (D, u64, AlwaysEqual<T>);

/// Keeps the `capacity` smallest distances seen so far.
///
/// Among equal distances the entry that arrived first wins: an entry that
/// only ties the current worst is never admitted once the structure is full.
pub struct BoundedTopK<D, T> {
    capacity: NonZero<usize>,
    arrivals: u64,
    heap: BinaryHeap<Entry<D, T>>,
    // len(heap) <= capacity
    // peek(heap) is the worst kept entry, the latest arrival among equals
}

impl<D: Scalar, T> BoundedTopK<D, T> {
    pub fn new(capacity: NonZero<usize>) -> Self {
        Self {
            capacity,
            arrivals: 0,
            heap: BinaryHeap::with_capacity(capacity.get()),
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
    pub fn len(&self) -> usize {
        self.heap.len()
    }
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity.get()
    }
    /// Returns whether an entry at `distance` would be kept by [`Self::add`].
    #[inline]
    pub fn admits(&self, distance: D) -> bool {
        match self.peek_worst() {
            Some(worst) => distance < worst,
            None => true,
        }
    }
    /// The k-th best distance, or `None` while fewer than k entries are held.
    pub fn peek_worst(&self) -> Option<D> {
        if self.is_full() {
            self.heap.peek().map(|&(distance, ..)| distance)
        } else {
            None
        }
    }
    /// The k-th best distance, or `D::MAX` while fewer than k entries are held.
    pub fn current_worst_bound(&self) -> D {
        self.peek_worst().unwrap_or(D::MAX)
    }
    /// Offers an entry. Returns `true` if it was kept.
    pub fn add(&mut self, item: T, distance: D) -> bool {
        let arrival = self.arrivals;
        self.arrivals += 1;
        let entry = (distance, arrival, AlwaysEqual(item));
        if self.heap.len() < self.capacity.get() {
            self.heap.push(entry);
            return true;
        }
        match self.heap.peek_mut() {
            Some(mut worst) if distance < worst.0 => {
                *worst = entry;
                true
            }
            _ => false,
        }
    }
    pub fn clear(&mut self) {
        self.arrivals = 0;
        self.heap.clear();
    }
    /// Kept entries, ascending by distance, then by arrival.
    pub fn into_sorted_vec(self) -> Vec<(T, D)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|(distance, _, AlwaysEqual(item))| (item, distance))
            .collect()
    }
}

impl<D: Scalar, T: Clone> BoundedTopK<D, T> {
    /// Kept entries, ascending by distance, then by arrival. Does not consume.
    pub fn to_sorted_vec(&self) -> Vec<(T, D)> {
        let mut entries = self.heap.iter().collect::<Vec<_>>();
        // arrivals are unique, so the unstable sort is deterministic
        entries.sort_unstable();
        entries
            .into_iter()
            .map(|(distance, _, AlwaysEqual(item))| (item.clone(), *distance))
            .collect()
    }
}

impl<D: Scalar, T> Extend<(T, D)> for BoundedTopK<D, T> {
    fn extend<I: IntoIterator<Item = (T, D)>>(&mut self, iter: I) {
        for (item, distance) in iter {
            self.add(item, distance);
        }
    }
}

#[cfg(test)]
fn reference(sequence: &[(u64, u32)], k: usize) -> Vec<(u64, u32)> {
    let mut sorted = sequence.to_vec();
    // stable: equal distances keep arrival order
    sorted.sort_by_key(|&(_, d)| d);
    sorted.truncate(k);
    sorted
}

#[test]
fn test_bounded_top_k() {
    for _ in 0..300 {
        let k = rand::random_range(1..64usize);
        let n = rand::random_range(0..2000usize);
        let sequence = (0..n as u64)
            .map(|id| (id, rand::random_range(0..200u32)))
            .collect::<Vec<_>>();
        let mut topk = BoundedTopK::new(NonZero::new(k).unwrap());
        for (i, &(id, d)) in sequence.iter().enumerate() {
            topk.add(id, d);
            assert!(topk.len() <= k);
            if i % 97 == 0 {
                let bound = topk.current_worst_bound();
                assert!(topk.to_sorted_vec().iter().all(|&(_, d)| d <= bound));
            }
        }
        assert_eq!(topk.to_sorted_vec(), reference(&sequence, k));
        assert_eq!(topk.into_sorted_vec(), reference(&sequence, k));
    }
}

#[test]
fn test_ties_keep_first_arrivals() {
    let mut topk = BoundedTopK::new(NonZero::new(2).unwrap());
    assert!(topk.add(10i64, 5u32));
    assert!(topk.add(11, 5));
    assert!(!topk.add(12, 5));
    assert!(!topk.add(13, 6));
    assert_eq!(topk.to_sorted_vec(), vec![(10, 5), (11, 5)]);
    assert!(topk.add(14, 4));
    assert_eq!(topk.to_sorted_vec(), vec![(14, 4), (10, 5)]);
}

#[test]
fn test_worst_bound_sentinel() {
    let mut topk = BoundedTopK::<u32, i64>::new(NonZero::new(3).unwrap());
    assert_eq!(topk.current_worst_bound(), u32::MAX);
    assert_eq!(topk.peek_worst(), None);
    topk.add(1, 7);
    topk.add(2, 3);
    assert_eq!(topk.current_worst_bound(), u32::MAX);
    assert!(topk.admits(1000));
    topk.add(3, 5);
    assert_eq!(topk.current_worst_bound(), 7);
    assert!(topk.admits(6));
    assert!(!topk.admits(7));
}

#[test]
fn test_extraction_is_idempotent() {
    let mut topk = BoundedTopK::new(NonZero::new(8).unwrap());
    topk.extend((0..100i64).map(|id| (id, (id * 7919 % 13) as u32)));
    let first = topk.to_sorted_vec();
    let second = topk.to_sorted_vec();
    assert_eq!(first, second);
    assert_eq!(first.len(), 8);
}

#[test]
fn test_duplicates_are_not_merged() {
    let mut topk = BoundedTopK::new(NonZero::new(4).unwrap());
    topk.add(9i64, 1u32);
    topk.add(9, 1);
    assert_eq!(topk.to_sorted_vec(), vec![(9, 1), (9, 1)]);
    topk.clear();
    assert!(topk.is_empty());
}

#[test]
fn test_payload_is_not_ranked() {
    // no ordering, no equality, no clone
    struct Payload(&'static str);
    let mut topk = BoundedTopK::new(NonZero::new(3).unwrap());
    for (name, distance) in [("d", 4u32), ("a", 1), ("c", 3), ("b", 1), ("e", 0), ("f", 3)] {
        topk.add(Payload(name), distance);
    }
    assert_eq!(topk.peek_worst(), Some(1));
    let names = topk
        .into_sorted_vec()
        .into_iter()
        .map(|(Payload(name), distance)| (name, distance))
        .collect::<Vec<_>>();
    assert_eq!(names, vec![("e", 0), ("a", 1), ("b", 1)]);
}
