//! Fixed-capacity max-heap of search candidates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::vector::VectorEntity;

/// A scored search candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entity: Arc<VectorEntity>,
    pub distance: f64,
    pub axis_diff: f64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.entity.id().cmp(other.entity.id()))
    }
}

/// Candidates reserved up front by [`BoundedMaxHeap::new`].
const PREALLOCATED: usize = 1024;

/// Keeps the `capacity` closest candidates seen so far.
///
/// The heap's top is the worst kept candidate, so it is the one evicted
/// when a closer candidate arrives at full capacity.
#[derive(Debug)]
pub struct BoundedMaxHeap {
    capacity: usize,
    heap: BinaryHeap<Candidate>,
}

impl BoundedMaxHeap {
    /// Storage grows with the candidates pushed, not with `capacity`, so
    /// any `capacity` is accepted.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1).min(PREALLOCATED)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Inserts `candidate`, then evicts the worst one if over capacity.
    pub fn push(&mut self, candidate: Candidate) {
        self.heap.push(candidate);
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    /// Distance of the worst kept candidate.
    pub fn worst_distance(&self) -> Option<f64> {
        self.heap.peek().map(|c| c.distance)
    }

    /// Consumes the heap; candidates come back in no particular order.
    pub fn into_vec(self) -> Vec<Candidate> {
        self.heap.into_vec()
    }
}
