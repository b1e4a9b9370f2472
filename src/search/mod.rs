//! Parallel nearest-neighbour search.

mod engine;
mod heap;
mod pool;

pub use engine::{SearchEngine, SearchOptions, SearchParams, SearchState, brute_force};
pub use heap::{BoundedMaxHeap, Candidate};
pub use pool::{WorkCounter, WorkerPool};
