//! Concurrent k-nearest-neighbour search over a KD-tree.
//!
//! The calling thread walks the tree and hands every visited node to a
//! worker pool as a [`Candidate`]. Workers apply the payload filters and
//! fold survivors into a shared [`BoundedMaxHeap`]. The walk visits a
//! node's far subtree only when the target lies within
//! `extent[axis] * pruning_factor` of the splitting plane, so small factors
//! trade recall for speed. An infinite factor visits every node.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{VdbError, VdbResult};
use crate::filter::{Filter, matches_all};
use crate::index::{KdTree, NodeId};
use crate::search::heap::{BoundedMaxHeap, Candidate};
use crate::search::pool::WorkerPool;
use crate::vector::DistanceMetric;

/// Caller-facing search options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Number of neighbours to return; `0` uses the configured default.
    pub k: usize,

    /// Euclidean collections only: drop hits farther than this fraction of
    /// the bounding-box diagonal. `0` disables the cut.
    pub max_distance_percent: f64,

    /// Payload filters, all of which must match.
    pub filters: Vec<Filter>,

    /// Return coordinates along with each hit.
    pub include_vectors: bool,

    /// Overrides the configured pruning factor for this query.
    pub pruning_factor: Option<f64>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: 0,
            max_distance_percent: 0.0,
            filters: Vec::new(),
            include_vectors: false,
            pruning_factor: None,
        }
    }
}

impl SearchParams {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_max_distance_percent(mut self, percent: f64) -> Self {
        self.max_distance_percent = percent;
        self
    }

    pub fn with_vectors(mut self) -> Self {
        self.include_vectors = true;
        self
    }

    pub fn with_pruning_factor(mut self, factor: f64) -> Self {
        self.pruning_factor = Some(factor);
        self
    }

    /// Rejects negative or NaN tuning values.
    pub fn validate(&self) -> VdbResult<()> {
        if self.max_distance_percent.is_nan() || self.max_distance_percent < 0.0 {
            return Err(VdbError::InvalidSearchParams(format!(
                "max_distance_percent must be >= 0, got {}",
                self.max_distance_percent
            )));
        }
        if let Some(factor) = self.pruning_factor {
            if factor.is_nan() || factor < 0.0 {
                return Err(VdbError::InvalidSearchParams(format!(
                    "pruning_factor must be >= 0, got {factor}"
                )));
            }
        }
        Ok(())
    }
}

/// Lifecycle of one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// Built, nothing submitted yet.
    Idle,
    /// Walking the tree and submitting candidates.
    Running,
    /// Walk finished, waiting for workers to fold the last candidates.
    Draining,
    /// Workers stopped, results taken.
    Done,
}

/// Per-query tuning resolved from settings and [`SearchParams`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub k: usize,
    pub workers: usize,
    pub queue_capacity: usize,
    pub pruning_factor: f64,
    pub filters: Vec<Filter>,
}

/// One k-NN query: worker pool, result heap and state.
pub struct SearchEngine {
    state: SearchState,
    pruning_factor: f64,
    heap: Arc<Mutex<BoundedMaxHeap>>,
    pool: WorkerPool<Candidate>,
}

impl SearchEngine {
    /// Starts the worker pool for one query.
    pub fn new(options: SearchOptions) -> VdbResult<Self> {
        let heap = Arc::new(Mutex::new(BoundedMaxHeap::new(options.k)));
        let filters: Arc<[Filter]> = options.filters.into();

        let sink = Arc::clone(&heap);
        let pool = WorkerPool::new(
            options.workers,
            options.queue_capacity,
            move |candidate: Candidate| {
                if !filters.is_empty() && !passes_filters(&candidate, &filters) {
                    return;
                }
                sink.lock().push(candidate);
            },
        )?;

        Ok(Self {
            state: SearchState::Idle,
            pruning_factor: options.pruning_factor,
            heap,
            pool,
        })
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Runs the query against `tree` and returns up to `k` candidates in no
    /// particular order.
    ///
    /// `extents` holds the bounding box size per axis and scales the pruning
    /// threshold.
    pub fn run(
        &mut self,
        tree: &KdTree,
        target: &[f64],
        metric: DistanceMetric,
        extents: &[f64],
    ) -> VdbResult<Vec<Candidate>> {
        if self.state != SearchState::Idle {
            return Err(VdbError::SearchFailed(format!(
                "search engine already used (state {:?})",
                self.state
            )));
        }
        if target.len() != tree.dimension() || extents.len() != tree.dimension() {
            return Err(VdbError::DimensionMismatch {
                expected: tree.dimension(),
                actual: target.len(),
            });
        }

        self.state = SearchState::Running;
        let walked = self.walk(tree, target, metric, extents);

        self.state = SearchState::Draining;
        self.pool.wait_idle();
        self.pool.shutdown();
        self.state = SearchState::Done;

        let visited = walked?;
        let results = std::mem::replace(&mut *self.heap.lock(), BoundedMaxHeap::new(0)).into_vec();
        debug!(
            "Search visited {visited} of {} nodes, kept {}",
            tree.len(),
            results.len()
        );
        Ok(results)
    }

    /// Iterative branch-and-bound walk; returns the number of visited nodes.
    fn walk(
        &self,
        tree: &KdTree,
        target: &[f64],
        metric: DistanceMetric,
        extents: &[f64],
    ) -> VdbResult<usize> {
        let dimension = tree.dimension();
        let mut stack: Vec<NodeId> = tree.root().into_iter().collect();
        let mut visited = 0;

        while let Some(id) = stack.pop() {
            let node = tree.node(id);
            let axis = node.axis(dimension);
            let (distance, split) = node
                .entity()
                .with_data(|coords| (metric.distance(coords, target), coords[axis]))?;
            let axis_diff = (target[axis] - split).abs();
            visited += 1;

            self.pool.submit(Candidate {
                entity: Arc::clone(node.entity()),
                distance,
                axis_diff,
            })?;

            let (primary, secondary) = if target[axis] < split {
                (node.less(), node.greater())
            } else {
                (node.greater(), node.less())
            };

            if let Some(secondary) = secondary {
                if self.visits_secondary(axis_diff, extents[axis]) {
                    stack.push(secondary);
                }
            }
            // Primary side is popped first
            if let Some(primary) = primary {
                stack.push(primary);
            }
        }

        Ok(visited)
    }

    #[inline]
    fn visits_secondary(&self, axis_diff: f64, extent: f64) -> bool {
        self.pruning_factor.is_infinite() || axis_diff < extent * self.pruning_factor
    }
}

fn passes_filters(candidate: &Candidate, filters: &[Filter]) -> bool {
    match candidate.entity.read_payload() {
        Ok(Some(payload)) => matches_all(filters, &payload),
        Ok(None) => false,
        Err(e) => {
            warn!(
                "Dropping candidate '{}': payload unreadable: {e}",
                candidate.entity.id()
            );
            false
        }
    }
}

/// Exact top-`k` by scanning every entity of `tree`.
///
/// Reference for recall checks and the fallback for tiny collections.
pub fn brute_force(
    tree: &KdTree,
    target: &[f64],
    metric: DistanceMetric,
    k: usize,
) -> VdbResult<Vec<Candidate>> {
    let mut heap = BoundedMaxHeap::new(k);
    for entity in tree.entities() {
        let distance = entity.with_data(|coords| metric.distance(coords, target))?;
        heap.push(Candidate {
            entity: Arc::clone(entity),
            distance,
            axis_diff: 0.0,
        });
    }
    let mut results = heap.into_vec();
    results.sort();
    Ok(results)
}
