//! Fixed-size worker pool fed by a bounded channel.
//!
//! Every submitted job bumps a [`WorkCounter`]; workers decrement it when a
//! job finishes, even if the handler panics. A submitter can block on
//! [`WorkCounter::wait_idle`] until everything it queued has been handled.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{VdbError, VdbResult};

/// Count of jobs submitted but not yet finished.
#[derive(Debug, Default)]
pub struct WorkCounter {
    outstanding: Mutex<usize>,
    idle: Condvar,
}

impl WorkCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) {
        *self.outstanding.lock() += 1;
    }

    pub fn done(&self) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.idle.notify_all();
        }
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock()
    }

    /// Blocks until the count drops to zero.
    pub fn wait_idle(&self) {
        let mut outstanding = self.outstanding.lock();
        while *outstanding > 0 {
            self.idle.wait(&mut outstanding);
        }
    }
}

/// Marks one job finished when dropped.
struct DoneGuard<'a>(&'a WorkCounter);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

type Handler<J> = Arc<dyn Fn(J) + Send + Sync>;

/// Worker threads draining a shared job queue.
pub struct WorkerPool<J: Send + 'static> {
    sender: Option<Sender<J>>,
    workers: Vec<JoinHandle<()>>,
    counter: Arc<WorkCounter>,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Starts `workers` threads (at least one) that run `handler` for each
    /// job. At most `capacity` jobs wait in the queue; `submit` blocks
    /// beyond that.
    pub fn new(
        workers: usize,
        capacity: usize,
        handler: impl Fn(J) + Send + Sync + 'static,
    ) -> VdbResult<Self> {
        let workers = workers.max(1);
        let (sender, receiver) = bounded::<J>(capacity.max(1));
        let counter = Arc::new(WorkCounter::new());
        let handler: Handler<J> = Arc::new(handler);

        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(workers),
            counter,
        };

        for index in 0..workers {
            let receiver = receiver.clone();
            let handler = Arc::clone(&handler);
            let counter = Arc::clone(&pool.counter);
            let handle = thread::Builder::new()
                .name(format!("vdb-search-{index}"))
                .spawn(move || worker_loop(receiver, handler, counter))
                .map_err(|e| VdbError::SearchFailed(format!("cannot spawn search worker: {e}")))?;
            pool.workers.push(handle);
        }

        debug!("Started search pool with {workers} workers");
        Ok(pool)
    }

    pub fn counter(&self) -> &Arc<WorkCounter> {
        &self.counter
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues one job.
    pub fn submit(&self, job: J) -> VdbResult<()> {
        let Some(sender) = &self.sender else {
            return Err(VdbError::SearchFailed("worker pool is shut down".to_string()));
        };
        self.counter.add();
        if sender.send(job).is_err() {
            self.counter.done();
            return Err(VdbError::SearchFailed(
                "all search workers have exited".to_string(),
            ));
        }
        Ok(())
    }

    /// Waits until every submitted job has finished.
    pub fn wait_idle(&self) {
        self.counter.wait_idle();
    }

    /// Closes the queue and joins every worker.
    pub fn shutdown(&mut self) {
        self.sender = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Search worker panicked");
            }
        }
    }
}

impl<J: Send + 'static> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<J>(receiver: Receiver<J>, handler: Handler<J>, counter: Arc<WorkCounter>) {
    while let Ok(job) = receiver.recv() {
        let _done = DoneGuard(&counter);
        handler(job);
    }
}
