//! Execution backends.
//!
//! A backend decides where formula jobs run. The scheduler never blocks on
//! a job: it hands the closure over and is called back when it finishes.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tokio::runtime::Handle;
use tracing::{debug, error};

/// A unit of work submitted by the scheduler.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Backend: Send + Sync {
    fn spawn(&self, job: Job);
}

/// Runs every job on the calling thread, before `spawn` returns.
///
/// With this backend a run is complete by the time the engine hands back
/// its handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineBackend;

impl Backend for InlineBackend {
    fn spawn(&self, job: Job) {
        job();
    }
}

/// Runs jobs on a rayon thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolBackend {
    pool: Arc<ThreadPool>,
}

impl ThreadPoolBackend {
    /// Start a dedicated pool of `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|index| format!("tributary-worker-{index}"))
            .panic_handler(|_| error!("worker job panicked outside a formula"))
            .build()?;
        debug!(threads = pool.current_num_threads(), "started worker pool");
        Ok(Self::with_pool(Arc::new(pool)))
    }

    /// Share an existing pool, e.g. with other engines.
    pub fn with_pool(pool: Arc<ThreadPool>) -> Self {
        Self { pool }
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Backend for ThreadPoolBackend {
    fn spawn(&self, job: Job) {
        self.pool.spawn(job);
    }
}

/// Runs jobs on a tokio runtime's blocking pool.
///
/// A runtime that is shutting down discards new blocking tasks. Such a job
/// fails its token with `JobDropped` instead of running, so the run still
/// ends; keep the runtime alive until waiting handles return.
#[derive(Debug, Clone)]
pub struct TokioBackend {
    handle: Handle,
}

impl TokioBackend {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Backend for the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Backend for TokioBackend {
    fn spawn(&self, job: Job) {
        drop(self.handle.spawn_blocking(job));
    }
}
