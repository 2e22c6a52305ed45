//! Execution
//!
//! Everything that happens once a target has been requested: the
//! scheduler core, the event stream it produces, the loggers that consume
//! it, and the handle callers wait on.
//!
//! # Lifecycle of a token
//!
//! Each token in the resolved graph moves through:
//!
//! 1. Analyzed: its dependencies have been visited.
//! 2. Satisfied (cached or initial value), which ends its lifecycle, or
//!    Backlogged while any dependency is unfinished.
//! 3. Revisited each time a blocking dependency succeeds.
//! 4. StartedEvaluation once every dependency has a value.
//! 5. EndedEvaluation or FailedEvaluation.
//!
//! A token whose dependency failed or was cancelled is never started: it
//! ends in CancelledEvaluation, naming the root failure as its blocker.
//!
//! # Concurrency
//!
//! Formulas run on a pluggable `Backend`. All scheduling decisions for a
//! run are made under one lock, so each token is claimed exactly once and
//! the log order matches the order of transitions. Loggers are called after
//! that lock is released, still in transition order.

mod backend;
mod evaluator;
mod events;
mod handle;
mod history;
mod log;
mod logger;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use backend::{Backend, InlineBackend, Job, ThreadPoolBackend, TokioBackend};
pub(crate) use evaluator::Run;
pub use events::{
    ExecutionEvent, LogEnded, LogStarted, RunStatus, TokenAnalyzed, TokenBacklogged,
    TokenCancelledEvaluation, TokenEndedEvaluation, TokenFailedEvaluation, TokenRevisited,
    TokenStartedEvaluation,
};
pub use handle::{ExecutionFailure, ExecutionHandle, ExecutionResult};
pub use history::{ExecutionHistory, ExecutionSummary, HistoryStatus};
pub use log::{EvaluationSpan, ExecutionLog, SpanOutcome};
pub use logger::{CompositeLogger, ExecutionLogger, LineLogger, TracingLogger};

/// Identifier distinguishing runs that share a tracker or logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(u64);

impl ExecutionId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic timestamp, measured from the first call in this process.
pub fn timestamp() -> Duration {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed()
}
