//! Execution handles.
//!
//! `Engine::run` returns immediately with a handle. The handle is how a
//! caller waits for the target value, blocking or async, and how it
//! cancels the run.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::evaluator::{Run, RunBook};
use super::log::ExecutionLog;
use super::ExecutionId;
use crate::error::{EvaluationError, ExecutionError, InputError, TimeoutError};
use crate::state::ExecutionState;

/// The target value of a successful run.
#[derive(Debug)]
pub struct ExecutionResult<T> {
    value: Arc<T>,
    log: ExecutionLog,
    state: ExecutionState,
}

impl<T> ExecutionResult<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn shared_value(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    /// Tracker state right after this run committed its values.
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn into_parts(self) -> (Arc<T>, ExecutionLog, ExecutionState) {
        (self.value, self.log, self.state)
    }
}

/// A run that did not produce its target, with the log up to that point.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    pub error: ExecutionError,
    pub log: ExecutionLog,
}

/// Handle to a run in progress.
pub struct ExecutionHandle<T> {
    run: Arc<Run>,
    default_timeout: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ExecutionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
            default_timeout: self.default_timeout,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> ExecutionHandle<T> {
    pub(crate) fn new(run: Arc<Run>, default_timeout: Option<Duration>) -> Self {
        Self {
            run,
            default_timeout,
            _marker: PhantomData,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.run.execution_id()
    }

    pub fn is_finished(&self) -> bool {
        self.run.is_finished()
    }

    /// Stop scheduling new work. Formulas already running are not
    /// interrupted; every token still waiting is cancelled. Safe to call
    /// from a logger attached to this run.
    pub fn cancel(&self) {
        self.run.cancel();
    }

    /// Snapshot of the log so far.
    pub fn log(&self) -> ExecutionLog {
        let book = self.run.book().lock();
        self.run.log(&book)
    }

    /// Block until the run finishes, or until `timeout` elapses.
    ///
    /// A timeout leaves the run going; waiting again is allowed.
    /// `Duration::MAX` waits as long as `None` does.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<ExecutionResult<T>, ExecutionFailure> {
        let mut book = self.run.book().lock();
        // A timeout too large to express as an instant waits forever.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        match (timeout, deadline) {
            (Some(timeout), Some(deadline)) => {
                while book.outcome.is_none() {
                    if self.run.finished().wait_until(&mut book, deadline).timed_out()
                        && book.outcome.is_none()
                    {
                        return Err(self.timed_out(&book, timeout));
                    }
                }
            }
            _ => {
                while book.outcome.is_none() {
                    self.run.finished().wait(&mut book);
                }
            }
        }
        self.conclude(&book)
    }

    /// Wait using the engine's configured default timeout.
    pub fn wait_default(&self) -> Result<ExecutionResult<T>, ExecutionFailure> {
        self.wait(self.default_timeout)
    }

    /// Async counterpart of [`wait`](Self::wait).
    pub async fn wait_async(
        &self,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult<T>, ExecutionFailure> {
        let finished = async {
            loop {
                let notified = self.run.notify().notified();
                if self.run.is_finished() {
                    break;
                }
                notified.await;
            }
        };
        match timeout {
            None => finished.await,
            Some(timeout) => {
                if tokio::time::timeout(timeout, finished).await.is_err() {
                    let book = self.run.book().lock();
                    if book.outcome.is_none() {
                        return Err(self.timed_out(&book, timeout));
                    }
                }
            }
        }
        let book = self.run.book().lock();
        self.conclude(&book)
    }

    fn timed_out(&self, book: &RunBook, timeout: Duration) -> ExecutionFailure {
        ExecutionFailure {
            error: ExecutionError::from(TimeoutError {
                execution_id: self.run.execution_id(),
                timeout,
            }),
            log: self.run.log(book),
        }
    }

    fn conclude(&self, book: &RunBook) -> Result<ExecutionResult<T>, ExecutionFailure> {
        let log = self.run.log(book);
        let Some(outcome) = book.outcome.as_ref() else {
            return Err(ExecutionFailure {
                error: ExecutionError::from(TimeoutError {
                    execution_id: self.run.execution_id(),
                    timeout: Duration::ZERO,
                }),
                log,
            });
        };
        match &outcome.result {
            Ok(value) => match Arc::clone(value).downcast::<T>() {
                Ok(value) => Ok(ExecutionResult {
                    value,
                    log,
                    state: outcome.state.clone(),
                }),
                Err(_) => {
                    let target = log.target().clone();
                    Err(ExecutionFailure {
                        error: ExecutionError::from(EvaluationError {
                            token: target.clone(),
                            source: Arc::new(InputError::TypeMismatch {
                                token: target,
                                expected: std::any::type_name::<T>(),
                            }),
                        }),
                        log,
                    })
                }
            },
            Err(error) => Err(ExecutionFailure {
                error: error.clone(),
                log,
            }),
        }
    }
}
