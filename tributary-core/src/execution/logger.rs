//! Execution loggers.
//!
//! A logger receives every event of the runs it is attached to, in
//! transition order. Callbacks run outside the run's scheduling lock, so a
//! logger may inspect or cancel the run it is observing. They still hold up
//! scheduling of that run and should be quick.

use std::sync::Arc;

use tracing::info;

use super::events::{
    LogEnded, LogStarted, TokenAnalyzed, TokenBacklogged, TokenCancelledEvaluation,
    TokenEndedEvaluation, TokenFailedEvaluation, TokenRevisited, TokenStartedEvaluation,
};

/// Receiver of execution events. Every callback defaults to a no-op.
pub trait ExecutionLogger: Send + Sync {
    fn on_log_started(&self, _event: &LogStarted) {}

    fn on_token_analyzed(&self, _event: &TokenAnalyzed) {}

    fn on_token_backlogged(&self, _event: &TokenBacklogged) {}

    fn on_token_started_evaluation(&self, _event: &TokenStartedEvaluation) {}

    fn on_token_ended_evaluation(&self, _event: &TokenEndedEvaluation) {}

    fn on_token_revisited(&self, _event: &TokenRevisited) {}

    fn on_token_failed_evaluation(&self, _event: &TokenFailedEvaluation) {}

    fn on_token_cancelled_evaluation(&self, _event: &TokenCancelledEvaluation) {}

    fn on_log_ended(&self, _event: &LogEnded) {}
}

/// Writes one `info` line per event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ExecutionLogger for TracingLogger {
    fn on_log_started(&self, event: &LogStarted) {
        info!(target: "tributary::execution", "{event}");
    }

    fn on_token_analyzed(&self, event: &TokenAnalyzed) {
        info!(target: "tributary::execution", "{event}");
    }

    fn on_token_backlogged(&self, event: &TokenBacklogged) {
        info!(target: "tributary::execution", "{event}");
    }

    fn on_token_started_evaluation(&self, event: &TokenStartedEvaluation) {
        info!(target: "tributary::execution", "{event}");
    }

    fn on_token_ended_evaluation(&self, event: &TokenEndedEvaluation) {
        info!(target: "tributary::execution", "{event}");
    }

    fn on_token_revisited(&self, event: &TokenRevisited) {
        info!(target: "tributary::execution", "{event}");
    }

    fn on_token_failed_evaluation(&self, event: &TokenFailedEvaluation) {
        info!(target: "tributary::execution", "{event}");
    }

    fn on_token_cancelled_evaluation(&self, event: &TokenCancelledEvaluation) {
        info!(target: "tributary::execution", "{event}");
    }

    fn on_log_ended(&self, event: &LogEnded) {
        info!(target: "tributary::execution", "{event}");
    }
}

/// Formats each event as a line and hands it to a closure.
pub struct LineLogger<F> {
    sink: F,
}

impl<F> LineLogger<F>
where
    F: Fn(&str) + Send + Sync,
{
    pub fn new(sink: F) -> Self {
        Self { sink }
    }
}

impl<F> ExecutionLogger for LineLogger<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn on_log_started(&self, event: &LogStarted) {
        (self.sink)(&event.to_string());
    }

    fn on_token_analyzed(&self, event: &TokenAnalyzed) {
        (self.sink)(&event.to_string());
    }

    fn on_token_backlogged(&self, event: &TokenBacklogged) {
        (self.sink)(&event.to_string());
    }

    fn on_token_started_evaluation(&self, event: &TokenStartedEvaluation) {
        (self.sink)(&event.to_string());
    }

    fn on_token_ended_evaluation(&self, event: &TokenEndedEvaluation) {
        (self.sink)(&event.to_string());
    }

    fn on_token_revisited(&self, event: &TokenRevisited) {
        (self.sink)(&event.to_string());
    }

    fn on_token_failed_evaluation(&self, event: &TokenFailedEvaluation) {
        (self.sink)(&event.to_string());
    }

    fn on_token_cancelled_evaluation(&self, event: &TokenCancelledEvaluation) {
        (self.sink)(&event.to_string());
    }

    fn on_log_ended(&self, event: &LogEnded) {
        (self.sink)(&event.to_string());
    }
}

/// Forwards every event to each inner logger, in order.
#[derive(Default, Clone)]
pub struct CompositeLogger {
    loggers: Vec<Arc<dyn ExecutionLogger>>,
}

impl CompositeLogger {
    pub fn new(loggers: impl IntoIterator<Item = Arc<dyn ExecutionLogger>>) -> Self {
        Self {
            loggers: loggers.into_iter().collect(),
        }
    }

    pub fn push(&mut self, logger: Arc<dyn ExecutionLogger>) {
        self.loggers.push(logger);
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl ExecutionLogger for CompositeLogger {
    fn on_log_started(&self, event: &LogStarted) {
        self.loggers.iter().for_each(|l| l.on_log_started(event));
    }

    fn on_token_analyzed(&self, event: &TokenAnalyzed) {
        self.loggers.iter().for_each(|l| l.on_token_analyzed(event));
    }

    fn on_token_backlogged(&self, event: &TokenBacklogged) {
        self.loggers.iter().for_each(|l| l.on_token_backlogged(event));
    }

    fn on_token_started_evaluation(&self, event: &TokenStartedEvaluation) {
        self.loggers
            .iter()
            .for_each(|l| l.on_token_started_evaluation(event));
    }

    fn on_token_ended_evaluation(&self, event: &TokenEndedEvaluation) {
        self.loggers
            .iter()
            .for_each(|l| l.on_token_ended_evaluation(event));
    }

    fn on_token_revisited(&self, event: &TokenRevisited) {
        self.loggers.iter().for_each(|l| l.on_token_revisited(event));
    }

    fn on_token_failed_evaluation(&self, event: &TokenFailedEvaluation) {
        self.loggers
            .iter()
            .for_each(|l| l.on_token_failed_evaluation(event));
    }

    fn on_token_cancelled_evaluation(&self, event: &TokenCancelledEvaluation) {
        self.loggers
            .iter()
            .for_each(|l| l.on_token_cancelled_evaluation(event));
    }

    fn on_log_ended(&self, event: &LogEnded) {
        self.loggers.iter().for_each(|l| l.on_log_ended(event));
    }
}
