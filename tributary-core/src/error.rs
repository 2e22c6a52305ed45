//! Error types.
//!
//! Structural problems are reported before anything runs. Formula failures
//! stay local to their token and surface through the execution log and the
//! final result.

use std::sync::Arc;
use std::time::Duration;

use crate::execution::ExecutionId;
use crate::token::TokenRef;

/// Shared formula error, cloned into events and results.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A formula read its inputs incorrectly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InputError {
    #[error("token {token} is not a dependency of this formula")]
    NotADependency { token: TokenRef },

    #[error("token {token} does not hold a value of type {expected}")]
    TypeMismatch {
        token: TokenRef,
        expected: &'static str,
    },
}

/// One structural problem found while resolving a graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphProblem {
    /// Tokens forming a cycle, in dependency order. The first token closes
    /// the cycle.
    #[error("cycle detected: {}", render_cycle(.0))]
    Cycle(Vec<TokenRef>),

    /// A reachable token has no declaration and no cached value.
    #[error("missing definition for {0}")]
    MissingDefinition(TokenRef),
}

fn render_cycle(path: &[TokenRef]) -> String {
    path.iter()
        .chain(path.first())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// The dependency graph of a target is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid dependency graph for {target}: {}", render_problems(.problems))]
pub struct GraphDefinitionError {
    pub target: TokenRef,
    pub problems: Vec<GraphProblem>,
}

impl GraphDefinitionError {
    pub fn cycles(&self) -> impl Iterator<Item = &[TokenRef]> {
        self.problems.iter().filter_map(|p| match p {
            GraphProblem::Cycle(path) => Some(path.as_slice()),
            GraphProblem::MissingDefinition(_) => None,
        })
    }

    pub fn missing(&self) -> impl Iterator<Item = &TokenRef> {
        self.problems.iter().filter_map(|p| match p {
            GraphProblem::MissingDefinition(token) => Some(token),
            GraphProblem::Cycle(_) => None,
        })
    }
}

fn render_problems(problems: &[GraphProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A formula failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("evaluation of {token} failed: {source}")]
pub struct EvaluationError {
    pub token: TokenRef,
    #[source]
    pub source: SharedError,
}

/// A formula panicked instead of returning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("formula panicked: {message}")]
pub struct FormulaPanic {
    pub message: String,
}

/// The backend discarded a formula job without running it, typically
/// because its runtime was shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("job was dropped by the backend before it ran")]
pub struct JobDropped;

/// A token was never evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("evaluation of {token} was cancelled{}", render_blocker(.blocker))]
pub struct CancellationError {
    pub token: TokenRef,
    /// The failed or cancelled dependency that caused this. `None` when the
    /// run itself was cancelled.
    pub blocker: Option<TokenRef>,
}

fn render_blocker(blocker: &Option<TokenRef>) -> String {
    match blocker {
        Some(blocker) => format!(" due to issues in {blocker}"),
        None => String::new(),
    }
}

/// Waiting for a run exceeded its deadline. The run itself keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("execution {execution_id} did not finish within {timeout:?}")]
pub struct TimeoutError {
    pub execution_id: ExecutionId,
    pub timeout: Duration,
}

/// Why a run did not produce its target value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    GraphDefinition(#[from] GraphDefinitionError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Cancellation(#[from] CancellationError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl ExecutionError {
    /// The token the failure points at, if any.
    ///
    /// For cancellations this is the blocker when one is known.
    pub fn culprit(&self) -> Option<&TokenRef> {
        match self {
            ExecutionError::GraphDefinition(_) | ExecutionError::Timeout(_) => None,
            ExecutionError::Evaluation(e) => Some(&e.token),
            ExecutionError::Cancellation(e) => e.blocker.as_ref().or(Some(&e.token)),
        }
    }
}

/// Invalid engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },

    #[error("failed to start worker threads: {0}")]
    WorkerSpawn(#[from] rayon::ThreadPoolBuildError),
}
