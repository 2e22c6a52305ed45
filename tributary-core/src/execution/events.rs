//! Execution events.
//!
//! One struct per event kind, plus the `ExecutionEvent` union that the
//! execution log stores. Every event carries its run's execution id and a
//! monotonic timestamp.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use super::logger::ExecutionLogger;
use super::ExecutionId;
use crate::error::SharedError;
use crate::token::TokenRef;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// The target's formula failed.
    Failed,
    /// The target was cancelled, by an upstream failure or by request.
    Cancelled,
    /// The graph was rejected before anything ran.
    Invalid,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

fn serialize_error<S: Serializer>(error: &SharedError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStarted {
    pub execution_id: ExecutionId,
    pub timestamp: Duration,
    pub target: TokenRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenAnalyzed {
    pub execution_id: ExecutionId,
    pub timestamp: Duration,
    pub token: TokenRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenBacklogged {
    pub execution_id: ExecutionId,
    pub timestamp: Duration,
    pub token: TokenRef,
    /// Dependencies still blocking the token.
    pub unmet: Vec<TokenRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenStartedEvaluation {
    pub execution_id: ExecutionId,
    pub timestamp: Duration,
    pub token: TokenRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenEndedEvaluation {
    pub execution_id: ExecutionId,
    pub timestamp: Duration,
    pub token: TokenRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenRevisited {
    pub execution_id: ExecutionId,
    pub timestamp: Duration,
    pub token: TokenRef,
    /// The dependency that just finished.
    pub blocker_removed: TokenRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenFailedEvaluation {
    pub execution_id: ExecutionId,
    pub timestamp: Duration,
    pub token: TokenRef,
    #[serde(serialize_with = "serialize_error")]
    pub error: SharedError,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenCancelledEvaluation {
    pub execution_id: ExecutionId,
    pub timestamp: Duration,
    pub token: TokenRef,
    /// Root failure that caused the cancellation. `None` when the run was
    /// cancelled on request.
    pub blocker: Option<TokenRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEnded {
    pub execution_id: ExecutionId,
    pub timestamp: Duration,
    pub status: RunStatus,
}

/// Any event of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum ExecutionEvent {
    LogStarted(LogStarted),
    TokenAnalyzed(TokenAnalyzed),
    TokenBacklogged(TokenBacklogged),
    TokenStartedEvaluation(TokenStartedEvaluation),
    TokenEndedEvaluation(TokenEndedEvaluation),
    TokenRevisited(TokenRevisited),
    TokenFailedEvaluation(TokenFailedEvaluation),
    TokenCancelledEvaluation(TokenCancelledEvaluation),
    LogEnded(LogEnded),
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::LogStarted(e) => e.execution_id,
            ExecutionEvent::TokenAnalyzed(e) => e.execution_id,
            ExecutionEvent::TokenBacklogged(e) => e.execution_id,
            ExecutionEvent::TokenStartedEvaluation(e) => e.execution_id,
            ExecutionEvent::TokenEndedEvaluation(e) => e.execution_id,
            ExecutionEvent::TokenRevisited(e) => e.execution_id,
            ExecutionEvent::TokenFailedEvaluation(e) => e.execution_id,
            ExecutionEvent::TokenCancelledEvaluation(e) => e.execution_id,
            ExecutionEvent::LogEnded(e) => e.execution_id,
        }
    }

    pub fn timestamp(&self) -> Duration {
        match self {
            ExecutionEvent::LogStarted(e) => e.timestamp,
            ExecutionEvent::TokenAnalyzed(e) => e.timestamp,
            ExecutionEvent::TokenBacklogged(e) => e.timestamp,
            ExecutionEvent::TokenStartedEvaluation(e) => e.timestamp,
            ExecutionEvent::TokenEndedEvaluation(e) => e.timestamp,
            ExecutionEvent::TokenRevisited(e) => e.timestamp,
            ExecutionEvent::TokenFailedEvaluation(e) => e.timestamp,
            ExecutionEvent::TokenCancelledEvaluation(e) => e.timestamp,
            ExecutionEvent::LogEnded(e) => e.timestamp,
        }
    }

    /// The subject token, for token-level events.
    pub fn token(&self) -> Option<&TokenRef> {
        match self {
            ExecutionEvent::LogStarted(_) | ExecutionEvent::LogEnded(_) => None,
            ExecutionEvent::TokenAnalyzed(e) => Some(&e.token),
            ExecutionEvent::TokenBacklogged(e) => Some(&e.token),
            ExecutionEvent::TokenStartedEvaluation(e) => Some(&e.token),
            ExecutionEvent::TokenEndedEvaluation(e) => Some(&e.token),
            ExecutionEvent::TokenRevisited(e) => Some(&e.token),
            ExecutionEvent::TokenFailedEvaluation(e) => Some(&e.token),
            ExecutionEvent::TokenCancelledEvaluation(e) => Some(&e.token),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::LogStarted(_) => "LogStarted",
            ExecutionEvent::TokenAnalyzed(_) => "TokenAnalyzed",
            ExecutionEvent::TokenBacklogged(_) => "TokenBacklogged",
            ExecutionEvent::TokenStartedEvaluation(_) => "TokenStartedEvaluation",
            ExecutionEvent::TokenEndedEvaluation(_) => "TokenEndedEvaluation",
            ExecutionEvent::TokenRevisited(_) => "TokenRevisited",
            ExecutionEvent::TokenFailedEvaluation(_) => "TokenFailedEvaluation",
            ExecutionEvent::TokenCancelledEvaluation(_) => "TokenCancelledEvaluation",
            ExecutionEvent::LogEnded(_) => "LogEnded",
        }
    }

    /// Whether this event ends the subject token's lifecycle.
    pub fn is_token_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::TokenEndedEvaluation(_)
                | ExecutionEvent::TokenFailedEvaluation(_)
                | ExecutionEvent::TokenCancelledEvaluation(_)
        )
    }

    /// Hand the event to the matching logger callback.
    pub fn dispatch<L: ExecutionLogger + ?Sized>(&self, logger: &L) {
        match self {
            ExecutionEvent::LogStarted(e) => logger.on_log_started(e),
            ExecutionEvent::TokenAnalyzed(e) => logger.on_token_analyzed(e),
            ExecutionEvent::TokenBacklogged(e) => logger.on_token_backlogged(e),
            ExecutionEvent::TokenStartedEvaluation(e) => logger.on_token_started_evaluation(e),
            ExecutionEvent::TokenEndedEvaluation(e) => logger.on_token_ended_evaluation(e),
            ExecutionEvent::TokenRevisited(e) => logger.on_token_revisited(e),
            ExecutionEvent::TokenFailedEvaluation(e) => logger.on_token_failed_evaluation(e),
            ExecutionEvent::TokenCancelledEvaluation(e) => {
                logger.on_token_cancelled_evaluation(e)
            }
            ExecutionEvent::LogEnded(e) => logger.on_log_ended(e),
        }
    }
}

fn prefix(f: &mut fmt::Formatter<'_>, timestamp: Duration, id: ExecutionId, kind: &str) -> fmt::Result {
    write!(f, "{} [{}][{}]", timestamp.as_millis(), id, kind)
}

impl fmt::Display for LogStarted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        prefix(f, self.timestamp, self.execution_id, "LogStarted")?;
        write!(f, " {}", self.target)
    }
}

impl fmt::Display for TokenAnalyzed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        prefix(f, self.timestamp, self.execution_id, "TokenAnalyzed")?;
        write!(f, " {}", self.token)
    }
}

impl fmt::Display for TokenBacklogged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        prefix(f, self.timestamp, self.execution_id, "TokenBacklogged")?;
        write!(f, " {} because of {} blockers", self.token, self.unmet.len())
    }
}

impl fmt::Display for TokenStartedEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        prefix(f, self.timestamp, self.execution_id, "TokenStartedEvaluation")?;
        write!(f, " {}", self.token)
    }
}

impl fmt::Display for TokenEndedEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        prefix(f, self.timestamp, self.execution_id, "TokenEndedEvaluation")?;
        write!(f, " {}", self.token)
    }
}

impl fmt::Display for TokenRevisited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        prefix(f, self.timestamp, self.execution_id, "TokenRevisited")?;
        write!(
            f,
            " {} because of blocker {} has been resolved",
            self.token, self.blocker_removed
        )
    }
}

impl fmt::Display for TokenFailedEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        prefix(f, self.timestamp, self.execution_id, "TokenFailedEvaluation")?;
        write!(f, " {}: {}", self.token, self.error)
    }
}

impl fmt::Display for TokenCancelledEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        prefix(f, self.timestamp, self.execution_id, "TokenCancelledEvaluation")?;
        match &self.blocker {
            Some(blocker) => write!(f, " {} due to issues in blocker {}", self.token, blocker),
            None => write!(f, " {}", self.token),
        }
    }
}

impl fmt::Display for LogEnded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        prefix(f, self.timestamp, self.execution_id, "LogEnded")?;
        write!(f, " {}", self.status)
    }
}

impl fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionEvent::LogStarted(e) => e.fmt(f),
            ExecutionEvent::TokenAnalyzed(e) => e.fmt(f),
            ExecutionEvent::TokenBacklogged(e) => e.fmt(f),
            ExecutionEvent::TokenStartedEvaluation(e) => e.fmt(f),
            ExecutionEvent::TokenEndedEvaluation(e) => e.fmt(f),
            ExecutionEvent::TokenRevisited(e) => e.fmt(f),
            ExecutionEvent::TokenFailedEvaluation(e) => e.fmt(f),
            ExecutionEvent::TokenCancelledEvaluation(e) => e.fmt(f),
            ExecutionEvent::LogEnded(e) => e.fmt(f),
        }
    }
}
