//! Execution log.
//!
//! The ordered event record of one run, together with the shape of the
//! graph it ran over. A log can be rendered as a static flow chart of that
//! graph, or as a waterfall of when each formula ran.

use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

use super::events::{ExecutionEvent, RunStatus};
use super::ExecutionId;
use crate::graph::GraphShape;
use crate::token::{TokenId, TokenRef};

const WATERFALL_WIDTH: u128 = 40;

/// How an evaluation span ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanOutcome {
    Ended,
    Failed,
    Cancelled,
    /// Still running when the log was captured.
    Running,
}

/// The interval during which one formula was evaluating.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSpan {
    pub token: TokenRef,
    pub start: Duration,
    pub end: Option<Duration>,
    pub outcome: SpanOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionLog {
    execution_id: ExecutionId,
    target: TokenRef,
    shape: Option<GraphShape>,
    events: Vec<ExecutionEvent>,
}

impl ExecutionLog {
    pub(crate) fn new(
        execution_id: ExecutionId,
        target: TokenRef,
        shape: Option<GraphShape>,
        events: Vec<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            target,
            shape,
            events,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn target(&self) -> &TokenRef {
        &self.target
    }

    /// Graph shape of the run. `None` when the graph was rejected.
    pub fn shape(&self) -> Option<&GraphShape> {
        self.shape.as_ref()
    }

    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    /// Events whose subject is `token`, in order.
    pub fn events_for<'a>(&'a self, token: &'a TokenRef) -> impl Iterator<Item = &'a ExecutionEvent> {
        self.events
            .iter()
            .filter(move |event| event.token() == Some(token))
    }

    /// Final status, once the run has ended.
    pub fn status(&self) -> Option<RunStatus> {
        self.events.iter().rev().find_map(|event| match event {
            ExecutionEvent::LogEnded(ended) => Some(ended.status),
            _ => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.status().is_some()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Render the run's graph as a flow chart. A rejected graph renders as
    /// its lone target.
    pub fn render_flow_chart(&self, use_code_name: bool, sink: impl FnMut(&str)) {
        match &self.shape {
            Some(shape) => shape.render_flow_chart(use_code_name, sink),
            None => GraphShape::from_edges([(self.target.clone(), Vec::new())])
                .render_flow_chart(use_code_name, sink),
        }
    }

    /// Evaluation spans ordered by start time.
    pub fn spans(&self) -> Vec<EvaluationSpan> {
        let mut spans: IndexMap<TokenId, EvaluationSpan> = IndexMap::new();
        for event in &self.events {
            let (token, timestamp, outcome) = match event {
                ExecutionEvent::TokenStartedEvaluation(e) => {
                    spans.insert(
                        e.token.id(),
                        EvaluationSpan {
                            token: e.token.clone(),
                            start: e.timestamp,
                            end: None,
                            outcome: SpanOutcome::Running,
                        },
                    );
                    continue;
                }
                ExecutionEvent::TokenEndedEvaluation(e) => (&e.token, e.timestamp, SpanOutcome::Ended),
                ExecutionEvent::TokenFailedEvaluation(e) => {
                    (&e.token, e.timestamp, SpanOutcome::Failed)
                }
                ExecutionEvent::TokenCancelledEvaluation(e) => {
                    (&e.token, e.timestamp, SpanOutcome::Cancelled)
                }
                _ => continue,
            };
            if let Some(span) = spans.get_mut(&token.id()) {
                span.end = Some(timestamp);
                span.outcome = outcome;
            }
        }
        let mut spans: Vec<EvaluationSpan> = spans.into_values().collect();
        spans.sort_by_key(|span| span.start);
        spans
    }

    /// Render a text waterfall: one row per evaluated token, with a bar
    /// from the moment it started to the moment it finished.
    pub fn render_waterfall(&self, mut sink: impl FnMut(&str)) {
        let origin = self
            .events
            .first()
            .map(ExecutionEvent::timestamp)
            .unwrap_or_default();
        let horizon = self
            .events
            .last()
            .map(ExecutionEvent::timestamp)
            .unwrap_or_default();
        let total = horizon.saturating_sub(origin).as_nanos().max(1);

        sink(&format!(
            "execution {} of {} ({:.3}ms)",
            self.execution_id,
            self.target,
            millis(horizon.saturating_sub(origin))
        ));

        let spans = self.spans();
        let name_width = spans
            .iter()
            .map(|span| span.token.code_name().len())
            .max()
            .unwrap_or(0);

        for span in spans {
            let start = span.start.saturating_sub(origin);
            let end = span.end.unwrap_or(horizon).saturating_sub(origin);
            let from = (start.as_nanos() * WATERFALL_WIDTH / total).min(WATERFALL_WIDTH - 1);
            let to = (end.as_nanos() * WATERFALL_WIDTH / total).clamp(from + 1, WATERFALL_WIDTH);

            let mut bar = String::with_capacity(WATERFALL_WIDTH as usize);
            for column in 0..WATERFALL_WIDTH {
                bar.push(if column >= from && column < to { '=' } else { ' ' });
            }

            let outcome = match span.outcome {
                SpanOutcome::Ended => "ended",
                SpanOutcome::Failed => "failed",
                SpanOutcome::Cancelled => "cancelled",
                SpanOutcome::Running => "running",
            };
            sink(&format!(
                "{:<width$} |{}| {:.3}ms..{:.3}ms {}",
                span.token.code_name(),
                bar,
                millis(start),
                millis(end),
                outcome,
                width = name_width
            ));
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::{
        LogEnded, LogStarted, TokenEndedEvaluation, TokenFailedEvaluation, TokenStartedEvaluation,
    };
    use crate::token::Token;
    use std::sync::Arc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sample() -> (ExecutionLog, Token<i32>, Token<i32>) {
        let id = ExecutionId::next();
        let b: Token<i32> = Token::new("b");
        let slow: Token<i32> = Token::new("slow");
        let events = vec![
            ExecutionEvent::LogStarted(LogStarted {
                execution_id: id,
                timestamp: ms(0),
                target: slow.erased().clone(),
            }),
            ExecutionEvent::TokenStartedEvaluation(TokenStartedEvaluation {
                execution_id: id,
                timestamp: ms(20),
                token: slow.erased().clone(),
            }),
            ExecutionEvent::TokenStartedEvaluation(TokenStartedEvaluation {
                execution_id: id,
                timestamp: ms(0),
                token: b.erased().clone(),
            }),
            ExecutionEvent::TokenEndedEvaluation(TokenEndedEvaluation {
                execution_id: id,
                timestamp: ms(20),
                token: b.erased().clone(),
            }),
            ExecutionEvent::TokenFailedEvaluation(TokenFailedEvaluation {
                execution_id: id,
                timestamp: ms(40),
                token: slow.erased().clone(),
                error: Arc::new(std::io::Error::other("late")),
            }),
            ExecutionEvent::LogEnded(LogEnded {
                execution_id: id,
                timestamp: ms(40),
                status: RunStatus::Failed,
            }),
        ];
        (ExecutionLog::new(id, slow.erased().clone(), None, events), b, slow)
    }

    #[test]
    fn spans_are_ordered_by_start() {
        let (log, b, slow) = sample();
        let spans = log.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].token, *b.erased());
        assert_eq!(spans[0].outcome, SpanOutcome::Ended);
        assert_eq!(spans[1].token, *slow.erased());
        assert_eq!(spans[1].end, Some(ms(40)));
        assert_eq!(spans[1].outcome, SpanOutcome::Failed);
        assert_eq!(log.status(), Some(RunStatus::Failed));
    }

    #[test]
    fn waterfall_draws_one_bar_per_span() {
        let (log, _, _) = sample();
        let mut lines = Vec::new();
        log.render_waterfall(|line| lines.push(line.to_string()));

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("(40.000ms)"));
        let half = "=".repeat(20);
        assert_eq!(
            lines[1],
            format!("b    |{}{}| 0.000ms..20.000ms ended", half, " ".repeat(20))
        );
        assert_eq!(
            lines[2],
            format!("slow |{}{}| 20.000ms..40.000ms failed", " ".repeat(20), half)
        );
    }

    #[test]
    fn rejected_graph_renders_its_target() {
        let (log, _, _) = sample();
        let mut lines = Vec::new();
        log.render_flow_chart(true, |line| lines.push(line.to_string()));
        assert_eq!(lines, vec!["graph LR", "    n0[\"slow\"]"]);
    }
}
