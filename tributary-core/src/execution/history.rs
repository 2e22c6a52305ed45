//! Execution history.
//!
//! An `ExecutionLogger` that keeps the logs of runs in progress and of a
//! bounded number of finished runs, for monitoring. Live runs are tracked
//! in a concurrent map keyed by execution id; finished runs move to a ring
//! that drops the oldest entry once full.

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use super::events::{
    ExecutionEvent, LogEnded, LogStarted, RunStatus, TokenAnalyzed, TokenBacklogged,
    TokenCancelledEvaluation, TokenEndedEvaluation, TokenFailedEvaluation, TokenRevisited,
    TokenStartedEvaluation,
};
use super::logger::ExecutionLogger;
use super::ExecutionId;
use crate::token::TokenRef;

#[derive(Debug, Clone)]
struct Record {
    target: TokenRef,
    started_at: Duration,
    ended_at: Option<Duration>,
    status: Option<RunStatus>,
    events: Vec<ExecutionEvent>,
}

/// One row of the monitoring status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub target: String,
    pub started_at_ms: f64,
    pub ended_at_ms: Option<f64>,
    pub status: Option<RunStatus>,
    pub event_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStatus {
    pub live_executions: Vec<ExecutionSummary>,
    /// Most recent first.
    pub past_executions: Vec<ExecutionSummary>,
    pub remaining_capacity: usize,
}

pub struct ExecutionHistory {
    capacity: usize,
    live: DashMap<ExecutionId, Record>,
    past: Mutex<VecDeque<(ExecutionId, Record)>>,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            live: DashMap::new(),
            past: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn status(&self) -> HistoryStatus {
        let mut live_executions: Vec<ExecutionSummary> = self
            .live
            .iter()
            .map(|entry| summarize(*entry.key(), entry.value()))
            .collect();
        live_executions.sort_by_key(|summary| summary.execution_id);

        let past = self.past.lock();
        let past_executions = past
            .iter()
            .rev()
            .map(|(id, record)| summarize(*id, record))
            .collect();

        HistoryStatus {
            live_executions,
            past_executions,
            remaining_capacity: self.capacity.saturating_sub(past.len()),
        }
    }

    pub fn status_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.status())
    }

    /// Events recorded for a live or retained run.
    pub fn log(&self, execution_id: ExecutionId) -> Option<Vec<ExecutionEvent>> {
        if let Some(record) = self.live.get(&execution_id) {
            return Some(record.events.clone());
        }
        self.past
            .lock()
            .iter()
            .find(|(id, _)| *id == execution_id)
            .map(|(_, record)| record.events.clone())
    }

    fn record(&self, event: ExecutionEvent) {
        if let Some(mut record) = self.live.get_mut(&event.execution_id()) {
            record.events.push(event);
        }
    }
}

fn summarize(execution_id: ExecutionId, record: &Record) -> ExecutionSummary {
    ExecutionSummary {
        execution_id,
        target: record.target.code_name().to_string(),
        started_at_ms: record.started_at.as_secs_f64() * 1000.0,
        ended_at_ms: record.ended_at.map(|t| t.as_secs_f64() * 1000.0),
        status: record.status,
        event_count: record.events.len(),
    }
}

impl ExecutionLogger for ExecutionHistory {
    fn on_log_started(&self, event: &LogStarted) {
        self.live.insert(
            event.execution_id,
            Record {
                target: event.target.clone(),
                started_at: event.timestamp,
                ended_at: None,
                status: None,
                events: vec![ExecutionEvent::LogStarted(event.clone())],
            },
        );
    }

    fn on_token_analyzed(&self, event: &TokenAnalyzed) {
        self.record(ExecutionEvent::TokenAnalyzed(event.clone()));
    }

    fn on_token_backlogged(&self, event: &TokenBacklogged) {
        self.record(ExecutionEvent::TokenBacklogged(event.clone()));
    }

    fn on_token_started_evaluation(&self, event: &TokenStartedEvaluation) {
        self.record(ExecutionEvent::TokenStartedEvaluation(event.clone()));
    }

    fn on_token_ended_evaluation(&self, event: &TokenEndedEvaluation) {
        self.record(ExecutionEvent::TokenEndedEvaluation(event.clone()));
    }

    fn on_token_revisited(&self, event: &TokenRevisited) {
        self.record(ExecutionEvent::TokenRevisited(event.clone()));
    }

    fn on_token_failed_evaluation(&self, event: &TokenFailedEvaluation) {
        self.record(ExecutionEvent::TokenFailedEvaluation(event.clone()));
    }

    fn on_token_cancelled_evaluation(&self, event: &TokenCancelledEvaluation) {
        self.record(ExecutionEvent::TokenCancelledEvaluation(event.clone()));
    }

    fn on_log_ended(&self, event: &LogEnded) {
        let Some((id, mut record)) = self.live.remove(&event.execution_id) else {
            return;
        };
        record.ended_at = Some(event.timestamp);
        record.status = Some(event.status);
        record.events.push(ExecutionEvent::LogEnded(event.clone()));

        if self.capacity == 0 {
            return;
        }
        let mut past = self.past.lock();
        while past.len() >= self.capacity {
            past.pop_front();
        }
        past.push_back((id, record));
    }
}
