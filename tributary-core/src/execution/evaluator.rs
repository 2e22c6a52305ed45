//! Evaluator
//!
//! The scheduler core of one run. All bookkeeping lives in a `RunBook`
//! behind a single lock; every state transition happens under it and
//! records its event before the lock is released. Formula jobs and events
//! for the logger are queued in the book and handed out by `drain`, which
//! runs on one thread at a time and never while the lock is held. A backend
//! that runs jobs inline therefore cannot deadlock, and does not nest one
//! completion inside another.
//!
//! # Algorithm
//!
//! 1. Analysis walks the graph depth-first from the target. The first
//!    visit claims a token; later visits join the existing claim, so a
//!    shared dependency is evaluated at most once.
//! 2. A token whose dependencies all have values is started. One with
//!    unfinished dependencies is backlogged with its unmet set.
//! 3. When a formula succeeds, each backlogged dependent waiting on it is
//!    revisited and started once its unmet set is empty.
//! 4. When a formula fails, every backlogged token downstream of it is
//!    cancelled with the failing token as blocker.
//! 5. When nothing is running any more, produced values are committed to
//!    the tracker in one step and the log is closed. Waiters are woken only
//!    after the logger has seen the final event.
//!
//! Graph walks use explicit stacks, so chain depth is bounded by memory
//! rather than by the thread's stack.

use std::collections::{HashMap, VecDeque};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::backend::Backend;
use super::events::{
    ExecutionEvent, LogEnded, LogStarted, RunStatus, TokenAnalyzed, TokenBacklogged,
    TokenCancelledEvaluation, TokenEndedEvaluation, TokenFailedEvaluation, TokenRevisited,
    TokenStartedEvaluation,
};
use super::log::ExecutionLog;
use super::logger::ExecutionLogger;
use super::{timestamp, ExecutionId};
use crate::error::{
    CancellationError, EvaluationError, ExecutionError, FormulaPanic, GraphDefinitionError,
    JobDropped, SharedError,
};
use crate::flow::{EvalFn, Inputs, Value};
use crate::graph::{GraphNode, GraphShape, NodeSource, ResolvedGraph};
use crate::state::{ExecutionState, ExecutionStateTracker};
use crate::token::{TokenId, TokenRef};

/// Lifecycle position of one token within a run.
enum Slot {
    /// Cached or initial value; never evaluated.
    Satisfied(Value),
    Backlogged { unmet: SmallVec<[TokenId; 4]> },
    Evaluating,
    Ended(Value),
    Failed(SharedError),
    Cancelled(Option<TokenRef>),
}

impl Slot {
    fn value(&self) -> Option<&Value> {
        match self {
            Slot::Satisfied(value) | Slot::Ended(value) => Some(value),
            _ => None,
        }
    }
}

/// How a finished run ended.
pub(crate) struct RunOutcome {
    pub result: Result<Value, ExecutionError>,
    pub state: ExecutionState,
}

pub(crate) struct RunBook {
    slots: HashMap<TokenId, Slot>,
    events: Vec<ExecutionEvent>,
    produced: Vec<(TokenRef, Value)>,
    running: usize,
    cancel_requested: bool,
    /// Jobs not yet handed to the backend.
    pending: VecDeque<PendingJob>,
    /// Events not yet delivered to the logger.
    outbox: Vec<ExecutionEvent>,
    draining: bool,
    /// Set when the log is closed; published once the outbox is empty.
    closing: Option<RunOutcome>,
    pub outcome: Option<RunOutcome>,
}

impl RunBook {
    fn is_closed(&self) -> bool {
        self.closing.is_some() || self.outcome.is_some()
    }
}

struct PendingJob {
    token: TokenRef,
    eval: EvalFn,
    inputs: Inputs,
}

/// A job in the backend's hands. Dropping it unrun fails its token, so a
/// backend that discards work cannot leave the run waiting forever.
struct Dispatched {
    run: Arc<Run>,
    job: Option<PendingJob>,
}

impl Dispatched {
    fn execute(mut self) {
        if let Some(job) = self.job.take() {
            Arc::clone(&self.run).execute(job);
        }
    }
}

impl Drop for Dispatched {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            warn!(
                execution_id = %self.run.execution_id,
                token = %job.token,
                "backend dropped a job without running it"
            );
            self.run
                .complete(&job.token, Err(Arc::new(JobDropped) as SharedError));
        }
    }
}

pub(crate) struct Run {
    execution_id: ExecutionId,
    target: TokenRef,
    graph: Result<ResolvedGraph, GraphDefinitionError>,
    shape: Option<GraphShape>,
    tracker: Arc<ExecutionStateTracker>,
    logger: Arc<dyn ExecutionLogger>,
    backend: Arc<dyn Backend>,
    book: Mutex<RunBook>,
    finished: Condvar,
    notify: Notify,
}

impl Run {
    pub(crate) fn new(
        target: TokenRef,
        graph: Result<ResolvedGraph, GraphDefinitionError>,
        tracker: Arc<ExecutionStateTracker>,
        logger: Arc<dyn ExecutionLogger>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        let shape = graph.as_ref().ok().map(ResolvedGraph::shape);
        Self {
            execution_id: ExecutionId::next(),
            target,
            graph,
            shape,
            tracker,
            logger,
            backend,
            book: Mutex::new(RunBook {
                slots: HashMap::new(),
                events: Vec::new(),
                produced: Vec::new(),
                running: 0,
                cancel_requested: false,
                pending: VecDeque::new(),
                outbox: Vec::new(),
                draining: false,
                closing: None,
                outcome: None,
            }),
            finished: Condvar::new(),
            notify: Notify::new(),
        }
    }

    pub(crate) fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub(crate) fn book(&self) -> &Mutex<RunBook> {
        &self.book
    }

    pub(crate) fn finished(&self) -> &Condvar {
        &self.finished
    }

    pub(crate) fn notify(&self) -> &Notify {
        &self.notify
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.book.lock().outcome.is_some()
    }

    /// Snapshot of the log as it stands.
    pub(crate) fn log(&self, book: &RunBook) -> ExecutionLog {
        ExecutionLog::new(
            self.execution_id,
            self.target.clone(),
            self.shape.clone(),
            book.events.clone(),
        )
    }

    /// Open the log and analyze the graph from the target.
    pub(crate) fn launch(self: &Arc<Self>) {
        {
            let mut book = self.book.lock();
            self.emit(
                &mut book,
                ExecutionEvent::LogStarted(LogStarted {
                    execution_id: self.execution_id,
                    timestamp: timestamp(),
                    target: self.target.clone(),
                }),
            );
            match &self.graph {
                Ok(graph) => {
                    debug!(
                        execution_id = %self.execution_id,
                        target = %self.target,
                        nodes = graph.len(),
                        "analyzing graph"
                    );
                    self.analyze(&mut book, graph);
                    self.finish_if_idle(&mut book);
                }
                Err(error) => {
                    warn!(execution_id = %self.execution_id, %error, "rejected graph");
                    let state = self.tracker.current();
                    self.close(
                        &mut book,
                        RunStatus::Invalid,
                        RunOutcome {
                            result: Err(error.clone().into()),
                            state,
                        },
                    );
                }
            }
        }
        self.drain();
    }

    /// Cancel every token that has not started. Running formulas finish.
    pub(crate) fn cancel(self: &Arc<Self>) {
        {
            let mut book = self.book.lock();
            if book.is_closed() || book.cancel_requested {
                return;
            }
            book.cancel_requested = true;
            debug!(execution_id = %self.execution_id, "cancellation requested");

            if let Ok(graph) = &self.graph {
                for node in graph.topological_order() {
                    if matches!(book.slots.get(&node.token().id()), Some(Slot::Backlogged { .. })) {
                        self.cancel_token(&mut book, node.token(), None);
                    }
                }
            }
            self.finish_if_idle(&mut book);
        }
        self.drain();
    }

    fn analyze(&self, book: &mut RunBook, graph: &ResolvedGraph) {
        let mut stack: Vec<(&GraphNode, usize)> = Vec::new();
        if let Some(node) = self.claim(book, graph, graph.target()) {
            stack.push((node, 0));
        }
        while let Some((node, next)) = stack.pop() {
            match node.dependencies().get(next) {
                Some(dependency) => {
                    stack.push((node, next + 1));
                    if let Some(dependency) = self.claim(book, graph, dependency) {
                        stack.push((dependency, 0));
                    }
                }
                None => self.settle(book, graph, node),
            }
        }
    }

    /// First visit of `token`. Returns its node when its dependencies
    /// still need walking.
    fn claim<'g>(
        &self,
        book: &mut RunBook,
        graph: &'g ResolvedGraph,
        token: &TokenRef,
    ) -> Option<&'g GraphNode> {
        if book.slots.contains_key(&token.id()) {
            return None;
        }
        let node = graph.node(token.id())?;
        self.emit(
            book,
            ExecutionEvent::TokenAnalyzed(TokenAnalyzed {
                execution_id: self.execution_id,
                timestamp: timestamp(),
                token: token.clone(),
            }),
        );

        if let Some(value) = node.satisfied_value() {
            book.slots.insert(token.id(), Slot::Satisfied(value.clone()));
            return None;
        }

        // Claim before descending so later visits join this one.
        book.slots.insert(
            token.id(),
            Slot::Backlogged {
                unmet: SmallVec::new(),
            },
        );
        Some(node)
    }

    /// Decide a claimed token once all its dependencies were visited.
    fn settle(&self, book: &mut RunBook, graph: &ResolvedGraph, node: &GraphNode) {
        let mut unmet: SmallVec<[TokenId; 4]> = SmallVec::new();
        let mut blocker = None;
        for dependency in node.dependencies() {
            match book.slots.get(&dependency.id()) {
                Some(Slot::Satisfied(_)) | Some(Slot::Ended(_)) => {}
                Some(Slot::Failed(_)) => {
                    blocker.get_or_insert_with(|| dependency.clone());
                }
                Some(Slot::Cancelled(root)) => {
                    let root = root.clone().unwrap_or_else(|| dependency.clone());
                    blocker.get_or_insert(root);
                }
                Some(Slot::Backlogged { .. }) | Some(Slot::Evaluating) | None => {
                    if !unmet.contains(&dependency.id()) {
                        unmet.push(dependency.id());
                    }
                }
            }
        }

        let token = node.token();
        if let Some(blocker) = blocker {
            self.cancel_token(book, token, Some(blocker));
        } else if book.cancel_requested {
            self.cancel_token(book, token, None);
        } else if unmet.is_empty() {
            self.start(book, graph, token);
        } else {
            self.backlog(book, graph, token, unmet);
        }
    }

    fn backlog(
        &self,
        book: &mut RunBook,
        graph: &ResolvedGraph,
        token: &TokenRef,
        unmet: SmallVec<[TokenId; 4]>,
    ) {
        let blockers = unmet
            .iter()
            .filter_map(|id| graph.node(*id).map(|node| node.token().clone()))
            .collect();
        book.slots.insert(token.id(), Slot::Backlogged { unmet });
        self.emit(
            book,
            ExecutionEvent::TokenBacklogged(TokenBacklogged {
                execution_id: self.execution_id,
                timestamp: timestamp(),
                token: token.clone(),
                unmet: blockers,
            }),
        );
    }

    fn start(&self, book: &mut RunBook, graph: &ResolvedGraph, token: &TokenRef) {
        let Some(node) = graph.node(token.id()) else {
            return;
        };
        let NodeSource::Formula(eval) = node.source() else {
            return;
        };
        let inputs = Inputs::new(node.dependencies().iter().filter_map(|dependency| {
            book.slots
                .get(&dependency.id())
                .and_then(Slot::value)
                .map(|value| (dependency.clone(), value.clone()))
        }));

        book.slots.insert(token.id(), Slot::Evaluating);
        book.running += 1;
        self.emit(
            book,
            ExecutionEvent::TokenStartedEvaluation(TokenStartedEvaluation {
                execution_id: self.execution_id,
                timestamp: timestamp(),
                token: token.clone(),
            }),
        );
        book.pending.push_back(PendingJob {
            token: token.clone(),
            eval: eval.clone(),
            inputs,
        });
    }

    fn cancel_token(&self, book: &mut RunBook, token: &TokenRef, blocker: Option<TokenRef>) {
        book.slots.insert(token.id(), Slot::Cancelled(blocker.clone()));
        self.emit(
            book,
            ExecutionEvent::TokenCancelledEvaluation(TokenCancelledEvaluation {
                execution_id: self.execution_id,
                timestamp: timestamp(),
                token: token.clone(),
                blocker,
            }),
        );
    }

    /// Deliver queued events and hand queued jobs to the backend until both
    /// queues are empty, then publish the outcome if the log was closed.
    ///
    /// Only one thread drains at a time. A caller that finds a drain in
    /// progress leaves its work to that thread, which is how an inline
    /// backend's completions unwind instead of nesting.
    fn drain(self: &Arc<Self>) {
        {
            let mut book = self.book.lock();
            if book.draining {
                return;
            }
            book.draining = true;
        }
        loop {
            let (events, job) = {
                let mut book = self.book.lock();
                let events = mem::take(&mut book.outbox);
                let job = book.pending.pop_front();
                if events.is_empty() && job.is_none() {
                    book.draining = false;
                    if let Some(outcome) = book.closing.take() {
                        book.outcome = Some(outcome);
                        self.finished.notify_all();
                        self.notify.notify_waiters();
                    }
                    return;
                }
                (events, job)
            };
            for event in &events {
                event.dispatch(self.logger.as_ref());
            }
            if let Some(job) = job {
                let dispatched = Dispatched {
                    run: Arc::clone(self),
                    job: Some(job),
                };
                self.backend.spawn(Box::new(move || dispatched.execute()));
            }
        }
    }

    fn execute(self: Arc<Self>, job: PendingJob) {
        let PendingJob {
            token,
            eval,
            inputs,
        } = job;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| eval(&inputs)));
        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(SharedError::from(error)),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(execution_id = %self.execution_id, %token, %message, "formula panicked");
                Err(Arc::new(FormulaPanic { message }) as SharedError)
            }
        };
        self.complete(&token, result);
    }

    fn complete(self: &Arc<Self>, token: &TokenRef, result: Result<Value, SharedError>) {
        let Ok(graph) = &self.graph else {
            return;
        };
        {
            let mut book = self.book.lock();
            book.running = book.running.saturating_sub(1);
            match result {
                Ok(value) => {
                    book.slots.insert(token.id(), Slot::Ended(value.clone()));
                    book.produced.push((token.clone(), value));
                    self.emit(
                        &mut book,
                        ExecutionEvent::TokenEndedEvaluation(TokenEndedEvaluation {
                            execution_id: self.execution_id,
                            timestamp: timestamp(),
                            token: token.clone(),
                        }),
                    );
                    if let Some(node) = graph.node(token.id()) {
                        for dependent in node.dependents() {
                            self.revisit(&mut book, graph, *dependent, token);
                        }
                    }
                }
                Err(error) => {
                    debug!(execution_id = %self.execution_id, %token, %error, "formula failed");
                    book.slots.insert(token.id(), Slot::Failed(error.clone()));
                    self.emit(
                        &mut book,
                        ExecutionEvent::TokenFailedEvaluation(TokenFailedEvaluation {
                            execution_id: self.execution_id,
                            timestamp: timestamp(),
                            token: token.clone(),
                            error,
                        }),
                    );
                    self.cascade(&mut book, graph, token);
                }
            }
            self.finish_if_idle(&mut book);
        }
        self.drain();
    }

    fn revisit(
        &self,
        book: &mut RunBook,
        graph: &ResolvedGraph,
        dependent: TokenId,
        resolved: &TokenRef,
    ) {
        let remaining = match book.slots.get_mut(&dependent) {
            Some(Slot::Backlogged { unmet }) if unmet.contains(&resolved.id()) => {
                unmet.retain(|id| *id != resolved.id());
                unmet.clone()
            }
            _ => return,
        };
        let Some(node) = graph.node(dependent) else {
            return;
        };
        let token = node.token().clone();
        self.emit(
            book,
            ExecutionEvent::TokenRevisited(TokenRevisited {
                execution_id: self.execution_id,
                timestamp: timestamp(),
                token: token.clone(),
                blocker_removed: resolved.clone(),
            }),
        );

        if !remaining.is_empty() {
            self.backlog(book, graph, &token, remaining);
        } else if book.cancel_requested {
            self.cancel_token(book, &token, None);
        } else {
            self.start(book, graph, &token);
        }
    }

    /// Cancel everything backlogged downstream of `root`, naming it as the
    /// blocker.
    fn cascade(&self, book: &mut RunBook, graph: &ResolvedGraph, root: &TokenRef) {
        let mut stack: Vec<(&GraphNode, usize)> = Vec::new();
        if let Some(node) = graph.node(root.id()) {
            stack.push((node, 0));
        }
        while let Some((node, next)) = stack.pop() {
            let Some(dependent) = node.dependents().get(next) else {
                continue;
            };
            stack.push((node, next + 1));
            if !matches!(book.slots.get(dependent), Some(Slot::Backlogged { .. })) {
                continue;
            }
            let Some(dependent) = graph.node(*dependent) else {
                continue;
            };
            self.cancel_token(book, dependent.token(), Some(root.clone()));
            stack.push((dependent, 0));
        }
    }

    fn finish_if_idle(&self, book: &mut RunBook) {
        if book.running > 0 || book.is_closed() {
            return;
        }

        let state = if book.produced.is_empty() {
            self.tracker.current()
        } else {
            self.tracker.commit(book.produced.drain(..))
        };

        let (status, result) = match book.slots.get(&self.target.id()) {
            Some(Slot::Satisfied(value)) | Some(Slot::Ended(value)) => {
                (RunStatus::Succeeded, Ok(value.clone()))
            }
            Some(Slot::Failed(error)) => (
                RunStatus::Failed,
                Err(ExecutionError::from(EvaluationError {
                    token: self.target.clone(),
                    source: error.clone(),
                })),
            ),
            Some(Slot::Cancelled(blocker)) => (
                RunStatus::Cancelled,
                Err(ExecutionError::from(CancellationError {
                    token: self.target.clone(),
                    blocker: blocker.clone(),
                })),
            ),
            _ => (
                RunStatus::Cancelled,
                Err(ExecutionError::from(CancellationError {
                    token: self.target.clone(),
                    blocker: None,
                })),
            ),
        };
        self.close(book, status, RunOutcome { result, state });
    }

    /// End the log. The outcome becomes visible to waiters once `drain`
    /// has delivered the final event.
    fn close(&self, book: &mut RunBook, status: RunStatus, outcome: RunOutcome) {
        self.emit(
            book,
            ExecutionEvent::LogEnded(LogEnded {
                execution_id: self.execution_id,
                timestamp: timestamp(),
                status,
            }),
        );
        debug!(
            execution_id = %self.execution_id,
            target = %self.target,
            %status,
            events = book.events.len(),
            "execution finished"
        );
        book.closing = Some(outcome);
    }

    fn emit(&self, book: &mut RunBook, event: ExecutionEvent) {
        book.outbox.push(event.clone());
        book.events.push(event);
    }
}
