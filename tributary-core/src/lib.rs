//! Tributary Core
//!
//! This crate provides the scheduler for the Tributary dataflow execution
//! engine. Callers declare named values ("tokens"), wire them together
//! with formulas over other tokens, and ask for a target. The engine
//! resolves what the target needs, evaluates each required formula at most
//! once, and records every scheduling decision in a timestamped log.
//!
//! # Architecture
//!
//! - `token`: typed token handles and their erased identity
//! - `flow`: declarations, dataflows and the per-run catalog
//! - `state`: immutable value snapshots and the tracker that commits them
//! - `graph`: dependency resolution, validation and flow-chart rendering
//! - `execution`: the scheduler, events, loggers, backends and handles
//! - `engine`: the `run` entry point
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tributary_core::{Engine, ExecutionStateTracker, InlineBackend, Token};
//!
//! let a: Token<i32> = Token::new("a");
//! let b: Token<i32> = Token::new("b");
//! let (a2, b2) = (a.clone(), b.clone());
//!
//! let engine = Engine::builder()
//!     .declarations([
//!         a.initialized_to(2),
//!         b.depends_on(&[&a]).compute(move |inputs| Ok(inputs.get(&a2)? + 1)),
//!     ])
//!     .backend(Arc::new(InlineBackend))
//!     .build()?;
//!
//! let tracker = Arc::new(ExecutionStateTracker::default());
//! let result = engine.run(&b, [], &tracker, None).wait(None)?;
//! assert_eq!(*result.value(), 3);
//! assert_eq!(tracker.current().get(&b2), Some(&3));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod flow;
pub mod graph;
pub mod state;
pub mod token;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::{
    CancellationError, ConfigError, EvaluationError, ExecutionError, FormulaPanic,
    GraphDefinitionError, GraphProblem, InputError, JobDropped, TimeoutError,
};
pub use execution::{
    Backend, ExecutionEvent, ExecutionFailure, ExecutionHandle, ExecutionHistory, ExecutionId,
    ExecutionLog, ExecutionLogger, ExecutionResult, InlineBackend, Job, LineLogger, RunStatus,
    ThreadPoolBackend, TokioBackend, TracingLogger,
};
pub use flow::{Catalog, Component, Dataflow, Declaration, FormulaError, Inputs};
pub use state::{ExecutionState, ExecutionStateTracker};
pub use token::{AnyToken, Token, TokenId, TokenRef};
