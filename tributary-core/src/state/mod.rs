//! Execution State
//!
//! `ExecutionState` is an immutable snapshot of already-computed token
//! values. `ExecutionStateTracker` holds the current snapshot and swaps in
//! new ones atomically as runs commit their results.
//!
//! # Lineage
//!
//! Once a token has a value in a lineage of states it keeps that value.
//! Merging a second value for the same token keeps the first one.

mod snapshot;
mod tracker;

pub use snapshot::ExecutionState;
pub use tracker::ExecutionStateTracker;
