//! State tracker shared between runs.

use parking_lot::RwLock;

use super::snapshot::ExecutionState;
use crate::flow::Value;
use crate::token::TokenRef;

/// Concurrency-safe holder of the current `ExecutionState`.
///
/// Readers take a snapshot; `commit` swaps in a derived state under the
/// write lock so concurrent commits never lose each other's values.
#[derive(Debug, Default)]
pub struct ExecutionStateTracker {
    current: RwLock<ExecutionState>,
}

impl ExecutionStateTracker {
    pub fn new(initial: ExecutionState) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> ExecutionState {
        self.current.read().clone()
    }

    /// Merge values into the current state and return the new snapshot.
    pub fn commit(&self, values: impl IntoIterator<Item = (TokenRef, Value)>) -> ExecutionState {
        let mut current = self.current.write();
        let next = current.merged(values);
        *current = next.clone();
        next
    }
}

impl From<ExecutionState> for ExecutionStateTracker {
    fn from(state: ExecutionState) -> Self {
        Self::new(state)
    }
}
