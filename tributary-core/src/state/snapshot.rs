//! Immutable state snapshots.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::flow::Value;
use crate::token::{Token, TokenId, TokenRef};

#[derive(Clone)]
struct Entry {
    token: TokenRef,
    value: Value,
}

/// Mapping from tokens to computed values.
///
/// Cloning is cheap: entries are shared between snapshots.
#[derive(Clone, Default)]
pub struct ExecutionState {
    entries: Arc<HashMap<TokenId, Entry>>,
}

impl ExecutionState {
    /// A state with no values.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Seed a state with a value. Used to prepare a tracker before a run.
    pub fn with<T: Send + Sync + 'static>(self, token: &Token<T>, value: T) -> Self {
        self.merged([(token.erased().clone(), Arc::new(value) as Value)])
    }

    /// Derive a new state containing `values` on top of this one.
    ///
    /// Tokens that already have a value keep it.
    pub fn merged(&self, values: impl IntoIterator<Item = (TokenRef, Value)>) -> Self {
        let mut entries = HashMap::clone(&self.entries);
        for (token, value) in values {
            match entries.get(&token.id()) {
                Some(_) => debug!(token = %token, "state already holds a value, keeping it"),
                None => {
                    entries.insert(token.id(), Entry { token, value });
                }
            }
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Typed read of a token's value.
    pub fn get<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Option<&T> {
        self.entries
            .get(&token.id())
            .and_then(|entry| entry.value.downcast_ref::<T>())
    }

    /// Untyped read of a token's value.
    pub fn value(&self, token: &TokenRef) -> Option<&Value> {
        self.entries.get(&token.id()).map(|entry| &entry.value)
    }

    pub fn contains(&self, token: &TokenRef) -> bool {
        self.entries.contains_key(&token.id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tokens with a value in this state, in no particular order.
    pub fn tokens(&self) -> impl Iterator<Item = &TokenRef> {
        self.entries.values().map(|entry| &entry.token)
    }
}

impl fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tokens()).finish()
    }
}
