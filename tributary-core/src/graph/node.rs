//! Graph Nodes
//!
//! This module defines the node types that live in a resolved dependency
//! graph.

use std::fmt;

use smallvec::SmallVec;

use crate::flow::{Dependencies, EvalFn, Value};
use crate::token::{TokenId, TokenRef};

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The value is already present in the execution state.
    Cached,

    /// The value is fixed by an initial-value declaration.
    Initial,

    /// The value is computed by a formula over the node's dependencies.
    Formula,
}

/// Where a node's value comes from.
#[derive(Clone)]
pub enum NodeSource {
    Cached(Value),
    Initial(Value),
    Formula(EvalFn),
}

/// A node in the resolved dependency graph.
#[derive(Clone)]
pub struct GraphNode {
    token: TokenRef,

    source: NodeSource,

    /// Tokens this node reads from, in declaration order.
    dependencies: Dependencies,

    /// Nodes that read from this node, restricted to the resolved closure.
    dependents: SmallVec<[TokenId; 4]>,
}

impl GraphNode {
    pub(crate) fn new(token: TokenRef, source: NodeSource, dependencies: Dependencies) -> Self {
        Self {
            token,
            source,
            dependencies,
            dependents: SmallVec::new(),
        }
    }

    pub fn token(&self) -> &TokenRef {
        &self.token
    }

    pub fn kind(&self) -> NodeKind {
        match self.source {
            NodeSource::Cached(_) => NodeKind::Cached,
            NodeSource::Initial(_) => NodeKind::Initial,
            NodeSource::Formula(_) => NodeKind::Formula,
        }
    }

    pub fn source(&self) -> &NodeSource {
        &self.source
    }

    /// The value of a satisfied node, without evaluating anything.
    pub fn satisfied_value(&self) -> Option<&Value> {
        match &self.source {
            NodeSource::Cached(value) | NodeSource::Initial(value) => Some(value),
            NodeSource::Formula(_) => None,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied_value().is_some()
    }

    pub fn dependencies(&self) -> &[TokenRef] {
        &self.dependencies
    }

    pub fn dependents(&self) -> &[TokenId] {
        &self.dependents
    }

    pub(crate) fn add_dependent(&mut self, id: TokenId) {
        if !self.dependents.contains(&id) {
            self.dependents.push(id);
        }
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("token", &self.token)
            .field("kind", &self.kind())
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .finish()
    }
}
