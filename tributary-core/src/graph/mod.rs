//! Dependency Graph
//!
//! This module resolves the dependency graph a run needs and renders
//! static diagrams of it.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are tokens
//! - Edges point from a token to the dependencies its formula reads
//!
//! A graph is derived per run from the declarations reachable from the
//! target token. It is validated up front: a cycle, or a reachable token
//! with neither a declaration nor a cached value, rejects the run before
//! any token is evaluated.
//!
//! # Design Decisions
//!
//! 1. Nodes are kept in post-order, so iterating them is a topological
//!    order for free.
//!
//! 2. We keep both forward (dependencies) and reverse (dependents) edges:
//!    the evaluator walks dependencies during analysis and dependents when
//!    a token finishes.

mod builder;
mod node;
mod render;

pub use builder::{resolve, ResolvedGraph};
pub use node::{GraphNode, NodeKind, NodeSource};
pub use render::{GraphShape, ShapeEdge};
