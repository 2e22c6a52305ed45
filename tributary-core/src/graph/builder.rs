//! Graph Builder
//!
//! Resolves the transitive dependency closure of a target token against a
//! catalog and a state snapshot, and validates it before anything runs.
//!
//! # Algorithm
//!
//! A depth-first walk from the target with visiting/visited marks:
//!
//! 1. A token present in the state snapshot is a satisfied leaf, even when
//!    a formula exists for it.
//! 2. A token with an initial-value declaration is a satisfied leaf.
//! 3. A token with a formula is marked visiting, its dependencies are
//!    walked, then it is marked visited. Reaching a visiting token again
//!    closes a cycle.
//! 4. A token with neither is a missing definition.
//!
//! Every problem is collected before returning. Nodes are inserted in
//! post-order, so iteration order is already topological. The walk keeps
//! its own frame stack instead of recursing.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::node::{GraphNode, NodeSource};
use super::render::GraphShape;
use crate::error::{GraphDefinitionError, GraphProblem};
use crate::flow::{Catalog, DeclarationKind, Dependencies, EvalFn};
use crate::state::ExecutionState;
use crate::token::{TokenId, TokenRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// The validated dependency closure of one target.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    target: TokenRef,
    nodes: IndexMap<TokenId, GraphNode>,
}

impl ResolvedGraph {
    pub fn target(&self) -> &TokenRef {
        &self.target
    }

    pub fn node(&self, id: TokenId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, token: &TokenRef) -> bool {
        self.nodes.contains_key(&token.id())
    }

    /// Nodes with dependencies before dependents.
    pub fn topological_order(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn shape(&self) -> GraphShape {
        GraphShape::from_edges(
            self.nodes
                .values()
                .map(|node| (node.token().clone(), node.dependencies().to_vec())),
        )
    }

    /// Render the resolved graph as a flow chart, one line per call.
    pub fn render_flow_chart(&self, use_code_name: bool, sink: impl FnMut(&str)) {
        self.shape().render_flow_chart(use_code_name, sink);
    }
}

struct Resolver<'a> {
    catalog: &'a Catalog,
    state: &'a ExecutionState,
    marks: HashMap<TokenId, Mark>,
    nodes: IndexMap<TokenId, GraphNode>,
    problems: Vec<GraphProblem>,
}

/// A formula token whose dependencies are being walked.
struct Frame {
    token: TokenRef,
    eval: EvalFn,
    depends_on: Dependencies,
    next: usize,
}

impl Resolver<'_> {
    fn visit(&mut self, target: &TokenRef) {
        // The frames double as the current path for cycle reporting.
        let mut path: Vec<Frame> = Vec::new();
        if let Some(frame) = self.enter(target, &path) {
            path.push(frame);
        }
        while let Some(frame) = path.last_mut() {
            match frame.depends_on.get(frame.next).cloned() {
                Some(dependency) => {
                    frame.next += 1;
                    if let Some(frame) = self.enter(&dependency, &path) {
                        path.push(frame);
                    }
                }
                None => {
                    if let Some(frame) = path.pop() {
                        self.finish(&frame.token, NodeSource::Formula(frame.eval), frame.depends_on);
                    }
                }
            }
        }
    }

    /// Classify `token`. Returns a frame when it is a formula whose
    /// dependencies still need walking.
    fn enter(&mut self, token: &TokenRef, path: &[Frame]) -> Option<Frame> {
        match self.marks.get(&token.id()) {
            Some(Mark::Visited) => return None,
            Some(Mark::Visiting) => {
                let start = path
                    .iter()
                    .position(|frame| frame.token == *token)
                    .unwrap_or_default();
                self.problems.push(GraphProblem::Cycle(
                    path[start..].iter().map(|frame| frame.token.clone()).collect(),
                ));
                return None;
            }
            None => {}
        }

        if let Some(value) = self.state.value(token) {
            self.finish(token, NodeSource::Cached(value.clone()), Dependencies::new());
            return None;
        }

        let Some(declaration) = self.catalog.get(token) else {
            self.marks.insert(token.id(), Mark::Visited);
            self.problems
                .push(GraphProblem::MissingDefinition(token.clone()));
            return None;
        };

        match declaration.kind() {
            DeclarationKind::Initial(value) => {
                self.finish(token, NodeSource::Initial(value.clone()), Dependencies::new());
                None
            }
            DeclarationKind::Formula { depends_on, eval } => {
                self.marks.insert(token.id(), Mark::Visiting);
                Some(Frame {
                    token: token.clone(),
                    eval: eval.clone(),
                    depends_on: depends_on.clone(),
                    next: 0,
                })
            }
        }
    }

    fn finish(&mut self, token: &TokenRef, source: NodeSource, dependencies: Dependencies) {
        self.marks.insert(token.id(), Mark::Visited);
        self.nodes
            .insert(token.id(), GraphNode::new(token.clone(), source, dependencies));
    }
}

/// Resolve and validate the dependency closure of `target`.
///
/// This is a read-only analysis: nothing is evaluated.
pub fn resolve(
    target: &TokenRef,
    catalog: &Catalog,
    state: &ExecutionState,
) -> Result<ResolvedGraph, GraphDefinitionError> {
    let mut resolver = Resolver {
        catalog,
        state,
        marks: HashMap::new(),
        nodes: IndexMap::new(),
        problems: Vec::new(),
    };
    resolver.visit(target);

    if !resolver.problems.is_empty() {
        return Err(GraphDefinitionError {
            target: target.clone(),
            problems: resolver.problems,
        });
    }

    let mut nodes = resolver.nodes;
    let edges: Vec<(TokenId, TokenId)> = nodes
        .values()
        .flat_map(|node| {
            let dependent = node.token().id();
            node.dependencies()
                .iter()
                .map(move |dependency| (dependency.id(), dependent))
        })
        .collect();
    for (dependency, dependent) in edges {
        if let Some(node) = nodes.get_mut(&dependency) {
            node.add_dependent(dependent);
        }
    }

    Ok(ResolvedGraph {
        target: target.clone(),
        nodes,
    })
}
