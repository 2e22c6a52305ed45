//! Static flow-chart rendering.
//!
//! A `GraphShape` is the serializable node and edge list of a graph. It is
//! rendered as a Mermaid flow chart, one line per sink call, so callers can
//! send the output to stdout, a file or a log.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::token::{TokenId, TokenMeta, TokenRef};

/// A directed edge from a dependency to the node that reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeEdge {
    pub from: usize,
    pub to: usize,
}

/// Node and edge list of a dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphShape {
    pub nodes: Vec<TokenMeta>,
    pub edges: Vec<ShapeEdge>,
}

impl GraphShape {
    /// Build a shape from `(outlet, dependencies)` pairs.
    ///
    /// Positions are assigned in first-seen order with dependencies placed
    /// before the outlet that reads them.
    pub fn from_edges(entries: impl IntoIterator<Item = (TokenRef, Vec<TokenRef>)>) -> Self {
        let mut positions: IndexMap<TokenId, TokenMeta> = IndexMap::new();
        let mut edges = Vec::new();

        for (outlet, dependencies) in entries {
            let sources: Vec<usize> = dependencies
                .iter()
                .map(|dependency| position(&mut positions, dependency))
                .collect();
            let to = position(&mut positions, &outlet);
            for from in sources {
                let edge = ShapeEdge { from, to };
                if !edges.contains(&edge) {
                    edges.push(edge);
                }
            }
        }

        Self {
            nodes: positions.into_values().collect(),
            edges,
        }
    }

    /// Render as a Mermaid flow chart.
    ///
    /// Nodes are labelled by code name, or by their position (`#0`, `#1`,
    /// ...) when `use_code_name` is false.
    pub fn render_flow_chart(&self, use_code_name: bool, mut sink: impl FnMut(&str)) {
        sink("graph LR");
        for (position, meta) in self.nodes.iter().enumerate() {
            let label = if use_code_name {
                meta.code_name.replace('"', "#quot;")
            } else {
                format!("#{position}")
            };
            sink(&format!("    n{position}[\"{label}\"]"));
        }
        for edge in &self.edges {
            sink(&format!("    n{} --> n{}", edge.from, edge.to));
        }
    }
}

fn position(positions: &mut IndexMap<TokenId, TokenMeta>, token: &TokenRef) -> usize {
    let entry = positions.entry(token.id());
    let index = entry.index();
    entry.or_insert_with(|| token.meta().clone());
    index
}
