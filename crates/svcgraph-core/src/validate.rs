//! Full-graph invariant validation.
//!
//! [`validate_graph`] scans a complete composition graph and reports ALL
//! invariant violations at once: broken name indexing, adjacency asymmetry,
//! parallel or empty edges, cycles, uncovered inputs and dangling nodes.
//!
//! The pass is pure and never runs implicitly on the construction hot path.
//! A non-empty result indicates a bug in whatever produced the graph.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::graph::CompositionGraph;

/// An invariant violation detected by [`validate_graph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum InvariantViolation {
    /// An arena node is not reachable through the name index under its name.
    #[error("name index does not resolve '{name}' to its node")]
    NameIndexMismatch { name: String },

    /// An edge is missing from, or repeated in, one of its endpoints'
    /// adjacency lists.
    #[error("edge {from} -> {to} appears {outgoing} time(s) in outgoing and {incoming} time(s) in incoming adjacency")]
    AdjacencyMismatch {
        from: String,
        to: String,
        outgoing: usize,
        incoming: usize,
    },

    /// More than one edge links the same ordered pair of nodes.
    #[error("parallel edges between {from} and {to}")]
    ParallelEdges { from: String, to: String },

    /// An edge certifies no labels.
    #[error("edge {from} -> {to} has an empty intersect set")]
    EmptyIntersect { from: String, to: String },

    /// An edge certifies a label its target does not require.
    #[error("edge {from} -> {to} carries '{label}', which is not an input of {to}")]
    ForeignLabel {
        from: String,
        to: String,
        label: String,
    },

    /// The graph contains a directed cycle through this node.
    #[error("cycle through node {node}")]
    Cycle { node: String },

    /// An input label of a placed node is not covered by any incoming edge.
    #[error("input '{label}' of {node} is not covered by any incoming edge")]
    UncoveredInput { node: String, label: String },

    /// A node other than `start` has no path to `end`.
    #[error("dangling node {node} has no path to end")]
    Dangling { node: String },

    /// The graph has no `start` or no `end` pseudo-node.
    #[error("missing {terminal} node")]
    MissingTerminal { terminal: String },
}

/// Validates every invariant of a complete composition graph.
///
/// Returns an empty `Vec` if the graph is valid.
pub fn validate_graph(graph: &CompositionGraph) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let arena = graph.arena();
    let name_of = |idx: NodeIndex<u32>| {
        arena
            .node_weight(idx)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| format!("#{}", idx.index()))
    };

    // Name index
    for idx in arena.node_indices() {
        let node = &arena[idx];
        if graph.node_id(&node.name).map(NodeIndex::<u32>::from) != Some(idx) {
            violations.push(InvariantViolation::NameIndexMismatch {
                name: node.name.clone(),
            });
        }
    }

    // Edges: adjacency symmetry, parallel edges, intersect sets
    let mut pairs: HashMap<(NodeIndex<u32>, NodeIndex<u32>), usize> = HashMap::new();
    for edge_idx in arena.edge_indices() {
        let Some((from, to)) = arena.edge_endpoints(edge_idx) else {
            continue;
        };
        let outgoing = arena
            .edges_directed(from, Direction::Outgoing)
            .filter(|e| e.id() == edge_idx)
            .count();
        let incoming = arena
            .edges_directed(to, Direction::Incoming)
            .filter(|e| e.id() == edge_idx)
            .count();
        if outgoing != 1 || incoming != 1 {
            violations.push(InvariantViolation::AdjacencyMismatch {
                from: name_of(from),
                to: name_of(to),
                outgoing,
                incoming,
            });
        }

        *pairs.entry((from, to)).or_default() += 1;

        let intersect = &arena[edge_idx].intersect;
        if intersect.is_empty() {
            violations.push(InvariantViolation::EmptyIntersect {
                from: name_of(from),
                to: name_of(to),
            });
        }
        for label in intersect {
            if !arena[to].inputs.contains(label) {
                violations.push(InvariantViolation::ForeignLabel {
                    from: name_of(from),
                    to: name_of(to),
                    label: label.clone(),
                });
            }
        }
    }
    let mut parallel: Vec<_> = pairs.into_iter().filter(|(_, n)| *n > 1).collect();
    parallel.sort_by_key(|((from, to), _)| (*from, *to));
    for ((from, to), _) in parallel {
        violations.push(InvariantViolation::ParallelEdges {
            from: name_of(from),
            to: name_of(to),
        });
    }

    // Acyclicity
    if let Err(cycle) = toposort(arena, None) {
        violations.push(InvariantViolation::Cycle {
            node: name_of(cycle.node_id()),
        });
    }

    // Contract closure
    for (id, node) in graph.nodes() {
        let covered: HashSet<&String> = graph
            .incoming(id)
            .into_iter()
            .flat_map(|view| view.edge.intersect.iter())
            .collect();
        for label in &node.inputs {
            if !covered.contains(label) {
                violations.push(InvariantViolation::UncoveredInput {
                    node: node.name.clone(),
                    label: label.clone(),
                });
            }
        }
    }

    // Terminals and dangling nodes
    if graph.start().is_none() {
        violations.push(InvariantViolation::MissingTerminal {
            terminal: "start".into(),
        });
    }
    match graph.end() {
        Some(end) => {
            let reaching = graph.ancestors_of(end);
            for (id, node) in graph.nodes() {
                if Some(id) != graph.start() && !reaching.contains(&id) {
                    violations.push(InvariantViolation::Dangling {
                        node: node.name.clone(),
                    });
                }
            }
        }
        None => violations.push(InvariantViolation::MissingTerminal {
            terminal: "end".into(),
        }),
    }

    violations
}
