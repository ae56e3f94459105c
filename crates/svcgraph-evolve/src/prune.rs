//! Removal of dangling nodes.

use tracing::debug;

use svcgraph_core::{CompositionGraph, NodeId};

/// Removes every node other than `start` that has no directed path to `end`,
/// together with its edges. Returns the removed names in placement order.
///
/// A graph without an `end` node is left alone. Running it twice removes
/// nothing the second time.
pub fn prune(graph: &mut CompositionGraph) -> Vec<String> {
    let Some(end) = graph.end() else {
        return Vec::new();
    };
    let reaching = graph.ancestors_of(end);
    let dangling: Vec<NodeId> = graph
        .node_ids()
        .filter(|id| Some(*id) != graph.start() && !reaching.contains(id))
        .collect();

    let mut removed = Vec::with_capacity(dangling.len());
    for id in dangling {
        if let Ok(node) = graph.remove_node(id) {
            removed.push(node.name);
        }
    }
    if !removed.is_empty() {
        debug!(removed = ?removed, "pruned dangling nodes");
    }
    removed
}
