//! CompositionGraph: one candidate solution wiring services from a start
//! contract to an end contract.
//!
//! [`CompositionGraph`] owns an arena of [`ServiceNode`]s and
//! [`CompositionEdge`]s (a petgraph `StableGraph`), a name index over the
//! placed nodes, the *considerable* node and edge subsets used by fitness
//! evaluation, the per-graph [`Weights`] and the `unused` working set of
//! relevant services not yet placed.
//!
//! # Invariants
//!
//! - Node names are unique within a graph.
//! - At most one edge links any ordered pair of nodes; further labels between
//!   the same pair are merged into the existing edge's intersect set.
//! - Adjacency is derived from the arena, so an edge is always present in
//!   exactly its source's outgoing and its target's incoming lists.
//!
//! Acyclicity, contract closure and the absence of dangling nodes are
//! properties of how the graph is grown; [`crate::validate`] checks them.
//!
//! All fields are private. Mutations go through `CompositionGraph` methods
//! to keep the name index, the considerable subsets and the arena in step.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::{IndexMap, IndexSet};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{Bfs, EdgeRef, Reversed};
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::edge::CompositionEdge;
use crate::error::CoreError;
use crate::id::{EdgeId, NodeId, ServiceId};
use crate::node::{LabelSet, NodeKind, ServiceNode};
use crate::weights::Weights;

/// A view of one edge with its endpoints.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub edge: &'a CompositionEdge,
}

/// A composition graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionGraph {
    arena: StableGraph<ServiceNode, CompositionEdge, Directed, u32>,
    /// Name index over placed nodes, in placement order.
    nodes: IndexMap<String, NodeId>,
    considerable_nodes: IndexSet<NodeId>,
    considerable_edges: IndexSet<EdgeId>,
    start: Option<NodeId>,
    end: Option<NodeId>,
    weights: Weights,
    unused: IndexSet<ServiceId>,
}

impl CompositionGraph {
    /// Creates an empty graph carrying `weights` and the `unused` working set.
    pub fn new(weights: Weights, unused: IndexSet<ServiceId>) -> Self {
        CompositionGraph {
            arena: StableGraph::new(),
            nodes: IndexMap::new(),
            considerable_nodes: IndexSet::new(),
            considerable_edges: IndexSet::new(),
            start: None,
            end: None,
            weights,
            unused,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// Returns a read-only reference to the node/edge arena.
    pub fn arena(&self) -> &StableGraph<ServiceNode, CompositionEdge, Directed, u32> {
        &self.arena
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Relevant services not placed in this graph.
    pub fn unused(&self) -> &IndexSet<ServiceId> {
        &self.unused
    }

    pub fn considerable_nodes(&self) -> &IndexSet<NodeId> {
        &self.considerable_nodes
    }

    pub fn considerable_edges(&self) -> &IndexSet<EdgeId> {
        &self.considerable_edges
    }

    pub fn start(&self) -> Option<NodeId> {
        self.start
    }

    pub fn end(&self) -> Option<NodeId> {
        self.end
    }

    pub fn node(&self, id: NodeId) -> Option<&ServiceNode> {
        self.arena.node_weight(id.into())
    }

    /// Looks up a placed node by name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.get(name).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Placed node IDs in placement order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.values().copied()
    }

    /// Placed nodes in placement order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &ServiceNode)> + '_ {
        self.nodes
            .values()
            .filter_map(|&id| self.node(id).map(|node| (id, node)))
    }

    /// Non-terminal nodes in placement order.
    pub fn service_nodes(&self) -> impl Iterator<Item = (NodeId, &ServiceNode)> + '_ {
        self.nodes().filter(|(_, node)| !node.is_terminal())
    }

    pub fn node_count(&self) -> usize {
        self.arena.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.arena.edge_count()
    }

    pub fn edge(&self, id: EdgeId) -> Option<EdgeView<'_>> {
        let idx: EdgeIndex<u32> = id.into();
        let (from, to) = self.arena.edge_endpoints(idx)?;
        Some(EdgeView {
            id,
            from: from.into(),
            to: to.into(),
            edge: &self.arena[idx],
        })
    }

    /// All edges in arena order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        self.arena
            .edge_indices()
            .filter_map(|idx| self.edge(EdgeId::from(idx)))
    }

    /// Edges ending at `id`.
    pub fn incoming(&self, id: NodeId) -> Vec<EdgeView<'_>> {
        self.directed(id, Direction::Incoming)
    }

    /// Edges leaving `id`.
    pub fn outgoing(&self, id: NodeId) -> Vec<EdgeView<'_>> {
        self.directed(id, Direction::Outgoing)
    }

    fn directed(&self, id: NodeId, direction: Direction) -> Vec<EdgeView<'_>> {
        let idx: NodeIndex<u32> = id.into();
        if self.arena.node_weight(idx).is_none() {
            return Vec::new();
        }
        self.arena
            .edges_directed(idx, direction)
            .map(|e| EdgeView {
                id: e.id().into(),
                from: e.source().into(),
                to: e.target().into(),
                edge: e.weight(),
            })
            .collect()
    }

    /// Returns the edge linking `from` to `to`, if any.
    pub fn find_edge(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        self.arena
            .find_edge(from.into(), to.into())
            .map(EdgeId::from)
    }

    /// Whether a directed path leads from `from` to `to`. A node reaches
    /// itself.
    pub fn has_path(&self, from: NodeId, to: NodeId) -> bool {
        has_path_connecting(&self.arena, from.into(), to.into(), None)
    }

    /// Every node with a directed path to `target`, `target` included.
    pub fn ancestors_of(&self, target: NodeId) -> HashSet<NodeId> {
        let mut found = HashSet::new();
        if self.node(target).is_none() {
            return found;
        }
        let reversed = Reversed(&self.arena);
        let mut bfs = Bfs::new(reversed, target.into());
        while let Some(idx) = bfs.next(reversed) {
            found.insert(NodeId::from(idx));
        }
        found
    }

    /// Whether adding an edge `from -> to` would close a cycle.
    pub fn would_cycle(&self, from: NodeId, to: NodeId) -> bool {
        self.has_path(to, from)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Places `node` in the graph together with its incoming edges.
    ///
    /// This is the connect-step shared by construction from the taxonomy,
    /// construction from a reference graph and mutation splicing: the node
    /// enters both node sets, each `(predecessor, labels)` pair becomes (or is
    /// merged into) an edge present in both edge sets, and the node's service
    /// leaves the `unused` working set.
    pub fn connect(
        &mut self,
        node: ServiceNode,
        incoming: Vec<(NodeId, LabelSet)>,
    ) -> Result<NodeId, CoreError> {
        if self.nodes.contains_key(&node.name) {
            return Err(CoreError::DuplicateNode { name: node.name });
        }
        for (from, labels) in &incoming {
            if self.node(*from).is_none() {
                return Err(CoreError::NodeNotFound { id: *from });
            }
            if labels.is_empty() {
                return Err(CoreError::InvalidEdge {
                    reason: format!("empty intersect into '{}'", node.name),
                });
            }
        }

        let name = node.name.clone();
        let kind = node.kind;
        let id = NodeId::from(self.arena.add_node(node));
        self.nodes.insert(name, id);
        self.considerable_nodes.insert(id);
        match kind {
            NodeKind::Start => self.start = Some(id),
            NodeKind::End => self.end = Some(id),
            NodeKind::Service(service) => {
                self.unused.shift_remove(&service);
            }
        }

        for (from, labels) in incoming {
            self.link(from, id, labels)?;
        }

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(id)
    }

    /// Adds an edge `from -> to` carrying `labels`, merging into an existing
    /// edge between the same pair.
    pub fn link(&mut self, from: NodeId, to: NodeId, labels: LabelSet) -> Result<EdgeId, CoreError> {
        if from == to {
            return Err(CoreError::InvalidEdge {
                reason: format!("self-loop on {}", from),
            });
        }
        if self.node(from).is_none() {
            return Err(CoreError::NodeNotFound { id: from });
        }
        if self.node(to).is_none() {
            return Err(CoreError::NodeNotFound { id: to });
        }
        if labels.is_empty() {
            return Err(CoreError::InvalidEdge {
                reason: format!("empty intersect on {} -> {}", from, to),
            });
        }

        if let Some(existing) = self.arena.find_edge(from.into(), to.into()) {
            self.arena[existing].merge(&labels);
            return Ok(existing.into());
        }
        let idx = self
            .arena
            .add_edge(from.into(), to.into(), CompositionEdge::new(labels));
        let id = EdgeId::from(idx);
        self.considerable_edges.insert(id);
        Ok(id)
    }

    /// Removes a node and every edge touching it.
    ///
    /// A removed service returns to the `unused` working set.
    pub fn remove_node(&mut self, id: NodeId) -> Result<ServiceNode, CoreError> {
        let idx: NodeIndex<u32> = id.into();
        if self.arena.node_weight(idx).is_none() {
            return Err(CoreError::NodeNotFound { id });
        }

        let touching: Vec<EdgeId> = self
            .arena
            .edges_directed(idx, Direction::Incoming)
            .chain(self.arena.edges_directed(idx, Direction::Outgoing))
            .map(|e| EdgeId::from(e.id()))
            .collect();
        for edge in touching {
            self.considerable_edges.shift_remove(&edge);
        }

        let node = self
            .arena
            .remove_node(idx)
            .ok_or(CoreError::NodeNotFound { id })?;
        self.nodes.shift_remove(&node.name);
        self.considerable_nodes.shift_remove(&id);
        match node.kind {
            NodeKind::Start => self.start = None,
            NodeKind::End => self.end = None,
            NodeKind::Service(service) => {
                self.unused.insert(service);
            }
        }

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(node)
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Deterministic edge-list rendering, `from->to{label,...}` separated by
    /// spaces and sorted by endpoint names.
    ///
    /// Used for equality, hashing and debugging; not a wire format.
    pub fn edge_list(&self) -> String {
        let mut rendered: Vec<(String, String, String)> = self
            .edges()
            .filter_map(|view| {
                let from = self.node(view.from)?;
                let to = self.node(view.to)?;
                let labels: Vec<&str> = view.edge.intersect.iter().map(String::as_str).collect();
                Some((from.name.clone(), to.name.clone(), labels.join(",")))
            })
            .collect();
        rendered.sort();
        rendered
            .iter()
            .map(|(from, to, labels)| format!("{}->{}{{{}}}", from, to, labels))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// blake3 digest of the sorted node names and the edge-list rendering.
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        for name in self.sorted_names() {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(self.edge_list().as_bytes());
        hasher.finalize()
    }

    fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    // -----------------------------------------------------------------------
    // Debug consistency assertion
    // -----------------------------------------------------------------------

    /// Verifies that the name index, the considerable subsets and the arena
    /// agree.
    ///
    /// Only called in debug builds (via `cfg(debug_assertions)`).
    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        assert_eq!(
            self.nodes.len(),
            self.arena.node_count(),
            "name index and arena disagree on node count"
        );
        for (name, &id) in &self.nodes {
            let node = self
                .node(id)
                .unwrap_or_else(|| panic!("name '{}' maps to missing {}", name, id));
            assert_eq!(&node.name, name, "name index points at a renamed node");
        }
        for &id in &self.considerable_nodes {
            assert!(self.node(id).is_some(), "considerable node {} is missing", id);
        }
        for &id in &self.considerable_edges {
            assert!(
                self.arena.edge_weight(id.into()).is_some(),
                "considerable edge {} is missing",
                id
            );
        }
    }
}

impl PartialEq for CompositionGraph {
    fn eq(&self, other: &Self) -> bool {
        self.sorted_names() == other.sorted_names() && self.edge_list() == other.edge_list()
    }
}

impl Eq for CompositionGraph {}

impl Hash for CompositionGraph {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sorted_names().hash(state);
        self.edge_list().hash(state);
    }
}

impl fmt::Display for CompositionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.edge_list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Qos;

    fn labels(items: &[&str]) -> LabelSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn svc(id: u32, name: &str, inputs: &[&str], outputs: &[&str]) -> ServiceNode {
        ServiceNode::service(
            ServiceId(id),
            name,
            inputs.iter().copied(),
            outputs.iter().copied(),
            Qos::default(),
        )
    }

    fn empty_graph() -> CompositionGraph {
        let unused: IndexSet<ServiceId> = [ServiceId(0), ServiceId(1)].into_iter().collect();
        CompositionGraph::new(Weights::from_vec(vec![0.3, 0.7]), unused)
    }

    /// start -> s0 -> end
    fn chain() -> (CompositionGraph, NodeId, NodeId, NodeId) {
        let mut graph = empty_graph();
        let start = graph.connect(ServiceNode::start(["a"]), vec![]).unwrap();
        let s0 = graph
            .connect(svc(0, "s0", &["a"], &["b"]), vec![(start, labels(&["a"]))])
            .unwrap();
        let end = graph
            .connect(ServiceNode::end(["b"]), vec![(s0, labels(&["b"]))])
            .unwrap();
        (graph, start, s0, end)
    }

    #[test]
    fn connect_registers_everywhere() {
        let (graph, start, s0, end) = chain();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.start(), Some(start));
        assert_eq!(graph.end(), Some(end));
        assert_eq!(graph.node_id("s0"), Some(s0));
        assert_eq!(graph.considerable_nodes().len(), 3);
        assert_eq!(graph.considerable_edges().len(), 2);
        assert!(!graph.unused().contains(&ServiceId(0)));
        assert!(graph.unused().contains(&ServiceId(1)));

        let incoming = graph.incoming(s0);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from, start);
        assert_eq!(incoming[0].edge.intersect, labels(&["a"]));
        assert_eq!(graph.outgoing(s0)[0].to, end);
    }

    #[test]
    fn duplicate_name_rejected() {
        let (mut graph, start, _, _) = chain();
        let result = graph.connect(svc(0, "s0", &["a"], &["b"]), vec![(start, labels(&["a"]))]);
        assert_eq!(
            result.unwrap_err(),
            CoreError::DuplicateNode { name: "s0".into() }
        );
    }

    #[test]
    fn link_merges_parallel_labels() {
        let (mut graph, start, s0, _) = chain();
        let first = graph.find_edge(start, s0).unwrap();
        let merged = graph.link(start, s0, labels(&["x"])).unwrap();

        assert_eq!(first, merged);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edge(merged).unwrap().edge.intersect, labels(&["a", "x"]));
    }

    #[test]
    fn link_rejects_self_loop_and_empty_labels() {
        let (mut graph, _, s0, end) = chain();
        assert!(matches!(
            graph.link(s0, s0, labels(&["b"])),
            Err(CoreError::InvalidEdge { .. })
        ));
        assert!(matches!(
            graph.link(s0, end, LabelSet::new()),
            Err(CoreError::InvalidEdge { .. })
        ));
    }

    #[test]
    fn remove_node_drops_edges_and_restores_unused() {
        let (mut graph, _, s0, _) = chain();
        let removed = graph.remove_node(s0).unwrap();

        assert_eq!(removed.name, "s0");
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.considerable_edges().is_empty());
        assert!(!graph.contains_name("s0"));
        assert!(graph.unused().contains(&ServiceId(0)));
        assert!(matches!(
            graph.remove_node(s0),
            Err(CoreError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn removing_end_clears_handle() {
        let (mut graph, _, _, end) = chain();
        graph.remove_node(end).unwrap();
        assert_eq!(graph.end(), None);
    }

    #[test]
    fn path_queries() {
        let (graph, start, s0, end) = chain();
        assert!(graph.has_path(start, end));
        assert!(!graph.has_path(end, start));
        assert!(graph.would_cycle(end, s0));
        assert!(!graph.would_cycle(start, end));
    }

    #[test]
    fn ancestors_walk_backwards() {
        let (mut graph, start, s0, end) = chain();
        let stray = graph
            .connect(svc(1, "s1", &["a"], &["c"]), vec![(start, labels(&["a"]))])
            .unwrap();

        let reaching = graph.ancestors_of(end);
        assert!(reaching.contains(&start));
        assert!(reaching.contains(&s0));
        assert!(reaching.contains(&end));
        assert!(!reaching.contains(&stray));
    }

    #[test]
    fn edge_list_is_sorted_and_stable() {
        let (graph, _, _, _) = chain();
        assert_eq!(graph.edge_list(), "s0->end{b} start->s0{a}");
        assert_eq!(graph.to_string(), graph.edge_list());
    }

    #[test]
    fn equality_ignores_arena_layout() {
        let (a, _, _, _) = chain();

        // Same structure built in a different arena order.
        let mut b = empty_graph();
        let s0 = b.connect(svc(0, "s0", &["a"], &["b"]), vec![]).unwrap();
        let start = b.connect(ServiceNode::start(["a"]), vec![]).unwrap();
        b.link(start, s0, labels(&["a"])).unwrap();
        b.connect(ServiceNode::end(["b"]), vec![(s0, labels(&["b"]))])
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn equal_graphs_deduplicate_in_sets() {
        let (a, _, s0, _) = chain();
        let b = a.clone();
        let mut c = a.clone();
        c.remove_node(s0).unwrap();

        let distinct: HashSet<CompositionGraph> = [a, b, c].into_iter().collect();
        assert_eq!(distinct.len(), 2);
    }

    #[test]
    fn clone_does_not_share_nodes() {
        let (original, _, s0, _) = chain();
        let mut copy = original.clone();
        copy.remove_node(s0).unwrap();
        assert!(original.contains_name("s0"));
        assert_ne!(original, copy);
    }

    #[test]
    fn serde_roundtrip() {
        let (graph, _, _, _) = chain();
        let json = serde_json::to_string(&graph).unwrap();
        let back: CompositionGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);
        assert_eq!(back.weights(), graph.weights());
    }
}
