//! Local mutation: excise a connected region and grow a replacement.
//!
//! A mutation picks a service node, collects up to `k` nodes reachable from it
//! along outgoing edges, cuts them out and records the boundary they leave
//! behind:
//!
//! - `task_input`: labels the surviving suppliers used to feed the region.
//! - `task_output`: labels the surviving consumers used to receive from it.
//!
//! That boundary becomes a local start/end contract for [`construct`], and the
//! resulting subgraph is spliced back in and wired to the frontier. The whole
//! operation runs on a copy of the graph; the caller's graph is replaced only
//! when every step, including the final validation, succeeds.

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;

use indexmap::{IndexMap, IndexSet};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use svcgraph_core::{
    validate_graph, CompositionGraph, LabelSet, NodeId, ServiceId, ServiceNode, Taxonomy,
    Weights,
};

use crate::construct::{construct, CandidateSource};
use crate::error::MutationError;
use crate::prune::prune;

/// What a successful mutation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationReport {
    pub root: String,
    /// Excised nodes in discovery order.
    pub region: Vec<String>,
    pub task_input: LabelSet,
    pub task_output: LabelSet,
    /// Replacement nodes in placement order.
    pub inserted: Vec<String>,
    pub pruned: Vec<String>,
}

/// Mutates `graph` around a uniformly chosen service node.
///
/// The replacement region is built with fresh weights drawn from `rng`. On
/// error `graph` is unchanged.
pub fn mutate<T, R>(
    graph: &mut CompositionGraph,
    size: NonZeroUsize,
    taxonomy: &T,
    relevant: &IndexSet<ServiceId>,
    rng: &mut R,
) -> Result<MutationReport, MutationError>
where
    T: Taxonomy + ?Sized,
    R: Rng + ?Sized,
{
    let services: Vec<NodeId> = graph.service_nodes().map(|(id, _)| id).collect();
    if services.is_empty() {
        warn!("mutation skipped: no service nodes");
        return Err(MutationError::NothingToMutate);
    }
    let root = services[rng.gen_range(0..services.len())];
    let weights = Weights::random(taxonomy.service_count(), rng);
    mutate_at(graph, root, size, taxonomy, relevant, weights)
}

/// Mutates `graph` around `root`, growing the replacement with `weights`.
///
/// Deterministic counterpart of [`mutate`]. On error `graph` is unchanged.
pub fn mutate_at<T>(
    graph: &mut CompositionGraph,
    root: NodeId,
    size: NonZeroUsize,
    taxonomy: &T,
    relevant: &IndexSet<ServiceId>,
    weights: Weights,
) -> Result<MutationReport, MutationError>
where
    T: Taxonomy + ?Sized,
{
    let mut working = graph.clone();
    match Splice::run(&mut working, root, size, taxonomy, relevant, weights) {
        Ok(report) => {
            debug!(
                root = %report.root,
                removed = report.region.len(),
                inserted = report.inserted.len(),
                "mutation committed"
            );
            *graph = working;
            Ok(report)
        }
        Err(err) => {
            warn!(error = %err, "mutation aborted, graph left unchanged");
            Err(err)
        }
    }
}

/// Up to `size` nodes reachable from `root`, breadth first with successors
/// visited in name order. Stops as soon as the walk meets `end`.
fn discover_region(graph: &CompositionGraph, root: NodeId, size: NonZeroUsize) -> Vec<NodeId> {
    let end = graph.end();
    let mut region = vec![root];
    let mut seen: HashSet<NodeId> = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);

    'walk: while let Some(current) = queue.pop_front() {
        let mut next: Vec<(&str, NodeId)> = graph
            .outgoing(current)
            .into_iter()
            .filter_map(|view| graph.node(view.to).map(|node| (node.name.as_str(), view.to)))
            .collect();
        next.sort();
        for (_, id) in next {
            if Some(id) == end || region.len() >= size.get() {
                break 'walk;
            }
            if seen.insert(id) {
                region.push(id);
                queue.push_back(id);
            }
        }
    }
    region
}

/// State of one mutation on the working copy.
struct Splice<'a, T: ?Sized> {
    graph: &'a mut CompositionGraph,
    taxonomy: &'a T,
    /// Surviving nodes that fed the region, by name.
    suppliers: IndexSet<String>,
    /// Surviving nodes that consumed from the region, with the labels lost.
    consumers: IndexMap<String, LabelSet>,
    /// Outgoing edges of evicted nodes as `(from, to, labels)` by name.
    carried: Vec<(String, String, LabelSet)>,
}

impl<'a, T> Splice<'a, T>
where
    T: Taxonomy + ?Sized,
{
    fn run(
        graph: &'a mut CompositionGraph,
        root: NodeId,
        size: NonZeroUsize,
        taxonomy: &'a T,
        relevant: &IndexSet<ServiceId>,
        weights: Weights,
    ) -> Result<MutationReport, MutationError> {
        let root_name = match graph.node(root) {
            Some(node) if !node.is_terminal() => node.name.clone(),
            _ => return Err(MutationError::NothingToMutate),
        };

        let mut splice = Splice {
            graph,
            taxonomy,
            suppliers: IndexSet::new(),
            consumers: IndexMap::new(),
            carried: Vec::new(),
        };

        let region = discover_region(splice.graph, root, size);
        let (region, task_input, task_output) = splice.excise(&region)?;
        debug!(root = %root_name, region = ?region, ?task_input, ?task_output, "excised region");

        let local_start = ServiceNode::start(task_input.iter().cloned());
        let local_end = ServiceNode::end(task_output.iter().cloned());
        let replacement = construct(
            &local_start,
            &local_end,
            taxonomy,
            CandidateSource::Taxonomy { relevant },
            weights,
        )?;
        debug!(replacement = %replacement, "built replacement region");

        let (inserted, first_layer, last_layer) = splice.insert(&replacement)?;
        splice.attach_first_layer(first_layer)?;
        splice.restore_carried(&inserted)?;
        splice.attach_last_layer(&last_layer, &inserted)?;

        let pruned = prune(splice.graph);
        let violations = validate_graph(splice.graph);
        if !violations.is_empty() {
            return Err(MutationError::InvariantViolated(violations));
        }

        Ok(MutationReport {
            root: root_name,
            region,
            task_input,
            task_output,
            inserted,
            pruned,
        })
    }

    /// Removes the region and records the boundary it leaves. Returns the
    /// region names with the local input and output contracts.
    fn excise(
        &mut self,
        region: &[NodeId],
    ) -> Result<(Vec<String>, LabelSet, LabelSet), MutationError> {
        let inside: HashSet<NodeId> = region.iter().copied().collect();
        let mut boundary: Vec<(String, String, LabelSet, bool)> = Vec::new();
        for &id in region {
            let views = self.graph.incoming(id).into_iter().chain(self.graph.outgoing(id));
            for view in views {
                let from_inside = inside.contains(&view.from);
                if from_inside == inside.contains(&view.to) {
                    continue;
                }
                let (Some(from), Some(to)) = (self.graph.node(view.from), self.graph.node(view.to))
                else {
                    continue;
                };
                boundary.push((
                    from.name.clone(),
                    to.name.clone(),
                    view.edge.intersect.clone(),
                    from_inside,
                ));
            }
        }
        boundary.sort();

        let mut task_input = LabelSet::new();
        let mut task_output = LabelSet::new();
        for (from, to, labels, from_inside) in boundary {
            if from_inside {
                task_output.extend(labels.iter().cloned());
                self.consumers.entry(to).or_default().extend(labels);
            } else {
                task_input.extend(labels);
                self.suppliers.insert(from);
            }
        }

        let mut names = Vec::with_capacity(region.len());
        for &id in region {
            names.push(self.graph.remove_node(id)?.name);
        }
        Ok((names, task_input, task_output))
    }

    /// Copies the replacement's service nodes and internal edges into the
    /// graph. Returns the inserted names, the first layer with the labels each
    /// node expects from the frontier, and the last layer.
    #[allow(clippy::type_complexity)]
    fn insert(
        &mut self,
        replacement: &CompositionGraph,
    ) -> Result<(Vec<String>, Vec<(NodeId, LabelSet)>, Vec<NodeId>), MutationError> {
        self.carried = self.evict_collisions(replacement)?;

        let mut mapped: HashMap<NodeId, NodeId> = HashMap::new();
        let mut inserted = Vec::new();
        for (local, node) in replacement.service_nodes() {
            let id = self.graph.connect(node.clone(), Vec::new())?;
            mapped.insert(local, id);
            inserted.push(node.name.clone());
        }

        for view in replacement.edges() {
            if let (Some(&from), Some(&to)) = (mapped.get(&view.from), mapped.get(&view.to)) {
                self.graph.link(from, to, view.edge.intersect.clone())?;
            }
        }

        let local_start = replacement.start();
        let local_end = replacement.end();
        let mut first_layer = Vec::new();
        let mut last_layer = Vec::new();
        for (local, _) in replacement.service_nodes() {
            let Some(&id) = mapped.get(&local) else {
                continue;
            };
            if let Some(edge) = local_start
                .and_then(|start| replacement.find_edge(start, local))
                .and_then(|edge| replacement.edge(edge))
            {
                first_layer.push((id, edge.edge.intersect.clone()));
            }
            if local_end
                .and_then(|end| replacement.find_edge(local, end))
                .is_some()
            {
                last_layer.push(id);
            }
        }

        debug!(inserted = ?inserted, "spliced replacement region");
        Ok((inserted, first_layer, last_layer))
    }

    /// Removes surviving nodes whose names the replacement reuses, returning
    /// their outgoing edges as `(from, to, labels)` by name.
    fn evict_collisions(
        &mut self,
        replacement: &CompositionGraph,
    ) -> Result<Vec<(String, String, LabelSet)>, MutationError> {
        let mut carried = Vec::new();
        for (_, node) in replacement.service_nodes() {
            let Some(existing) = self.graph.node_id(&node.name) else {
                continue;
            };
            for view in self.graph.outgoing(existing) {
                if let Some(target) = self.graph.node(view.to) {
                    carried.push((
                        node.name.clone(),
                        target.name.clone(),
                        view.edge.intersect.clone(),
                    ));
                }
            }
            self.graph.remove_node(existing)?;
            debug!(node = %node.name, "evicted colliding node");
        }
        Ok(carried)
    }

    /// Re-adds carried edges from the new instances to surviving targets once
    /// the first layer is wired. Edges that would close a cycle become lost
    /// labels of their target.
    fn restore_carried(&mut self, inserted: &[String]) -> Result<(), MutationError> {
        for (from, to, labels) in std::mem::take(&mut self.carried) {
            if inserted.contains(&to) {
                continue;
            }
            let (Some(from_id), Some(to_id)) = (self.graph.node_id(&from), self.graph.node_id(&to))
            else {
                continue;
            };
            if self.graph.would_cycle(from_id, to_id) {
                debug!(from = %from, to = %to, ?labels, "carried edge would close a cycle");
                self.consumers.entry(to).or_default().extend(labels);
            } else {
                self.graph.link(from_id, to_id, labels)?;
            }
        }
        Ok(())
    }

    /// Feeds each first-layer node from the suppliers that fed the region.
    fn attach_first_layer(&mut self, layer: Vec<(NodeId, LabelSet)>) -> Result<(), MutationError> {
        for (node, labels) in layer {
            for label in &labels {
                let candidates: Vec<NodeId> = self
                    .suppliers
                    .iter()
                    .filter_map(|name| self.graph.node_id(name))
                    .collect();
                self.attach(&candidates, node, label)?;
            }
        }
        Ok(())
    }

    /// Gives every surviving consumer back the labels it lost, preferring the
    /// replacement's last layer over the original suppliers.
    fn attach_last_layer(&mut self, layer: &[NodeId], inserted: &[String]) -> Result<(), MutationError> {
        let consumers = std::mem::take(&mut self.consumers);
        for (consumer, lost) in consumers {
            if inserted.contains(&consumer) {
                continue;
            }
            let Some(target) = self.graph.node_id(&consumer) else {
                continue;
            };
            for label in &lost {
                let candidates: Vec<NodeId> = layer
                    .iter()
                    .copied()
                    .chain(self.suppliers.iter().filter_map(|name| self.graph.node_id(name)))
                    .collect();
                self.attach(&candidates, target, label)?;
            }
        }
        Ok(())
    }

    /// Links the first of `candidates` that satisfies `label` without closing
    /// a cycle.
    fn attach(&mut self, candidates: &[NodeId], target: NodeId, label: &str) -> Result<(), MutationError> {
        let provider = candidates.iter().copied().find(|&candidate| {
            candidate != target
                && self.graph.node(candidate).is_some_and(|node| {
                    node.outputs
                        .iter()
                        .any(|output| self.taxonomy.satisfies(output, label))
                })
                && !self.graph.would_cycle(candidate, target)
        });

        match provider {
            Some(provider) => {
                self.graph
                    .link(provider, target, LabelSet::from([label.to_string()]))?;
                Ok(())
            }
            None => {
                let node = self
                    .graph
                    .node(target)
                    .map(|node| node.name.clone())
                    .unwrap_or_default();
                Err(MutationError::UnmatchedFrontier {
                    node,
                    label: label.to_string(),
                })
            }
        }
    }
}
