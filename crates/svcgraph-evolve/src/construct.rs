//! Greedy layered construction of composition graphs.
//!
//! [`construct`] grows a graph from a start contract until every label of the
//! end contract is covered, then wires the `end` pseudo-node and prunes.
//! Each round places the highest-priority candidate whose inputs are all
//! satisfied by nodes already in the graph, so a node is only ever linked
//! after all of its predecessors: the result is acyclic by construction.
//!
//! Candidates come either from the taxonomy (consumers of newly produced
//! labels, filtered by a relevance set) or from a reference graph (the
//! successors a node has there), see [`CandidateSource`].
//!
//! Given the same contracts, taxonomy, source and weights, the result is
//! identical on every call.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use svcgraph_core::{
    CompositionGraph, CoreError, LabelSet, NodeId, ServiceId, ServiceNode, Taxonomy, Weights,
};

use crate::candidates::CandidateList;
use crate::error::ConstructionError;
use crate::prune::prune;

/// Where successor candidates are discovered.
#[derive(Debug, Clone, Copy)]
pub enum CandidateSource<'a> {
    /// Consumers of produced labels, restricted to the relevance set.
    Taxonomy { relevant: &'a IndexSet<ServiceId> },
    /// Successors of the same-named node in an existing graph.
    Reference(&'a CompositionGraph),
}

/// Builds a composition graph from `start` to `end`.
///
/// `weights` must hold one entry per catalog service; they become the new
/// graph's priority weights.
pub fn construct<T>(
    start: &ServiceNode,
    end: &ServiceNode,
    taxonomy: &T,
    source: CandidateSource<'_>,
    weights: Weights,
) -> Result<CompositionGraph, ConstructionError>
where
    T: Taxonomy + ?Sized,
{
    if weights.len() != taxonomy.service_count() {
        return Err(CoreError::WeightsMismatch {
            expected: taxonomy.service_count(),
            actual: weights.len(),
        }
        .into());
    }

    let unused = match source {
        CandidateSource::Taxonomy { relevant } => relevant.clone(),
        CandidateSource::Reference(reference) => reference
            .unused()
            .iter()
            .copied()
            .chain(reference.service_nodes().filter_map(|(_, n)| n.service_id()))
            .collect(),
    };

    let mut builder = Builder {
        graph: CompositionGraph::new(weights, unused),
        taxonomy,
        source,
        end_contract: &end.inputs,
        covered: LabelSet::new(),
        placed: HashMap::new(),
        candidates: CandidateList::new(),
    };

    let start_id = builder.place(start.clone(), Vec::new())?;
    builder.expand(start_id)?;

    while !builder.is_covered() {
        let (index, node, incoming) = builder
            .next_connectable()?
            .ok_or_else(|| ConstructionError::InputStarvation {
                outstanding: builder.outstanding(),
                placed: builder.placed.len(),
            })?;
        builder.candidates.take(index);
        let id = builder.place(node, incoming)?;
        builder.expand(id)?;
    }

    builder.connect_end(end)?;

    let mut graph = builder.graph;
    let pruned = prune(&mut graph);
    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        pruned = pruned.len(),
        "constructed composition graph"
    );
    Ok(graph)
}

/// Computes the services reachable from a start contract: those whose inputs
/// all become satisfiable, directly or through other reachable services.
///
/// This is the usual relevance filter handed to [`CandidateSource::Taxonomy`].
/// The result is sorted by service index.
pub fn discover_relevant<T>(taxonomy: &T, start_outputs: &LabelSet) -> IndexSet<ServiceId>
where
    T: Taxonomy + ?Sized,
{
    let mut available: Vec<String> = start_outputs.iter().cloned().collect();
    let mut relevant: IndexSet<ServiceId> = IndexSet::new();
    let mut pending: IndexSet<ServiceId> = IndexSet::new();
    let mut next = 0;

    loop {
        for label in &available[next..] {
            pending.extend(taxonomy.consumers_of(label).iter().copied());
        }
        next = available.len();

        let ready: Vec<ServiceId> = pending
            .iter()
            .copied()
            .filter(|id| !relevant.contains(id))
            .filter(|&id| {
                taxonomy.service(id).is_some_and(|service| {
                    service.inputs.iter().all(|input| {
                        available
                            .iter()
                            .any(|label| taxonomy.satisfies(label, input))
                    })
                })
            })
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in ready {
            relevant.insert(id);
            pending.shift_remove(&id);
            if let Some(service) = taxonomy.service(id) {
                available.extend(service.outputs.iter().cloned());
            }
        }
    }

    relevant.sort();
    relevant
}

/// Construction state for one [`construct`] call.
struct Builder<'a, T: ?Sized> {
    graph: CompositionGraph,
    taxonomy: &'a T,
    source: CandidateSource<'a>,
    end_contract: &'a LabelSet,
    /// End-contract labels satisfied by some placed node.
    covered: LabelSet,
    placed: HashMap<ServiceId, NodeId>,
    candidates: CandidateList,
}

type Incoming = Vec<(NodeId, LabelSet)>;

impl<'a, T> Builder<'a, T>
where
    T: Taxonomy + ?Sized,
{
    fn is_covered(&self) -> bool {
        self.end_contract.is_subset(&self.covered)
    }

    fn outstanding(&self) -> LabelSet {
        self.end_contract.difference(&self.covered).cloned().collect()
    }

    /// The connect-step plus end-contract tracking.
    fn place(&mut self, node: ServiceNode, incoming: Incoming) -> Result<NodeId, CoreError> {
        let newly_covered: Vec<String> = self
            .end_contract
            .iter()
            .filter(|required| !self.covered.contains(*required))
            .filter(|required| {
                node.outputs
                    .iter()
                    .any(|output| self.taxonomy.satisfies(output, required))
            })
            .cloned()
            .collect();
        let service = node.service_id();
        let name = node.name.clone();

        let id = self.graph.connect(node, incoming)?;
        if let Some(service) = service {
            self.placed.insert(service, id);
        }
        self.covered.extend(newly_covered);
        debug!(node = %name, covered = self.covered.len(), "placed node");
        Ok(id)
    }

    /// Offers the successors of a freshly placed node.
    fn expand(&mut self, id: NodeId) -> Result<(), CoreError> {
        let node = self.graph.node(id).ok_or(CoreError::NodeNotFound { id })?;
        let mut found: Vec<ServiceId> = Vec::new();

        match self.source {
            CandidateSource::Taxonomy { relevant } => {
                for output in &node.outputs {
                    found.extend(
                        self.taxonomy
                            .consumers_of(output)
                            .iter()
                            .copied()
                            .filter(|c| relevant.contains(c)),
                    );
                }
            }
            CandidateSource::Reference(reference) => {
                if let Some(original) = reference.node_id(&node.name) {
                    for view in reference.outgoing(original) {
                        if let Some(service) =
                            reference.node(view.to).and_then(ServiceNode::service_id)
                        {
                            found.push(service);
                        }
                    }
                }
            }
        }

        for service in found {
            if !self.placed.contains_key(&service) {
                self.candidates.offer(service, self.graph.weights());
            }
        }
        Ok(())
    }

    /// Scans candidates in priority order for the first one whose inputs are
    /// all satisfied. Candidates that fail stay in the list.
    fn next_connectable(&self) -> Result<Option<(usize, ServiceNode, Incoming)>, CoreError> {
        for (index, candidate) in self.candidates.iter().enumerate() {
            let service = self
                .taxonomy
                .service(candidate.service)
                .ok_or(CoreError::ServiceNotFound {
                    id: candidate.service,
                })?;
            if let Some(incoming) = self.satisfy(service) {
                return Ok(Some((index, service.clone(), incoming)));
            }
        }
        Ok(None)
    }

    /// Groups a node's inputs by the placed predecessor supplying each, or
    /// `None` if some input has no supplier yet.
    fn satisfy(&self, node: &ServiceNode) -> Option<Incoming> {
        let mut by_source: IndexMap<NodeId, LabelSet> = IndexMap::new();
        for input in &node.inputs {
            let source = self.supplier_of(input)?;
            by_source.entry(source).or_default().insert(input.clone());
        }
        Some(by_source.into_iter().collect())
    }

    /// The `start` pseudo-node if it satisfies `input`, otherwise the first
    /// placed producer in taxonomy order.
    fn supplier_of(&self, input: &str) -> Option<NodeId> {
        if let Some(start) = self.graph.start() {
            let from_start = self.graph.node(start).is_some_and(|node| {
                node.outputs
                    .iter()
                    .any(|output| self.taxonomy.satisfies(output, input))
            });
            if from_start {
                return Some(start);
            }
        }
        self.taxonomy
            .producers_of(input)
            .iter()
            .find_map(|service| self.placed.get(service).copied())
    }

    /// Links `end` to the placed nodes covering its inputs, in placement
    /// order.
    fn connect_end(&mut self, end: &ServiceNode) -> Result<NodeId, ConstructionError> {
        let mut outstanding = end.inputs.clone();
        let mut incoming: Incoming = Vec::new();

        for (id, node) in self.graph.nodes() {
            if outstanding.is_empty() {
                break;
            }
            let supplied: LabelSet = outstanding
                .iter()
                .filter(|required| {
                    node.outputs
                        .iter()
                        .any(|output| self.taxonomy.satisfies(output, required))
                })
                .cloned()
                .collect();
            if !supplied.is_empty() {
                outstanding.retain(|label| !supplied.contains(label));
                incoming.push((id, supplied));
            }
        }

        if !outstanding.is_empty() {
            return Err(ConstructionError::EndUnreachable { outstanding });
        }
        Ok(self.graph.connect(end.clone(), incoming)?)
    }
}
