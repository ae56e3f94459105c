//! The taxonomy/service catalog seen by the construction core.
//!
//! [`Taxonomy`] is the read-only lookup contract: for a semantic label it
//! answers which services produce it, which consume it, and whether it is one
//! of the goal's required outputs. [`TaxonomyIndex`] is the in-memory
//! implementation backed by a concept hierarchy.
//!
//! # Subsumption
//!
//! Concepts form a forest. A produced concept satisfies a required concept
//! when the required one is the same concept or one of its ancestors: a
//! service producing `Sedan` satisfies an input asking for `Car`. Labels never
//! declared as concepts are treated as roots with no parent.
//!
//! All lookups return services in ascending [`ServiceId`] order so that callers
//! iterating them stay deterministic.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::id::ServiceId;
use crate::node::{LabelSet, Qos, ServiceNode, END_NAME, START_NAME};

/// Read-only catalog lookups consumed by construction and mutation.
pub trait Taxonomy {
    /// Number of catalog services; weight vectors have exactly this length.
    fn service_count(&self) -> usize;

    /// The catalog entry for a service.
    fn service(&self, id: ServiceId) -> Option<&ServiceNode>;

    /// Stable catalog index for a service name.
    fn service_index(&self, name: &str) -> Option<ServiceId>;

    /// Services with at least one output satisfying `label`.
    fn producers_of(&self, label: &str) -> &[ServiceId];

    /// Services with at least one input that `label` satisfies.
    fn consumers_of(&self, label: &str) -> &[ServiceId];

    /// Whether a produced label satisfies a required label.
    fn satisfies(&self, produced: &str, required: &str) -> bool;

    /// Whether `label` is one of the goal's required final outputs.
    fn is_goal_output(&self, label: &str) -> bool;
}

/// In-memory taxonomy over a concept forest and a service catalog.
#[derive(Debug, Clone)]
pub struct TaxonomyIndex {
    services: Vec<ServiceNode>,
    by_name: IndexMap<String, ServiceId>,
    /// Concept -> itself plus all of its ancestors.
    ancestors: HashMap<String, BTreeSet<String>>,
    producers: HashMap<String, Vec<ServiceId>>,
    consumers: HashMap<String, Vec<ServiceId>>,
    goal: LabelSet,
}

impl TaxonomyIndex {
    pub fn builder() -> TaxonomyBuilder {
        TaxonomyBuilder::default()
    }

    /// The goal's required outputs.
    pub fn goal(&self) -> &LabelSet {
        &self.goal
    }
}

impl Taxonomy for TaxonomyIndex {
    fn service_count(&self) -> usize {
        self.services.len()
    }

    fn service(&self, id: ServiceId) -> Option<&ServiceNode> {
        self.services.get(id.index())
    }

    fn service_index(&self, name: &str) -> Option<ServiceId> {
        self.by_name.get(name).copied()
    }

    fn producers_of(&self, label: &str) -> &[ServiceId] {
        self.producers.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    fn consumers_of(&self, label: &str) -> &[ServiceId] {
        self.consumers.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    fn satisfies(&self, produced: &str, required: &str) -> bool {
        if produced == required {
            return true;
        }
        self.ancestors
            .get(produced)
            .is_some_and(|set| set.contains(required))
    }

    fn is_goal_output(&self, label: &str) -> bool {
        self.goal.contains(label)
    }
}

/// Incremental builder for [`TaxonomyIndex`].
///
/// Services receive [`ServiceId`]s in insertion order.
#[derive(Debug, Default)]
pub struct TaxonomyBuilder {
    parents: IndexMap<String, Option<String>>,
    services: Vec<ServiceNode>,
    goal: LabelSet,
}

impl TaxonomyBuilder {
    /// Declares a concept, optionally under a parent concept.
    pub fn concept(mut self, name: impl Into<String>, parent: Option<&str>) -> Self {
        self.parents
            .insert(name.into(), parent.map(ToString::to_string));
        self
    }

    /// Appends a service to the catalog.
    pub fn service<I, O, S, T>(mut self, name: impl Into<String>, inputs: I, outputs: O, qos: Qos) -> Self
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let id = ServiceId(self.services.len() as u32);
        self.services
            .push(ServiceNode::service(id, name, inputs, outputs, qos));
        self
    }

    /// Sets the goal's required final outputs.
    pub fn goal<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.goal = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the hierarchy and precomputes the producer/consumer indices.
    pub fn build(self) -> Result<TaxonomyIndex, CoreError> {
        let mut by_name = IndexMap::new();
        for service in &self.services {
            if service.name == START_NAME || service.name == END_NAME {
                return Err(CoreError::ReservedName {
                    name: service.name.clone(),
                });
            }
            if let Some(id) = service.service_id() {
                if by_name.insert(service.name.clone(), id).is_some() {
                    return Err(CoreError::DuplicateService {
                        name: service.name.clone(),
                    });
                }
            }
        }

        // Every label a service mentions is a concept, declared or not.
        let mut concepts: Vec<String> = self.parents.keys().cloned().collect();
        let mut known: HashSet<String> = concepts.iter().cloned().collect();
        for service in &self.services {
            for label in service.inputs.iter().chain(service.outputs.iter()) {
                if known.insert(label.clone()) {
                    concepts.push(label.clone());
                }
            }
        }
        for parent in self.parents.values().flatten() {
            if known.insert(parent.clone()) {
                concepts.push(parent.clone());
            }
        }

        let mut ancestors: HashMap<String, BTreeSet<String>> = HashMap::new();
        for concept in &concepts {
            let mut chain = BTreeSet::new();
            chain.insert(concept.clone());
            let mut current = concept.as_str();
            while let Some(Some(parent)) = self.parents.get(current) {
                if !chain.insert(parent.clone()) {
                    return Err(CoreError::CyclicTaxonomy {
                        concept: concept.clone(),
                    });
                }
                current = parent.as_str();
            }
            ancestors.insert(concept.clone(), chain);
        }

        // descendants[c] = every concept that satisfies c.
        let mut descendants: HashMap<&str, Vec<&str>> = HashMap::new();
        for (concept, chain) in &ancestors {
            for ancestor in chain {
                descendants
                    .entry(ancestor.as_str())
                    .or_default()
                    .push(concept.as_str());
            }
        }

        let mut producers: HashMap<String, Vec<ServiceId>> = HashMap::new();
        let mut consumers: HashMap<String, Vec<ServiceId>> = HashMap::new();
        for service in &self.services {
            let Some(id) = service.service_id() else {
                continue;
            };
            for output in &service.outputs {
                for satisfied in &ancestors[output] {
                    push_unique(producers.entry(satisfied.clone()).or_default(), id);
                }
            }
            for input in &service.inputs {
                for provider in descendants.get(input.as_str()).into_iter().flatten() {
                    push_unique(consumers.entry(provider.to_string()).or_default(), id);
                }
            }
        }

        Ok(TaxonomyIndex {
            services: self.services,
            by_name,
            ancestors,
            producers,
            consumers,
            goal: self.goal,
        })
    }
}

/// Services are visited in ascending id order, so the last entry is the only
/// possible duplicate.
fn push_unique(list: &mut Vec<ServiceId>, id: ServiceId) {
    if list.last() != Some(&id) {
        list.push(id);
    }
}
