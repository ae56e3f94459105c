//! Priority-ordered worklist of services waiting to be placed.
//!
//! Entries are kept sorted by ascending weight with ties broken by ascending
//! [`ServiceId`], a total order that depends only on the weight vector and the
//! catalog. A service is offered at most once per list: the seen set outlives
//! the entry, so a service removed after placement is never enqueued again.

use std::cmp::Ordering;
use std::collections::HashSet;

use svcgraph_core::{ServiceId, Weights};

/// One worklist entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub service: ServiceId,
    pub weight: f32,
}

impl Candidate {
    fn priority(&self, other: &Candidate) -> Ordering {
        self.weight
            .total_cmp(&other.weight)
            .then(self.service.cmp(&other.service))
    }
}

#[derive(Debug, Default, Clone)]
pub struct CandidateList {
    items: Vec<Candidate>,
    seen: HashSet<ServiceId>,
}

impl CandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `service` unless it was offered before. Returns whether it
    /// was added.
    ///
    /// Services missing from `weights` sort after every weighted service.
    pub fn offer(&mut self, service: ServiceId, weights: &Weights) -> bool {
        if !self.seen.insert(service) {
            return false;
        }
        let candidate = Candidate {
            service,
            weight: weights.get(service).unwrap_or(f32::INFINITY),
        };
        let at = self
            .items
            .partition_point(|c| c.priority(&candidate) == Ordering::Less);
        self.items.insert(at, candidate);
        true
    }

    /// Entries in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.items.iter()
    }

    /// Removes and returns the entry at `index`; the remaining order is kept.
    pub fn take(&mut self, index: usize) -> Candidate {
        self.items.remove(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn was_offered(&self, service: ServiceId) -> bool {
        self.seen.contains(&service)
    }
}
