//! Composition edges.
//!
//! An edge certifies that its source satisfies a specific set of its target's
//! input labels (the *intersect set*). Endpoints are not stored here: the edge
//! lives in the graph arena, which records source and target indices.

use serde::{Deserialize, Serialize};

use crate::node::LabelSet;

/// Edge weight in the composition graph arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionEdge {
    /// Target input labels this edge satisfies.
    pub intersect: LabelSet,
}

impl CompositionEdge {
    pub fn new(intersect: LabelSet) -> Self {
        CompositionEdge { intersect }
    }

    /// Folds another set of labels into this edge, used when a second label
    /// links the same pair of nodes.
    pub fn merge(&mut self, labels: &LabelSet) {
        self.intersect.extend(labels.iter().cloned());
    }
}
