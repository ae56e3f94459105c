//! Core error types for svcgraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Every variant
//! here signals misuse of the graph or taxonomy API (a caller bug), not a
//! data condition: domain-level failures live in the evolve crate.

use crate::id::{NodeId, ServiceId};
use thiserror::Error;

/// Core errors produced by the svcgraph-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A node with this name is already placed in the graph.
    #[error("duplicate node name: '{name}'")]
    DuplicateNode { name: String },

    /// A node handle was not found in the graph.
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// A service index is outside the catalog.
    #[error("service not found: {id}")]
    ServiceNotFound { id: ServiceId },

    /// An edge failed validation.
    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },

    /// The concept hierarchy of a taxonomy contains a cycle.
    #[error("cyclic taxonomy: concept '{concept}' is its own ancestor")]
    CyclicTaxonomy { concept: String },

    /// Two catalog services share a name.
    #[error("duplicate service name in catalog: '{name}'")]
    DuplicateService { name: String },

    /// A catalog service uses the name of a terminal pseudo-node.
    #[error("service name '{name}' is reserved for a terminal node")]
    ReservedName { name: String },

    /// A weight vector does not cover the whole catalog.
    #[error("weight vector has {actual} entries, catalog has {expected} services")]
    WeightsMismatch { expected: usize, actual: usize },
}
