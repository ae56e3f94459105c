//! Domain-level failures of construction and mutation.
//!
//! Both are expected outcomes for some inputs and are returned as values;
//! the caller decides what a failed individual means. Misuse of the graph API
//! surfaces as the wrapped [`CoreError`].

use svcgraph_core::{CoreError, InvariantViolation, LabelSet};
use thiserror::Error;

/// Why no composition graph could be built for a start/end contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    /// No remaining candidate has all of its inputs satisfied by placed nodes.
    #[error("input starvation after placing {placed} node(s): end labels {outstanding:?} still uncovered")]
    InputStarvation { outstanding: LabelSet, placed: usize },

    /// The end pseudo-node could not be fed from the placed nodes.
    #[error("end contract unreachable: no placed node supplies {outstanding:?}")]
    EndUnreachable { outstanding: LabelSet },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Why a mutation was abandoned. The graph handed to the operator is left
/// exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// The graph holds only the start and end pseudo-nodes.
    #[error("graph has no service node to mutate")]
    NothingToMutate,

    /// The contract induced by the excised region is unconstructable.
    #[error("replacement region could not be built: {0}")]
    LocalConstruction(#[from] ConstructionError),

    /// A boundary label of the new region has no acyclic provider.
    #[error("no frontier node can supply '{label}' to {node}")]
    UnmatchedFrontier { node: String, label: String },

    /// The spliced graph failed validation.
    #[error("mutated graph violates {} invariant(s)", .0.len())]
    InvariantViolated(Vec<InvariantViolation>),

    #[error(transparent)]
    Core(#[from] CoreError),
}
