//! Construction, pruning and mutation of composition graphs.
//!
//! - [`construct`] grows a graph from a start contract to an end contract,
//!   mining candidates from the taxonomy or from a reference graph.
//! - [`prune`] removes nodes with no path to `end`.
//! - [`mutate`] replaces a connected region with a freshly built one,
//!   atomically.

pub mod candidates;
pub mod construct;
pub mod error;
pub mod mutate;
pub mod prune;

pub use candidates::{Candidate, CandidateList};
pub use construct::{construct, discover_relevant, CandidateSource};
pub use error::{ConstructionError, MutationError};
pub use mutate::{mutate, mutate_at, MutationReport};
pub use prune::prune;
