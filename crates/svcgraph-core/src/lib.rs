pub mod edge;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod taxonomy;
pub mod validate;
pub mod weights;

// Re-export commonly used types
pub use edge::CompositionEdge;
pub use error::CoreError;
pub use graph::{CompositionGraph, EdgeView};
pub use id::{EdgeId, NodeId, ServiceId};
pub use node::{LabelSet, NodeKind, Qos, ServiceNode, END_NAME, START_NAME};
pub use taxonomy::{Taxonomy, TaxonomyBuilder, TaxonomyIndex};
pub use validate::{validate_graph, InvariantViolation};
pub use weights::Weights;
