//! Typed handles.
//!
//! [`NodeId`] and [`EdgeId`] are arena slots inside one
//! [`CompositionGraph`](crate::graph::CompositionGraph) and mean nothing in
//! another graph. [`ServiceId`] is the catalog position of a service: it is
//! shared by every graph built from the same taxonomy and indexes the weight
//! vector.

use std::fmt;

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

/// Declares a `u32` handle convertible to and from a petgraph index type.
macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident, $index:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl From<$index<u32>> for $name {
            fn from(idx: $index<u32>) -> Self {
                $name(idx.index() as u32)
            }
        }

        impl From<$name> for $index<u32> {
            fn from(handle: $name) -> Self {
                $index::new(handle.0 as usize)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_handle!(
    /// Slot of a node in a graph arena.
    NodeId,
    NodeIndex,
    "n"
);

arena_handle!(
    /// Slot of an edge in a graph arena.
    EdgeId,
    EdgeIndex,
    "e"
);

/// Catalog position of a service, assigned in catalog insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub u32);

impl ServiceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}
