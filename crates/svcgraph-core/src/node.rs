//! Service nodes and the `start`/`end` pseudo-nodes.
//!
//! A [`ServiceNode`] is a plain value: the same service appears as one clone in
//! the catalog and as independent clones in every graph it is placed in.
//! Moving a node between graphs copies it into a fresh arena slot.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::ServiceId;

/// Set of semantic labels. Ordered so iteration and rendering are
/// deterministic.
pub type LabelSet = BTreeSet<String>;

/// Name of the start pseudo-node.
pub const START_NAME: &str = "start";
/// Name of the end pseudo-node.
pub const END_NAME: &str = "end";

/// Quality-of-service attributes. Carried through the graph untouched; fitness
/// evaluation is the caller's concern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Qos {
    pub time: f64,
    pub cost: f64,
    pub availability: f64,
    pub reliability: f64,
}

impl Qos {
    /// Identity values for pseudo-nodes: no time, no cost, always available,
    /// always reliable.
    pub fn neutral() -> Self {
        Qos {
            time: 0.0,
            cost: 0.0,
            availability: 1.0,
            reliability: 1.0,
        }
    }
}

impl Default for Qos {
    fn default() -> Self {
        Qos::neutral()
    }
}

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Supplies the start contract as its outputs.
    Start,
    /// Requires the end contract as its inputs.
    End,
    /// A concrete catalog service.
    Service(ServiceId),
}

/// A node of a composition graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceNode {
    pub name: String,
    pub kind: NodeKind,
    /// Labels this node requires.
    pub inputs: LabelSet,
    /// Labels this node produces.
    pub outputs: LabelSet,
    pub qos: Qos,
}

impl ServiceNode {
    /// Creates a concrete service node.
    pub fn service<I, O, S, T>(
        id: ServiceId,
        name: impl Into<String>,
        inputs: I,
        outputs: O,
        qos: Qos,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        ServiceNode {
            name: name.into(),
            kind: NodeKind::Service(id),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            qos,
        }
    }

    /// Creates the start pseudo-node, producing the given contract.
    pub fn start<I, S>(contract: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ServiceNode {
            name: START_NAME.to_string(),
            kind: NodeKind::Start,
            inputs: LabelSet::new(),
            outputs: contract.into_iter().map(Into::into).collect(),
            qos: Qos::neutral(),
        }
    }

    /// Creates the end pseudo-node, requiring the given contract.
    pub fn end<I, S>(contract: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ServiceNode {
            name: END_NAME.to_string(),
            kind: NodeKind::End,
            inputs: contract.into_iter().map(Into::into).collect(),
            outputs: LabelSet::new(),
            qos: Qos::neutral(),
        }
    }

    /// Returns the catalog index for service nodes, `None` for pseudo-nodes.
    pub fn service_id(&self) -> Option<ServiceId> {
        match self.kind {
            NodeKind::Service(id) => Some(id),
            NodeKind::Start | NodeKind::End => None,
        }
    }

    /// Returns `true` for the `start` and `end` pseudo-nodes.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, NodeKind::Service(_))
    }
}
