//! Identity and failure-mode types shared by every simulation component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a simulated node, in `[0, node_count)`.
pub type NodeId = usize;

/// Index of a node type inside an [`AddressResolver`](crate::AddressResolver).
///
/// Node types are registered in order, so the index can be used directly to
/// address per-type arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeTypeId(pub usize);

impl NodeTypeId {
    /// Returns the raw index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// How nodes of a given type may crash and come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CrashMode {
    /// Nodes never crash.
    #[default]
    NoCrashes,
    /// Crashed nodes stay down for the rest of the invocation.
    NoRecover,
    /// Every crashed node is eventually recovered.
    AllNodesRecover,
    /// Each crash flips a coin to decide whether the node recovers.
    MixedRecover,
}

impl CrashMode {
    /// Returns true if nodes in this mode can be crashed at all.
    pub fn allows_crashes(self) -> bool {
        !matches!(self, CrashMode::NoCrashes)
    }
}

/// How network partitions may isolate nodes of a given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkPartitionMode {
    /// No partitions are injected.
    #[default]
    None,
    /// Nodes are split into a minority and a majority component.
    Components,
    /// Single undirected links between two nodes are cut.
    SingleEdge,
}

/// Shape of the partition bookkeeping, chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureTopology {
    /// Minority/majority sets per node type.
    Components,
    /// Full adjacency graph with single-edge cuts.
    SingleEdge,
}
