//! Crash and partition state of every node.
//!
//! [`FailureManager`] is a closed enum over the two bookkeeping models. The
//! variant is picked once from
//! [`AddressResolver::failure_topology`](tidepool_core::AddressResolver::failure_topology)
//! and never changes for the run.
//!
//! | Variant | Partition unit | Budget check |
//! |---------|----------------|--------------|
//! | [`ComponentFailureManager`] | minority/majority per type | unavailable nodes per type |
//! | [`SingleEdgeFailureManager`] | one undirected edge | largest connected component |
//!
//! Mutating operations have preconditions: crashing a crashed node or
//! recovering a live one returns a [`SimulationError`](tidepool_core::SimulationError)
//! instead of being ignored.

mod component;
mod single_edge;

use std::rc::Rc;

use serde::Serialize;
use tidepool_core::{AddressResolver, FailureTopology, NodeId, SimulationResult};

pub use component::ComponentFailureManager;
pub use single_edge::SingleEdgeFailureManager;

/// Outcome of creating a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionResult {
    /// Monotonic id, reset with the manager.
    pub partition_id: usize,
    /// Side holding the node that started the partition.
    pub first_part: Vec<NodeId>,
    /// The other side.
    pub second_part: Vec<NodeId>,
}

/// Live, crashed and partitioned state of all nodes.
#[derive(Debug, Clone)]
pub enum FailureManager {
    /// Minority/majority sets per node type.
    Component(ComponentFailureManager),
    /// Single edge cuts over the full graph.
    SingleEdge(SingleEdgeFailureManager),
}

impl FailureManager {
    /// Build the variant matching the resolver's topology.
    pub fn new(resolver: Rc<AddressResolver>) -> Self {
        match resolver.failure_topology() {
            FailureTopology::Components => {
                FailureManager::Component(ComponentFailureManager::new(resolver))
            }
            FailureTopology::SingleEdge => {
                FailureManager::SingleEdge(SingleEdgeFailureManager::new(resolver))
            }
        }
    }

    /// Topology of the active variant.
    pub fn topology(&self) -> FailureTopology {
        match self {
            FailureManager::Component(_) => FailureTopology::Components,
            FailureManager::SingleEdge(_) => FailureTopology::SingleEdge,
        }
    }

    /// True iff neither endpoint is crashed and the partition state lets
    /// them communicate. No side effects.
    pub fn can_send(&self, from: NodeId, to: NodeId) -> bool {
        match self {
            FailureManager::Component(m) => m.can_send(from, to),
            FailureManager::SingleEdge(m) => m.can_send(from, to),
        }
    }

    /// Whether `node` is crashed.
    pub fn is_crashed(&self, node: NodeId) -> bool {
        match self {
            FailureManager::Component(m) => m.is_crashed(node),
            FailureManager::SingleEdge(m) => m.is_crashed(node),
        }
    }

    /// Look-ahead: would crashing `node` keep every invariant?
    pub fn can_crash(&self, node: NodeId) -> bool {
        match self {
            FailureManager::Component(m) => m.can_crash(node),
            FailureManager::SingleEdge(m) => m.can_crash(node),
        }
    }

    /// Mark `node` crashed. Fails if it already is.
    pub fn crash_node(&mut self, node: NodeId) -> SimulationResult<()> {
        match self {
            FailureManager::Component(m) => m.crash_node(node),
            FailureManager::SingleEdge(m) => m.crash_node(node),
        }
    }

    /// Inverse of [`crash_node`](Self::crash_node). Fails if `node` is up.
    pub fn recover_node(&mut self, node: NodeId) -> SimulationResult<()> {
        match self {
            FailureManager::Component(m) => m.recover_node(node),
            FailureManager::SingleEdge(m) => m.recover_node(node),
        }
    }

    /// Look-ahead: may a partition separating `first` from `second` be added?
    pub fn can_add_partition(&self, first: NodeId, second: NodeId) -> bool {
        match self {
            FailureManager::Component(m) => m.can_add_partition(first, second),
            FailureManager::SingleEdge(m) => m.can_add_partition(first, second),
        }
    }

    /// Nodes that may join `first`'s side of a partition from `second`, and
    /// how many at most. The single-edge model cuts one edge and has none.
    pub fn partition_candidates(&self, first: NodeId, second: NodeId) -> (Vec<NodeId>, usize) {
        match self {
            FailureManager::Component(m) => m.partition_candidates(first, second),
            FailureManager::SingleEdge(_) => (Vec::new(), 0),
        }
    }

    /// Create a partition separating `first` from `second`.
    ///
    /// The component model asks `sampler` which other nodes of `first`'s type
    /// join the minority. The single-edge model never calls it.
    ///
    /// The sampler is handed
    /// [`partition_candidates`](Self::partition_candidates) and its picks
    /// outside the candidates are ignored.
    pub fn partition(
        &mut self,
        first: NodeId,
        second: NodeId,
        sampler: impl FnMut(&[NodeId], usize) -> Vec<NodeId>,
    ) -> PartitionResult {
        match self {
            FailureManager::Component(m) => m.partition(first, second, sampler),
            FailureManager::SingleEdge(m) => m.partition(first, second),
        }
    }

    /// Reverse a partition from its two sides.
    pub fn remove_partition(&mut self, first: &[NodeId], second: &[NodeId]) {
        match self {
            FailureManager::Component(m) => m.remove_partition(first, second),
            FailureManager::SingleEdge(m) => m.remove_partition(first, second),
        }
    }

    /// Partitions created since the last reset.
    pub fn partition_count(&self) -> usize {
        match self {
            FailureManager::Component(m) => m.partition_count(),
            FailureManager::SingleEdge(m) => m.partition_count(),
        }
    }

    /// Fully connected, nothing crashed, partition counter at zero.
    pub fn reset(&mut self) {
        match self {
            FailureManager::Component(m) => m.reset(),
            FailureManager::SingleEdge(m) => m.reset(),
        }
    }
}
