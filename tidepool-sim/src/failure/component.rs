//! Partition bookkeeping as a minority/majority split per node type.
//!
//! Nodes of the same type talk iff they sit on the same side. Nodes of
//! different types talk iff both sit in their type's majority. A node is
//! unavailable when it is crashed or in the minority, and each type keeps the
//! count of its unavailable nodes under its failure budget.

use std::collections::BTreeSet;
use std::rc::Rc;

use tidepool_core::{AddressResolver, NodeId, NodeTypeId, SimulationError, SimulationResult};
use tracing::debug;

use super::PartitionResult;

#[derive(Debug, Clone)]
struct TypeComponents {
    minority: BTreeSet<NodeId>,
    majority: BTreeSet<NodeId>,
    unavailable: usize,
}

/// Component-based failure manager.
#[derive(Debug, Clone)]
pub struct ComponentFailureManager {
    resolver: Rc<AddressResolver>,
    crashed: Vec<bool>,
    components: Vec<TypeComponents>,
    partition_count: usize,
}

impl ComponentFailureManager {
    /// Fully connected manager with nothing crashed.
    pub fn new(resolver: Rc<AddressResolver>) -> Self {
        let components = (0..resolver.type_count())
            .map(|ty| TypeComponents {
                minority: BTreeSet::new(),
                majority: resolver.nodes_of_type(NodeTypeId(ty)).collect(),
                unavailable: 0,
            })
            .collect();
        Self {
            crashed: vec![false; resolver.node_count()],
            components,
            partition_count: 0,
            resolver,
        }
    }

    /// See [`FailureManager::can_send`](super::FailureManager::can_send).
    pub fn can_send(&self, from: NodeId, to: NodeId) -> bool {
        if self.crashed[from] || self.crashed[to] {
            return false;
        }
        let from_type = self.resolver.node_type(from);
        let to_type = self.resolver.node_type(to);
        if from_type != to_type {
            return self.components[from_type.0].majority.contains(&from)
                && self.components[to_type.0].majority.contains(&to);
        }
        let components = &self.components[from_type.0];
        components.minority.contains(&from) == components.minority.contains(&to)
    }

    /// Whether `node` is crashed.
    pub fn is_crashed(&self, node: NodeId) -> bool {
        self.crashed[node]
    }

    /// Number of unavailable nodes of `ty`.
    pub fn unavailable_count(&self, ty: NodeTypeId) -> usize {
        self.components[ty.0].unavailable
    }

    /// Partitions created since the last reset.
    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// Crashing a node that is already unavailable costs nothing; otherwise
    /// the type needs one free slot in its budget.
    pub fn can_crash(&self, node: NodeId) -> bool {
        if self.crashed[node] {
            return false;
        }
        let ty = self.resolver.node_type(node);
        let components = &self.components[ty.0];
        components.minority.contains(&node)
            || components.unavailable < self.resolver.max_failures(ty)
    }

    /// Mark `node` crashed.
    pub fn crash_node(&mut self, node: NodeId) -> SimulationResult<()> {
        if self.crashed[node] {
            return Err(SimulationError::NodeAlreadyCrashed(node));
        }
        self.mark_unavailable(node);
        self.crashed[node] = true;
        Ok(())
    }

    /// Bring `node` back.
    pub fn recover_node(&mut self, node: NodeId) -> SimulationResult<()> {
        if !self.crashed[node] {
            return Err(SimulationError::NodeNotCrashed(node));
        }
        self.mark_available(node);
        self.crashed[node] = false;
        Ok(())
    }

    /// `first` must be in its type's majority and the type needs budget left.
    pub fn can_add_partition(&self, first: NodeId, second: NodeId) -> bool {
        if first == second {
            return false;
        }
        let ty = self.resolver.node_type(first);
        let components = &self.components[ty.0];
        components.majority.contains(&first)
            && (self.crashed[first] || components.unavailable < self.resolver.max_failures(ty))
    }

    /// Peers that may join `first` in the minority, and how many of them at
    /// most, once `first` is in the minority and `second` in its majority.
    ///
    /// The limit is `min(remaining budget, type size / 2)`.
    pub fn partition_candidates(&self, first: NodeId, second: NodeId) -> (Vec<NodeId>, usize) {
        let ty = self.resolver.node_type(first);
        let components = &self.components[ty.0];
        let mut unavailable = components.unavailable;
        if !self.is_unavailable(first) {
            unavailable += 1;
        }
        // a live `second` leaving the minority hands its slot back
        if self.resolver.node_type(second) == ty
            && components.minority.contains(&second)
            && !self.crashed[second]
        {
            unavailable = unavailable.saturating_sub(1);
        }

        let peers: Vec<NodeId> = self
            .resolver
            .nodes_of_type(ty)
            .filter(|&node| node != first && node != second)
            .collect();
        let budget = self.resolver.max_failures(ty).saturating_sub(unavailable);
        let type_size = self.resolver.nodes_of_type(ty).len();
        (peers, budget.min(type_size / 2))
    }

    /// Move `first` to the minority with a sampled group of its peers, and
    /// `second` to its majority.
    ///
    /// The sampler receives [`partition_candidates`](Self::partition_candidates).
    pub fn partition(
        &mut self,
        first: NodeId,
        second: NodeId,
        mut sampler: impl FnMut(&[NodeId], usize) -> Vec<NodeId>,
    ) -> PartitionResult {
        let ty = self.resolver.node_type(first);
        let (peers, limit) = self.partition_candidates(first, second);
        let chosen: BTreeSet<NodeId> = sampler(&peers, limit)
            .into_iter()
            .filter(|node| peers.contains(node))
            .collect();
        self.add_to_minority(first);
        self.move_to_majority(second);

        for &peer in &peers {
            if chosen.contains(&peer) {
                self.add_to_minority(peer);
            } else {
                self.move_to_majority(peer);
            }
        }

        let mut first_part: Vec<NodeId> = chosen.into_iter().collect();
        first_part.push(first);
        first_part.sort_unstable();
        let second_part = self
            .resolver
            .nodes()
            .filter(|node| first_part.binary_search(node).is_err())
            .collect();

        let partition_id = self.partition_count;
        self.partition_count += 1;
        debug!(
            partition_id,
            ?first_part,
            node_type = %self.resolver.type_name(ty),
            "component partition created"
        );
        PartitionResult {
            partition_id,
            first_part,
            second_part,
        }
    }

    /// Rejoin every `first` member to its majority.
    pub fn remove_partition(&mut self, first: &[NodeId], _second: &[NodeId]) {
        for &node in first {
            self.move_to_majority(node);
        }
    }

    /// Everyone in the majority, nothing crashed, counters cleared.
    pub fn reset(&mut self) {
        self.crashed.fill(false);
        for (ty, components) in self.components.iter_mut().enumerate() {
            components.minority.clear();
            components.majority = self.resolver.nodes_of_type(NodeTypeId(ty)).collect();
            components.unavailable = 0;
        }
        self.partition_count = 0;
    }

    fn is_unavailable(&self, node: NodeId) -> bool {
        let ty = self.resolver.node_type(node);
        self.crashed[node] || self.components[ty.0].minority.contains(&node)
    }

    // Counts a node once, whatever the number of reasons it is unavailable.
    fn mark_unavailable(&mut self, node: NodeId) {
        if !self.is_unavailable(node) {
            let ty = self.resolver.node_type(node);
            self.components[ty.0].unavailable += 1;
        }
    }

    // Caller clears exactly one reason right after; the count only drops if
    // no other reason remains.
    fn mark_available(&mut self, node: NodeId) {
        let ty = self.resolver.node_type(node);
        let in_minority = self.components[ty.0].minority.contains(&node);
        if !(self.crashed[node] && in_minority) {
            let components = &mut self.components[ty.0];
            components.unavailable = components.unavailable.saturating_sub(1);
        }
    }

    fn add_to_minority(&mut self, node: NodeId) {
        let ty = self.resolver.node_type(node);
        if self.components[ty.0].minority.contains(&node) {
            return;
        }
        self.mark_unavailable(node);
        let components = &mut self.components[ty.0];
        components.majority.remove(&node);
        components.minority.insert(node);
    }

    fn move_to_majority(&mut self, node: NodeId) {
        let ty = self.resolver.node_type(node);
        if !self.components[ty.0].minority.contains(&node) {
            return;
        }
        self.mark_available(node);
        let components = &mut self.components[ty.0];
        components.minority.remove(&node);
        components.majority.insert(node);
    }
}
