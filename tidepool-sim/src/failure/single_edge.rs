//! Partition bookkeeping as single edge cuts over the full node graph.
//!
//! The graph starts complete. A crashed node loses all its edges, and a
//! partition cuts exactly one undirected edge. Edges are derived from the
//! crashed flags and the set of cut pairs, so recovering a node restores
//! only the links that are neither cut nor attached to a crashed peer.
//!
//! Every crash or cut must leave a connected component of at least
//! `node_count - max_failures` nodes. Look-aheads evaluate that on a
//! hypothetical graph and never touch the live state.

use std::collections::BTreeSet;
use std::rc::Rc;

use tidepool_core::{AddressResolver, NodeId, SimulationError, SimulationResult};
use tracing::debug;

use super::PartitionResult;

type Edge = (NodeId, NodeId);

fn edge(a: NodeId, b: NodeId) -> Edge {
    (a.min(b), a.max(b))
}

/// Single-edge failure manager.
#[derive(Debug, Clone)]
pub struct SingleEdgeFailureManager {
    resolver: Rc<AddressResolver>,
    crashed: Vec<bool>,
    cut: BTreeSet<Edge>,
    partition_count: usize,
}

impl SingleEdgeFailureManager {
    /// Complete graph with nothing crashed.
    pub fn new(resolver: Rc<AddressResolver>) -> Self {
        Self {
            crashed: vec![false; resolver.node_count()],
            cut: BTreeSet::new(),
            partition_count: 0,
            resolver,
        }
    }

    /// Both endpoints alive and their edge not cut. A live node can always
    /// reach itself.
    pub fn can_send(&self, from: NodeId, to: NodeId) -> bool {
        self.connected(from, to, None, None)
    }

    /// Whether `node` is crashed.
    pub fn is_crashed(&self, node: NodeId) -> bool {
        self.crashed[node]
    }

    /// Partitions created since the last reset.
    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// Edges currently cut by partitions.
    pub fn cut_edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.cut.iter().copied()
    }

    /// Size of the largest connected component of the live graph.
    pub fn max_component_size(&self) -> usize {
        self.max_component(None, None)
    }

    /// Crash `node` only if the graph keeps a large enough component.
    pub fn can_crash(&self, node: NodeId) -> bool {
        !self.crashed[node] && self.max_component(Some(node), None) >= self.threshold(node)
    }

    /// Mark `node` crashed, isolating it.
    pub fn crash_node(&mut self, node: NodeId) -> SimulationResult<()> {
        if self.crashed[node] {
            return Err(SimulationError::NodeAlreadyCrashed(node));
        }
        self.crashed[node] = true;
        Ok(())
    }

    /// Bring `node` back with its uncut links to live peers.
    pub fn recover_node(&mut self, node: NodeId) -> SimulationResult<()> {
        if !self.crashed[node] {
            return Err(SimulationError::NodeNotCrashed(node));
        }
        self.crashed[node] = false;
        Ok(())
    }

    /// Cut the existing edge `first - second` only if the graph keeps a large
    /// enough component.
    pub fn can_add_partition(&self, first: NodeId, second: NodeId) -> bool {
        first != second
            && self.can_send(first, second)
            && self.max_component(None, Some(edge(first, second))) >= self.threshold(first)
    }

    /// Cut `first - second`.
    pub fn partition(&mut self, first: NodeId, second: NodeId) -> PartitionResult {
        self.cut.insert(edge(first, second));
        let partition_id = self.partition_count;
        self.partition_count += 1;
        debug!(partition_id, first, second, "edge partition created");
        PartitionResult {
            partition_id,
            first_part: vec![first],
            second_part: vec![second],
        }
    }

    /// Restore the edge between the single members of each side.
    pub fn remove_partition(&mut self, first: &[NodeId], second: &[NodeId]) {
        if let (Some(&a), Some(&b)) = (first.first(), second.first()) {
            self.cut.remove(&edge(a, b));
        }
    }

    /// Complete graph, nothing crashed, counter cleared.
    pub fn reset(&mut self) {
        self.crashed.fill(false);
        self.cut.clear();
        self.partition_count = 0;
    }

    fn threshold(&self, node: NodeId) -> usize {
        let ty = self.resolver.node_type(node);
        self.resolver
            .node_count()
            .saturating_sub(self.resolver.max_failures(ty))
    }

    fn connected(
        &self,
        a: NodeId,
        b: NodeId,
        extra_crash: Option<NodeId>,
        extra_cut: Option<Edge>,
    ) -> bool {
        let down = |node: NodeId| self.crashed[node] || extra_crash == Some(node);
        if down(a) || down(b) {
            return false;
        }
        if a == b {
            return true;
        }
        let link = edge(a, b);
        extra_cut != Some(link) && !self.cut.contains(&link)
    }

    // Iterative depth-first search over the graph with an optional extra
    // crash or cut applied. Crashed nodes count as singleton components.
    fn max_component(&self, extra_crash: Option<NodeId>, extra_cut: Option<Edge>) -> usize {
        let count = self.resolver.node_count();
        let mut visited = vec![false; count];
        let mut largest = 0;
        let mut stack = Vec::new();

        for start in 0..count {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            stack.push(start);
            let mut size = 0;
            while let Some(node) = stack.pop() {
                size += 1;
                for next in 0..count {
                    if !visited[next] && self.connected(node, next, extra_crash, extra_cut) {
                        visited[next] = true;
                        stack.push(next);
                    }
                }
            }
            largest = largest.max(size);
        }
        largest
    }
}
