//! Scheduling and fault-injection strategies.
//!
//! A strategy owns the [`FailureManager`](crate::failure::FailureManager)
//! and the [`ProbabilityModel`](crate::sim::ProbabilityModel). The runner
//! calls back into it from the send and log paths of nodes, and asks it which
//! task runs next.

mod random;

pub use random::{DistributedRandomStrategy, InvocationSeeds};

use tidepool_core::{NodeId, NodeResult, SimulationResult};

use crate::failure::PartitionResult;
use crate::sim::{Task, TaskManager};

/// Callbacks a runner uses while executing an invocation.
pub trait DistributedStrategy {
    /// Maybe crash `node`. Returns the crash control signal
    /// ([`NodeError::Crashed`](tidepool_core::NodeError::Crashed)) if it
    /// did.
    fn try_crash(&mut self, node: NodeId) -> NodeResult<()>;

    /// Crash point right before a message leaves `sender`.
    fn on_message_sent(
        &mut self,
        sender: NodeId,
        receiver: NodeId,
        message_id: usize,
    ) -> NodeResult<()>;

    /// Crash point right before `node` touches its persistent log.
    fn before_database_access(&mut self, node: NodeId) -> NodeResult<()>;

    /// Maybe split the network before a send. The runner must account for
    /// the returned partition and drop the send if it now crosses it.
    fn try_add_partition_before_send(
        &mut self,
        sender: NodeId,
        receiver: NodeId,
        message_id: usize,
    ) -> Option<PartitionResult>;

    /// Number of deliveries of a message: 0 drops it, more than 1
    /// duplicates it.
    fn get_message_rate(&mut self, sender: NodeId, receiver: NodeId, message_id: usize) -> usize;

    /// Which of `nodes` join the minority side, at most `limit` of them.
    fn choose_partition_component(&mut self, nodes: &[NodeId], limit: usize) -> Vec<NodeId>;

    /// Delay before a crashed node or a partition recovers. Never lands
    /// before the latest scheduled timed task.
    fn get_recover_timeout(&mut self, tasks: &TaskManager) -> u64;

    /// Heal a partition.
    fn recover_partition(&mut self, first: &[NodeId], second: &[NodeId]);

    /// Decide, once, whether a crashed node will come back.
    fn should_recover(&mut self, node: NodeId) -> bool;

    /// Mark a crashed node as live again.
    fn recover_node(&mut self, node: NodeId) -> SimulationResult<()>;

    /// Whether `from` can currently reach `to`.
    fn can_send(&self, from: NodeId, to: NodeId) -> bool;

    /// Whether `node` is currently crashed.
    fn is_crashed(&self, node: NodeId) -> bool;

    /// Pick and remove the next task to execute, or `None` when the
    /// invocation is over.
    fn next(&mut self, tasks: &mut TaskManager, has_all_results: bool) -> Option<Task>;

    /// Prepare for a new invocation seeded with `seed`.
    fn reset(&mut self, seed: u64);
}
