//! Per-invocation runtime state and the facade nodes use to act on it.

use std::rc::Rc;

use serde::Serialize;
use tidepool_core::{AddressResolver, NodeError, NodeId, NodeResult, SimulationError};
use tracing::{debug, trace};

use super::events::{DropReason, Event, TraceEvent};
use super::node::Node;
use super::scenario::{ExecutionResult, ExecutionScenario, OperationResult};
use crate::failure::PartitionResult;
use crate::sim::{TaskKind, TaskManager};
use crate::strategy::DistributedStrategy;

/// Reply a node is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingResponse {
    /// Peer expected to reply.
    pub from: NodeId,
    /// Request id the reply must answer.
    pub request_id: u64,
}

/// Continuation state of one node.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeSlot {
    /// Operation started and not yet completed.
    pub(crate) running: Option<usize>,
    /// Next operation to start.
    pub(crate) next_operation: usize,
    /// Pending response slot.
    pub(crate) awaiting: Option<PendingResponse>,
}

/// Everything an invocation mutates besides the node instances.
pub(crate) struct InvocationState<N: Node> {
    pub(crate) resolver: Rc<AddressResolver>,
    pub(crate) scenario: ExecutionScenario<N::Operation>,
    pub(crate) tasks: TaskManager,
    pub(crate) logs: Vec<Vec<N::LogEntry>>,
    pub(crate) messages: Vec<N::Message>,
    pub(crate) slots: Vec<NodeSlot>,
    pub(crate) results: ExecutionResult<N::Output>,
    pub(crate) events: Vec<TraceEvent>,
    /// Created during the current step, not yet handed to the runner.
    pub(crate) new_partitions: Vec<PartitionResult>,
}

impl<N: Node> InvocationState<N> {
    pub(crate) fn new(
        resolver: Rc<AddressResolver>,
        scenario: ExecutionScenario<N::Operation>,
    ) -> Self {
        let node_count = resolver.node_count();
        Self {
            results: ExecutionResult::pending(&scenario, node_count),
            logs: vec![Vec::new(); node_count],
            slots: vec![NodeSlot::default(); node_count],
            messages: Vec::new(),
            events: Vec::new(),
            new_partitions: Vec::new(),
            tasks: TaskManager::new(),
            scenario,
            resolver,
        }
    }

    /// Back to the state before the first task of an invocation.
    pub(crate) fn reset(&mut self) {
        let node_count = self.resolver.node_count();
        self.tasks.reset();
        self.logs = vec![Vec::new(); node_count];
        self.slots = vec![NodeSlot::default(); node_count];
        self.messages.clear();
        self.events.clear();
        self.new_partitions.clear();
        self.results = ExecutionResult::pending(&self.scenario, node_count);
    }

    pub(crate) fn record(&mut self, event: Event) {
        trace!(time = self.tasks.time(), ?event, "trace");
        self.events.push(TraceEvent {
            time: self.tasks.time(),
            event,
        });
    }

    pub(crate) fn operation_count(&self, node: NodeId) -> usize {
        self.scenario.operations_for(node).len()
    }

    /// Queue the next operation of `node` unless one is running.
    pub(crate) fn schedule_next_operation(&mut self, node: NodeId) {
        let slot = &self.slots[node];
        if slot.running.is_none() && slot.next_operation < self.operation_count(node) {
            let index = slot.next_operation;
            self.tasks.add_task(TaskKind::Operation { node, index });
        }
    }

    pub(crate) fn complete(&mut self, node: NodeId, output: N::Output) -> NodeResult<()> {
        let Some(index) = self.slots[node].running.take() else {
            return Err(NodeError::Protocol(format!(
                "node {node} completed an operation it was not running"
            )));
        };
        self.record(Event::OperationCompleted {
            node,
            index,
            result: format!("{output:?}"),
        });
        self.results.set(node, index, OperationResult::Value(output));
        self.schedule_next_operation(node);
        Ok(())
    }

    /// Drop the deliveries crossing a new partition.
    pub(crate) fn drop_crossing(
        &mut self,
        first: &[NodeId],
        second: &[NodeId],
        partition_id: usize,
    ) {
        let crosses = |from: &NodeId, to: &NodeId| {
            (first.contains(from) && second.contains(to))
                || (second.contains(from) && first.contains(to))
        };
        let mut dropped = Vec::new();
        self.tasks.remove_where(|task| match &task.kind {
            TaskKind::MessageReceive {
                from,
                to,
                message_id,
            } if crosses(from, to) => {
                dropped.push((*from, *to, *message_id));
                true
            }
            _ => false,
        });
        debug!(partition_id, dropped = dropped.len(), "in-flight deliveries cut");
        for (from, to, message_id) in dropped {
            self.record(Event::MessageDropped {
                from,
                to,
                message_id,
                reason: DropReason::Partitioned,
            });
        }
    }
}

/// What a node sees of the simulated world while one of its handlers runs.
pub struct Environment<'a, N: Node> {
    node: NodeId,
    state: &'a mut InvocationState<N>,
    strategy: &'a mut dyn DistributedStrategy,
}

impl<'a, N: Node> Environment<'a, N> {
    pub(crate) fn new(
        node: NodeId,
        state: &'a mut InvocationState<N>,
        strategy: &'a mut dyn DistributedStrategy,
    ) -> Self {
        Self {
            node,
            state,
            strategy,
        }
    }

    /// Id of the running node.
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Number of nodes in the cluster.
    pub fn number_of_nodes(&self) -> usize {
        self.state.resolver.node_count()
    }

    /// Cluster topology.
    pub fn resolver(&self) -> &AddressResolver {
        &self.state.resolver
    }

    /// Current virtual time.
    pub fn time(&self) -> u64 {
        self.state.tasks.time()
    }

    /// The node's persistent log. Survives crashes.
    ///
    /// Accessing it is a crash point when
    /// `DistributedConfiguration::crash_before_database_access` is enabled.
    pub fn log(&mut self) -> NodeResult<&mut Vec<N::LogEntry>> {
        self.strategy.before_database_access(self.node)?;
        Ok(&mut self.state.logs[self.node])
    }

    /// Send `message` to `to`.
    ///
    /// The sender may crash before the message leaves, a partition may be
    /// created, and the network may drop or duplicate the message.
    pub fn send(&mut self, message: N::Message, to: NodeId) -> NodeResult<()> {
        let from = self.node;
        if !self.state.resolver.contains(to) {
            return Err(SimulationError::UnknownNode(to).into());
        }
        let message_id = self.state.messages.len();
        let description = format!("{message:?}");
        self.state.messages.push(message);

        self.strategy.on_message_sent(from, to, message_id)?;

        if let Some(partition) = self.strategy.try_add_partition_before_send(from, to, message_id) {
            self.split(partition);
        }

        if !self.strategy.can_send(from, to) {
            self.state.record(Event::MessageDropped {
                from,
                to,
                message_id,
                reason: DropReason::Unreachable,
            });
            return Ok(());
        }

        let copies = self.strategy.get_message_rate(from, to, message_id);
        if copies == 0 {
            self.state.record(Event::MessageDropped {
                from,
                to,
                message_id,
                reason: DropReason::Lost,
            });
            return Ok(());
        }
        for _ in 0..copies {
            self.state.tasks.add_task(TaskKind::MessageReceive {
                from,
                to,
                message_id,
            });
        }
        self.state.record(Event::MessageSent {
            from,
            to,
            message_id,
            copies,
            message: description,
        });
        Ok(())
    }

    /// Send `message` to every other node, in id order.
    pub fn broadcast(&mut self, message: N::Message) -> NodeResult<()> {
        for to in self.state.resolver.nodes() {
            if to != self.node {
                self.send(message.clone(), to)?;
            }
        }
        Ok(())
    }

    /// Fire [`Node::on_timer`] once, `delay` ticks from now.
    pub fn set_timer(&mut self, name: impl Into<String>, delay: u64) {
        let kind = TaskKind::Timer {
            node: self.node,
            name: name.into(),
            period: None,
        };
        self.state.tasks.add_time_task(kind, delay);
    }

    /// Fire [`Node::on_timer`] every `period` ticks until the node crashes.
    ///
    /// Periodic timers never keep an invocation alive on their own.
    pub fn set_periodic_timer(&mut self, name: impl Into<String>, period: u64) {
        let period = period.max(1);
        let kind = TaskKind::Timer {
            node: self.node,
            name: name.into(),
            period: Some(period),
        };
        self.state.tasks.add_time_task(kind, period);
    }

    /// Park until `from` answers `request_id`.
    ///
    /// Replaces any previous pending response of this node.
    pub fn await_response(&mut self, from: NodeId, request_id: u64) {
        self.state.slots[self.node].awaiting = Some(PendingResponse { from, request_id });
    }

    /// Reply the node is waiting for, if any.
    pub fn pending_response(&self) -> Option<PendingResponse> {
        self.state.slots[self.node].awaiting
    }

    /// Complete the running operation with `output`.
    pub fn complete(&mut self, output: N::Output) -> NodeResult<()> {
        self.state.complete(self.node, output)
    }

    fn split(&mut self, partition: PartitionResult) {
        self.state.record(Event::PartitionCreated {
            partition_id: partition.partition_id,
            first_part: partition.first_part.clone(),
            second_part: partition.second_part.clone(),
        });
        let delay = self.strategy.get_recover_timeout(&self.state.tasks);
        self.state.tasks.add_time_task(
            TaskKind::PartitionRecover {
                partition_id: partition.partition_id,
                first_part: partition.first_part.clone(),
                second_part: partition.second_part.clone(),
            },
            delay,
        );
        // in-flight deliveries are cut once the step is over
        self.state.new_partitions.push(partition);
    }
}
