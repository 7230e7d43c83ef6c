//! In-process runner driving [`Node`] state machines.
//!
//! Each invocation starts from fresh node instances and empty logs. The
//! runner asks the strategy for the next task, resumes the node it belongs
//! to, and turns what the handler returns into runtime state:
//!
//! - `Ok` leaves the node running;
//! - the crash signal destroys the instance, records the running operation
//!   as crashed, cancels the node's operation and timer tasks, and schedules
//!   a recovery if the strategy wants one;
//! - a protocol error or a framework error ends the invocation.
//!
//! After a recovery or a healed partition, nodes whose pending response slot
//! waits on a peer they can reach again are woken with
//! [`Node::on_peer_reconnected`].
//!
//! Partitions created during a step are returned with
//! [`StepOutcome::Executed`]; deliveries crossing them are cut when the
//! caller hands them back through [`Runner::on_partition`], before the next
//! task is picked.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::rc::Rc;

use serde_json::json;
use tidepool_core::{
    AddressResolver, NodeError, NodeId, NodeResult, SimulationError, SimulationResult,
};
use tracing::{debug, info};

use super::environment::{Environment, InvocationState};
use super::events::{DropReason, Event, TraceEvent};
use super::node::{Node, ProtocolMessage};
use super::report::{Failure, InvocationResult};
use super::scenario::{ExecutionResult, ExecutionScenario, OperationResult};
use super::{Runner, StepOutcome};
use crate::config::DistributedConfiguration;
use crate::sim::{Task, TaskKind};
use crate::strategy::DistributedStrategy;

/// Builds the node instance for an id, at invocation start and after every
/// recovery.
pub type NodeFactory<N> = Rc<dyn Fn(NodeId, &AddressResolver) -> N>;

type Step<R> = Result<(), InvocationResult<R>>;

/// Runner for protocols written as [`Node`] implementations.
pub struct DistributedRunner<N: Node> {
    factory: NodeFactory<N>,
    nodes: Vec<Option<N>>,
    state: InvocationState<N>,
    max_tasks: usize,
    executed: usize,
    trace_directory: Option<PathBuf>,
    initialized: bool,
    closed: bool,
}

impl<N: Node> DistributedRunner<N> {
    /// Runner executing `scenario` on `resolver`'s topology.
    pub fn new(
        resolver: Rc<AddressResolver>,
        scenario: ExecutionScenario<N::Operation>,
        factory: NodeFactory<N>,
        config: &DistributedConfiguration,
    ) -> Self {
        Self {
            factory,
            nodes: Vec::new(),
            state: InvocationState::new(resolver, scenario),
            max_tasks: config.max_tasks_per_invocation,
            executed: 0,
            trace_directory: config.trace_directory.clone(),
            initialized: false,
            closed: false,
        }
    }

    /// Trace of the current (or last) invocation.
    pub fn events(&self) -> &[TraceEvent] {
        &self.state.events
    }

    /// Results of the current (or last) invocation.
    pub fn results(&self) -> &ExecutionResult<N::Output> {
        &self.state.results
    }

    /// Persistent log of `node`.
    pub fn log(&self, node: NodeId) -> &[N::LogEntry] {
        self.state.logs.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Live instance of `node`, `None` while it is crashed.
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node).and_then(Option::as_ref)
    }

    /// Whether [`Runner::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn execute(&mut self, task: Task, strategy: &mut dyn DistributedStrategy) -> Step<N::Output> {
        debug!(task = task.id, time = task.time, kind = ?task.kind, "executing task");
        match task.kind {
            TaskKind::Operation { node, index } => self.start_operation(node, index, strategy),
            TaskKind::MessageReceive {
                from,
                to,
                message_id,
            } => self.deliver(from, to, message_id, strategy),
            TaskKind::Timer { node, name, period } => {
                self.fire_timer(node, name, period, strategy)
            }
            TaskKind::NodeRecover { node } => self.recover(node, strategy),
            TaskKind::PartitionRecover {
                partition_id,
                first_part,
                second_part,
            } => {
                strategy.recover_partition(&first_part, &second_part);
                self.state.record(Event::PartitionRemoved { partition_id });
                self.wake_reconnected(strategy)
            }
        }
    }

    fn start_operation(
        &mut self,
        node: NodeId,
        index: usize,
        strategy: &mut dyn DistributedStrategy,
    ) -> Step<N::Output> {
        let Some(operation) = self.state.scenario.operations_for(node).get(index).cloned() else {
            return Err(InvocationResult::InternalError(SimulationError::InvalidState(
                format!("node {node} has no operation {index}"),
            )));
        };
        let slot = &mut self.state.slots[node];
        slot.running = Some(index);
        slot.next_operation = index + 1;
        self.state.record(Event::OperationStarted {
            node,
            index,
            operation: format!("{operation:?}"),
        });
        self.dispatch(node, strategy, |instance, env| {
            if let Some(output) = instance.invoke(env, &operation)? {
                env.complete(output)?;
            }
            Ok(())
        })
    }

    fn deliver(
        &mut self,
        from: NodeId,
        to: NodeId,
        message_id: usize,
        strategy: &mut dyn DistributedStrategy,
    ) -> Step<N::Output> {
        if strategy.is_crashed(to) || self.node(to).is_none() {
            self.state.record(Event::MessageDropped {
                from,
                to,
                message_id,
                reason: DropReason::ReceiverCrashed,
            });
            return Ok(());
        }
        let Some(message) = self.state.messages.get(message_id).cloned() else {
            return Err(InvocationResult::InternalError(SimulationError::InvalidState(
                format!("unknown message {message_id}"),
            )));
        };
        self.state.record(Event::MessageDelivered {
            from,
            to,
            message_id,
        });

        let matched = self.state.slots[to]
            .awaiting
            .filter(|pending| {
                pending.from == from && message.response_to() == Some(pending.request_id)
            });
        match matched {
            Some(pending) => {
                self.state.slots[to].awaiting = None;
                self.state.record(Event::ResponseMatched {
                    node: to,
                    from,
                    request_id: pending.request_id,
                });
                self.dispatch(to, strategy, |instance, env| {
                    instance.on_response(env, message, from)
                })
            }
            None => self.dispatch(to, strategy, |instance, env| {
                instance.on_message(env, message, from)
            }),
        }
    }

    fn fire_timer(
        &mut self,
        node: NodeId,
        name: String,
        period: Option<u64>,
        strategy: &mut dyn DistributedStrategy,
    ) -> Step<N::Output> {
        if self.node(node).is_none() {
            return Ok(());
        }
        if let Some(period) = period {
            let kind = TaskKind::Timer {
                node,
                name: name.clone(),
                period: Some(period),
            };
            self.state.tasks.add_time_task(kind, period);
        }
        self.state.record(Event::TimerFired {
            node,
            name: name.clone(),
        });
        self.dispatch(node, strategy, |instance, env| instance.on_timer(env, &name))
    }

    fn recover(&mut self, node: NodeId, strategy: &mut dyn DistributedStrategy) -> Step<N::Output> {
        strategy
            .recover_node(node)
            .map_err(InvocationResult::InternalError)?;
        let instance = (self.factory)(node, &self.state.resolver);
        self.nodes[node] = Some(instance);
        self.state.record(Event::NodeRecovered { node });
        debug!(node, "node recovered");

        self.dispatch(node, strategy, |instance, env| instance.recover(env))?;
        if self.node(node).is_some() {
            self.state.schedule_next_operation(node);
        }
        self.wake_reconnected(strategy)
    }

    fn wake_reconnected(&mut self, strategy: &mut dyn DistributedStrategy) -> Step<N::Output> {
        for node in self.state.resolver.nodes() {
            let Some(pending) = self.state.slots[node].awaiting else {
                continue;
            };
            if self.node(node).is_none()
                || !strategy.can_send(node, pending.from)
                || !strategy.can_send(pending.from, node)
            {
                continue;
            }
            self.state.slots[node].awaiting = None;
            self.state.record(Event::PeerReconnected {
                node,
                peer: pending.from,
            });
            self.dispatch(node, strategy, |instance, env| {
                instance.on_peer_reconnected(env, pending.from)
            })?;
        }
        Ok(())
    }

    /// Run one handler of `node` and turn its result into runtime state.
    fn dispatch(
        &mut self,
        node: NodeId,
        strategy: &mut dyn DistributedStrategy,
        handler: impl FnOnce(&mut N, &mut Environment<'_, N>) -> NodeResult<()>,
    ) -> Step<N::Output> {
        let Some(instance) = self.nodes.get_mut(node).and_then(Option::as_mut) else {
            return Ok(());
        };
        let mut env = Environment::new(node, &mut self.state, &mut *strategy);
        match handler(instance, &mut env) {
            Ok(()) => Ok(()),
            Err(NodeError::Crashed(crashed)) => {
                self.on_crash(crashed, strategy);
                Ok(())
            }
            Err(NodeError::Protocol(message)) => {
                Err(InvocationResult::UnexpectedError { node, message })
            }
            Err(NodeError::Simulation(error)) => Err(InvocationResult::InternalError(error)),
        }
    }

    fn on_crash(&mut self, node: NodeId, strategy: &mut dyn DistributedStrategy) {
        self.nodes[node] = None;
        self.state.tasks.remove_node_tasks(node);

        let slot = &mut self.state.slots[node];
        slot.awaiting = None;
        if let Some(index) = slot.running.take() {
            self.state.results.set(node, index, OperationResult::Crashed);
        }

        let will_recover = strategy.should_recover(node);
        if will_recover {
            let delay = strategy.get_recover_timeout(&self.state.tasks);
            self.state
                .tasks
                .add_time_task(TaskKind::NodeRecover { node }, delay);
        } else {
            // operations that will never start
            let count = self.state.operation_count(node);
            let slot = &mut self.state.slots[node];
            for index in slot.next_operation..count {
                self.state.results.set(node, index, OperationResult::Crashed);
            }
            slot.next_operation = count;
        }
        self.state.record(Event::NodeCrashed { node, will_recover });
        debug!(node, will_recover, "node crashed");
    }
}

impl<N: Node> Runner for DistributedRunner<N> {
    type Operation = N::Operation;
    type Output = N::Output;

    fn initialize(&mut self) -> SimulationResult<()> {
        let node_count = self.state.resolver.node_count();
        if self.state.scenario.node_count() > node_count {
            return Err(SimulationError::InvalidConfiguration(format!(
                "scenario has operations for {} nodes but the topology has {}",
                self.state.scenario.node_count(),
                node_count
            )));
        }
        self.initialized = true;
        self.closed = false;
        Ok(())
    }

    fn start_invocation(&mut self) {
        self.state.reset();
        self.executed = 0;
        let resolver = Rc::clone(&self.state.resolver);
        self.nodes = resolver
            .nodes()
            .map(|node| Some((self.factory)(node, &resolver)))
            .collect();
        for node in resolver.nodes() {
            self.state.schedule_next_operation(node);
        }
    }

    fn step(&mut self, strategy: &mut dyn DistributedStrategy) -> StepOutcome<N::Output> {
        if !self.initialized {
            return StepOutcome::Finished(InvocationResult::InternalError(
                SimulationError::InvalidState("runner used before initialize()".to_string()),
            ));
        }
        let has_all_results = self.has_all_results();
        let Some(task) = strategy.next(&mut self.state.tasks, has_all_results) else {
            debug!(
                executed = self.executed,
                time = self.state.tasks.time(),
                "invocation drained"
            );
            let results = self.state.results.clone();
            return StepOutcome::Finished(if has_all_results {
                InvocationResult::Completed(results)
            } else {
                InvocationResult::Deadlock(results)
            });
        };
        if self.executed >= self.max_tasks {
            return StepOutcome::Finished(InvocationResult::Timeout {
                tasks_executed: self.executed,
            });
        }
        self.executed += 1;
        match self.execute(task, strategy) {
            Ok(()) => StepOutcome::Executed(std::mem::take(&mut self.state.new_partitions)),
            Err(outcome) => StepOutcome::Finished(outcome),
        }
    }

    fn has_all_results(&self) -> bool {
        self.state.results.is_complete()
    }

    fn on_partition(&mut self, first: &[NodeId], second: &[NodeId], partition_id: usize) {
        self.state.drop_crossing(first, second, partition_id);
    }

    fn construct_state_representation(&self) -> String {
        let resolver = &self.state.resolver;
        let nodes: Vec<serde_json::Value> = resolver
            .nodes()
            .map(|node| {
                let slot = &self.state.slots[node];
                let instance = self.node(node);
                json!({
                    "node": node,
                    "type": resolver.type_name(resolver.node_type(node)),
                    "alive": instance.is_some(),
                    "running_operation": slot.running,
                    "next_operation": slot.next_operation,
                    "awaiting": slot.awaiting,
                    "log_entries": self.state.logs[node].len(),
                    "state": instance.and_then(|node| node.state_representation()),
                })
            })
            .collect();
        let snapshot = json!({
            "time": self.state.tasks.time(),
            "ready_tasks": self.state.tasks.tasks().len(),
            "timed_tasks": self.state.tasks.time_tasks().len(),
            "nodes": nodes,
        });
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| snapshot.to_string())
    }

    fn store_events_to_file(
        &self,
        failure: &Failure<N::Output>,
    ) -> SimulationResult<Option<PathBuf>> {
        let Some(directory) = &self.trace_directory else {
            return Ok(None);
        };
        fs::create_dir_all(directory)?;
        let path = directory.join(format!(
            "tidepool-{}-seed-{}.json",
            failure.kind.name(),
            failure.seed
        ));
        let document = json!({
            "failure": failure.to_string(),
            "kind": failure.kind.name(),
            "invocation": failure.invocation,
            "seed": failure.seed,
            "scenario": format!("{:?}", self.state.scenario),
            "events": &self.state.events,
        });
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &document)
            .map_err(|error| SimulationError::IoError(error.to_string()))?;
        info!(path = %path.display(), "invocation trace stored");
        Ok(Some(path))
    }

    fn scenario(&self) -> &ExecutionScenario<N::Operation> {
        &self.state.scenario
    }

    fn close(&mut self) {
        self.nodes.clear();
        self.closed = true;
        debug!("runner closed");
    }
}
