//! Runners execute invocations under the control of a strategy.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`Runner`] | contract the strategy drives |
//! | [`DistributedRunner`] | in-process runner for [`Node`] state machines |
//! | [`Environment`] | what a node sees while one of its handlers runs |
//! | [`DistributedBuilder`] | wires topology, nodes, scenario and verifier |
//! | [`DistributedReport`] | outcome of a whole run |

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use tidepool_core::{NodeId, SimulationResult};
use tracing::instrument;

use crate::failure::PartitionResult;
use crate::strategy::DistributedStrategy;

pub mod builder;
pub mod distributed;
pub mod environment;
pub mod events;
pub mod node;
pub mod report;
pub mod scenario;

pub use builder::DistributedBuilder;
pub use distributed::{DistributedRunner, NodeFactory};
pub use environment::{Environment, PendingResponse};
pub use events::{DropReason, Event, TraceEvent};
pub use node::{Node, ProtocolMessage};
pub use report::{DistributedReport, Failure, FailureKind, InvocationResult};
pub use scenario::{ExecutionResult, ExecutionScenario, OperationResult};

/// What one scheduling step of an invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<R> {
    /// A task ran. Partitions the strategy created while it ran, in creation
    /// order.
    Executed(Vec<PartitionResult>),
    /// The invocation is over.
    Finished(InvocationResult<R>),
}

/// Executes invocations of a scenario.
///
/// An invocation is a [`start_invocation`](Runner::start_invocation)
/// followed by [`step`](Runner::step)s until one reports
/// [`StepOutcome::Finished`]. The provided [`run`](Runner::run) drives that
/// loop and hands every partition created during a step to
/// [`on_partition`](Runner::on_partition) before the next step, so a runner
/// wrapping another one sees them too.
pub trait Runner {
    /// Operations of the scenario.
    type Operation;
    /// Values operations return.
    type Output;

    /// One-time setup before the first invocation.
    fn initialize(&mut self) -> SimulationResult<()>;

    /// Reset per-invocation state and schedule the first operations.
    fn start_invocation(&mut self);

    /// Ask `strategy` for the next task and execute it.
    fn step(&mut self, strategy: &mut dyn DistributedStrategy) -> StepOutcome<Self::Output>;

    /// Execute one invocation from a clean state, taking every scheduling
    /// decision from `strategy`.
    #[instrument(skip_all)]
    fn run(&mut self, strategy: &mut dyn DistributedStrategy) -> InvocationResult<Self::Output> {
        self.start_invocation();
        loop {
            match self.step(strategy) {
                StepOutcome::Executed(partitions) => {
                    for partition in partitions {
                        self.on_partition(
                            &partition.first_part,
                            &partition.second_part,
                            partition.partition_id,
                        );
                    }
                }
                StepOutcome::Finished(result) => return result,
            }
        }
    }

    /// Whether every operation of the current invocation is resolved.
    fn has_all_results(&self) -> bool;

    /// A partition was created; in-flight deliveries crossing it are lost.
    fn on_partition(&mut self, first: &[NodeId], second: &[NodeId], partition_id: usize);

    /// Snapshot of the runner state, for failure reports.
    fn construct_state_representation(&self) -> String;

    /// Persist the trace of the current invocation for `failure`. Returns
    /// the written file, if any.
    fn store_events_to_file(
        &self,
        failure: &Failure<Self::Output>,
    ) -> SimulationResult<Option<PathBuf>>;

    /// The scenario being executed.
    fn scenario(&self) -> &ExecutionScenario<Self::Operation>;

    /// Release resources. Called once, whatever the outcome of the run.
    fn close(&mut self);
}

/// Borrows a runner for the duration of a run and closes it on drop.
pub(crate) struct RunnerScope<'a, R: Runner> {
    runner: &'a mut R,
}

impl<'a, R: Runner> RunnerScope<'a, R> {
    pub(crate) fn new(runner: &'a mut R) -> Self {
        Self { runner }
    }
}

impl<R: Runner> Deref for RunnerScope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.runner
    }
}

impl<R: Runner> DerefMut for RunnerScope<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.runner
    }
}

impl<R: Runner> Drop for RunnerScope<'_, R> {
    fn drop(&mut self) {
        self.runner.close();
    }
}
