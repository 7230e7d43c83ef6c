//! Randomized strategy: uniform task selection with seeded fault injection.

use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tidepool_core::{
    AddressResolver, CrashMode, NetworkPartitionMode, NodeError, NodeId, NodeResult,
    SimulationResult,
};
use tracing::{debug, info, instrument, warn};

use super::DistributedStrategy;
use crate::config::DistributedConfiguration;
use crate::failure::{FailureManager, PartitionResult};
use crate::runner::{Failure, FailureKind, InvocationResult, Runner, RunnerScope};
use crate::sim::{ProbabilityModel, Task, TaskId, TaskManager};
use crate::verifier::Verifier;

/// Seeds of the invocations of a run.
///
/// Debug seeds are replayed first. Invocation `i` after them draws its seed
/// from stream `i` of a ChaCha8 generator keyed by the base seed, so the
/// same base seed yields the same seeds on every build.
#[derive(Debug, Clone)]
pub struct InvocationSeeds {
    base_seed: u64,
    debug_seeds: Vec<u64>,
}

impl InvocationSeeds {
    /// Seeds derived from `base_seed`, after replaying `debug_seeds`.
    pub fn new(base_seed: u64, debug_seeds: Vec<u64>) -> Self {
        Self {
            base_seed,
            debug_seeds,
        }
    }

    /// Seeds from the configuration, falling back to the wall clock.
    pub fn from_config(config: &DistributedConfiguration) -> Self {
        let base_seed = config.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos() as u64)
                .unwrap_or(0)
        });
        Self::new(base_seed, config.debug_seeds.clone())
    }

    /// Base seed of the run.
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Seed of invocation `invocation`.
    pub fn seed_for(&self, invocation: usize) -> u64 {
        if let Some(&seed) = self.debug_seeds.get(invocation) {
            return seed;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.base_seed);
        rng.set_stream(invocation as u64);
        rng.next_u64()
    }
}

/// Strategy picking tasks uniformly at random and injecting crashes and
/// partitions with the configured probabilities.
#[derive(Debug)]
pub struct DistributedRandomStrategy {
    config: DistributedConfiguration,
    resolver: Rc<AddressResolver>,
    probability: ProbabilityModel,
    failure_manager: FailureManager,
    seeds: InvocationSeeds,
    seeds_used: Vec<u64>,
}

impl DistributedRandomStrategy {
    /// Strategy for `resolver`'s topology.
    pub fn new(resolver: Rc<AddressResolver>, config: DistributedConfiguration) -> Self {
        let seeds = InvocationSeeds::from_config(&config);
        Self {
            probability: ProbabilityModel::new(config.probability.clone()),
            failure_manager: FailureManager::new(Rc::clone(&resolver)),
            seeds,
            seeds_used: Vec::new(),
            resolver,
            config,
        }
    }

    /// Live failure state.
    pub fn failure_manager(&self) -> &FailureManager {
        &self.failure_manager
    }

    /// Probability model.
    pub fn probability(&self) -> &ProbabilityModel {
        &self.probability
    }

    /// Configuration.
    pub fn config(&self) -> &DistributedConfiguration {
        &self.config
    }

    /// Seed source.
    pub fn seeds(&self) -> &InvocationSeeds {
        &self.seeds
    }

    /// Seeds of the invocations executed so far.
    pub fn seeds_used(&self) -> &[u64] {
        &self.seeds_used
    }

    /// Number of invocations executed so far.
    pub fn invocations_run(&self) -> usize {
        self.seeds_used.len()
    }

    /// Run up to `invocations_per_iteration` invocations and return the
    /// first failure.
    ///
    /// A completed invocation whose results `verifier` rejects becomes
    /// [`FailureKind::IncorrectResults`]; any other outcome but success maps
    /// to its own kind. The failing invocation's trace is stored before
    /// returning, and the runner is closed on every exit path.
    #[instrument(skip_all, fields(base_seed = self.seeds.base_seed()))]
    pub fn run<R, V>(&mut self, runner: &mut R, verifier: &V) -> Option<Failure<R::Output>>
    where
        R: Runner,
        V: Verifier<R::Operation, R::Output> + ?Sized,
    {
        let mut runner = RunnerScope::new(runner);
        if let Err(error) = runner.initialize() {
            warn!(%error, "runner initialization failed");
            return Some(Failure {
                invocation: 0,
                seed: self.seeds.base_seed(),
                kind: FailureKind::InternalError(error),
                state_representation: String::new(),
                trace_file: None,
            });
        }

        for invocation in 0..self.config.invocations_per_iteration {
            let seed = self.seeds.seed_for(invocation);
            info!("Starting invocation {} with seed {}", invocation, seed);
            self.reset(seed);
            self.seeds_used.push(seed);

            let kind = match runner.run(self) {
                InvocationResult::Completed(results) => {
                    if verifier.verify_results(runner.scenario(), &results) {
                        debug!(invocation, "results verified");
                        continue;
                    }
                    FailureKind::IncorrectResults(results)
                }
                other => match other.into_failure_kind() {
                    Some(kind) => kind,
                    None => continue,
                },
            };

            let mut failure = Failure {
                invocation,
                seed,
                kind,
                state_representation: runner.construct_state_representation(),
                trace_file: None,
            };
            warn!(invocation, seed, kind = failure.kind.name(), "invocation failed");
            match runner.store_events_to_file(&failure) {
                Ok(path) => failure.trace_file = path,
                Err(error) => warn!(%error, "failed to store invocation trace"),
            }
            return Some(failure);
        }

        info!(invocations = self.seeds_used.len(), "all invocations verified");
        None
    }
}

impl DistributedStrategy for DistributedRandomStrategy {
    fn try_crash(&mut self, node: NodeId) -> NodeResult<()> {
        if !self.resolver.crash_mode(node).allows_crashes() {
            return Ok(());
        }
        if !self.probability.node_failed() || !self.failure_manager.can_crash(node) {
            return Ok(());
        }
        self.failure_manager.crash_node(node)?;
        debug!(node, seed = self.probability.seed(), "crash injected");
        Err(NodeError::Crashed(node))
    }

    fn on_message_sent(
        &mut self,
        sender: NodeId,
        _receiver: NodeId,
        _message_id: usize,
    ) -> NodeResult<()> {
        self.try_crash(sender)
    }

    fn before_database_access(&mut self, node: NodeId) -> NodeResult<()> {
        if self.config.crash_before_database_access {
            self.try_crash(node)
        } else {
            Ok(())
        }
    }

    fn try_add_partition_before_send(
        &mut self,
        sender: NodeId,
        receiver: NodeId,
        _message_id: usize,
    ) -> Option<PartitionResult> {
        if self.resolver.partition_mode(sender) == NetworkPartitionMode::None {
            return None;
        }
        if !self.probability.is_network_partition()
            || !self.failure_manager.can_add_partition(sender, receiver)
        {
            return None;
        }
        let (candidates, limit) = self.failure_manager.partition_candidates(sender, receiver);
        let chosen = self.choose_partition_component(&candidates, limit);
        let partition = self
            .failure_manager
            .partition(sender, receiver, |_, _| chosen.clone());
        debug!(
            partition_id = partition.partition_id,
            sender,
            receiver,
            seed = self.probability.seed(),
            "partition injected"
        );
        Some(partition)
    }

    fn get_message_rate(
        &mut self,
        _sender: NodeId,
        _receiver: NodeId,
        _message_id: usize,
    ) -> usize {
        self.probability.duplication_rate()
    }

    fn choose_partition_component(&mut self, nodes: &[NodeId], limit: usize) -> Vec<NodeId> {
        self.probability.partition(nodes, limit)
    }

    fn get_recover_timeout(&mut self, tasks: &TaskManager) -> u64 {
        let default = self.probability.config().default_recover_timeout;
        let base = tasks
            .latest_deadline()
            .map(|deadline| deadline.saturating_sub(tasks.time()))
            .unwrap_or(default)
            .max(default);
        self.probability.recover_timeout(base)
    }

    fn recover_partition(&mut self, first: &[NodeId], second: &[NodeId]) {
        self.failure_manager.remove_partition(first, second);
    }

    fn should_recover(&mut self, node: NodeId) -> bool {
        match self.resolver.crash_mode(node) {
            CrashMode::NoCrashes | CrashMode::NoRecover => false,
            CrashMode::AllNodesRecover => true,
            CrashMode::MixedRecover => self.probability.node_recovered(),
        }
    }

    fn recover_node(&mut self, node: NodeId) -> SimulationResult<()> {
        self.failure_manager.recover_node(node)
    }

    fn can_send(&self, from: NodeId, to: NodeId) -> bool {
        self.failure_manager.can_send(from, to)
    }

    fn is_crashed(&self, node: NodeId) -> bool {
        self.failure_manager.is_crashed(node)
    }

    fn next(&mut self, tasks: &mut TaskManager, has_all_results: bool) -> Option<Task> {
        if tasks.tasks().is_empty() {
            let only_periodic = tasks
                .time_tasks()
                .iter()
                .all(|task| task.kind.is_periodic_timer());
            // `only_periodic` also holds when nothing is left at all
            if only_periodic && (has_all_results || tasks.time_tasks().is_empty()) {
                return None;
            }
        }

        loop {
            let now = tasks.time();
            let mut candidates: Vec<TaskId> = Vec::new();
            for task in tasks.time_tasks() {
                if task.time <= now || self.probability.poisson_probability(task.time - now) {
                    candidates.push(task.id);
                }
            }
            candidates.extend(tasks.tasks().iter().map(|task| task.id));

            if !candidates.is_empty() {
                let chosen = candidates[self.probability.choose_index(candidates.len())];
                return tasks.remove_task(chosen);
            }
            tasks.advance_time(1);
        }
    }

    fn reset(&mut self, seed: u64) {
        self.probability.reset(seed, self.config.crash_expectation);
        self.failure_manager.reset();
    }
}
