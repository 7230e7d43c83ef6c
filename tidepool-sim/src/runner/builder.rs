//! Builder wiring a topology, a node factory, a scenario and a verifier into
//! a seeded run.

use std::path::PathBuf;
use std::rc::Rc;

use tidepool_core::{AddressResolver, NodeId, SimulationError, SimulationResult};
use tracing::{info, instrument};

use super::distributed::{DistributedRunner, NodeFactory};
use super::node::Node;
use super::report::DistributedReport;
use super::scenario::{ExecutionResult, ExecutionScenario};
use crate::config::DistributedConfiguration;
use crate::strategy::DistributedRandomStrategy;
use crate::verifier::{verifier_fn, Verifier};

/// Builder for a [`DistributedRandomStrategy`] run over a
/// [`DistributedRunner`].
///
/// # Example
///
/// ```ignore
/// let report = DistributedBuilder::new(resolver)
///     .invocations(50)
///     .seed(42)
///     .scenario(kv_scenario(3, 4))
///     .nodes(KvNode::new)
///     .verifier(KvVerifier)
///     .run()?;
/// assert!(report.is_success(), "{report}");
/// ```
pub struct DistributedBuilder<N: Node> {
    resolver: AddressResolver,
    config: DistributedConfiguration,
    scenario: Option<ExecutionScenario<N::Operation>>,
    factory: Option<NodeFactory<N>>,
    verifier: Option<Box<dyn Verifier<N::Operation, N::Output>>>,
}

impl<N: Node + 'static> DistributedBuilder<N> {
    /// Builder for `resolver`'s topology with the default configuration.
    pub fn new(resolver: AddressResolver) -> Self {
        Self {
            resolver,
            config: DistributedConfiguration::default(),
            scenario: None,
            factory: None,
            verifier: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: DistributedConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Set the number of invocations.
    pub fn invocations(mut self, invocations: usize) -> Self {
        self.config.invocations_per_iteration = invocations;
        self
    }

    /// Set the base seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Replay these seeds first, one per invocation.
    pub fn debug_seeds(mut self, seeds: Vec<u64>) -> Self {
        self.config.debug_seeds = seeds;
        self
    }

    /// Write the trace of a failing invocation under `directory`.
    pub fn trace_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.trace_directory = Some(directory.into());
        self
    }

    /// Operations to execute.
    pub fn scenario(mut self, scenario: ExecutionScenario<N::Operation>) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Factory building node instances, called at every invocation start and
    /// after every recovery.
    pub fn nodes(mut self, factory: impl Fn(NodeId, &AddressResolver) -> N + 'static) -> Self {
        self.factory = Some(Rc::new(factory));
        self
    }

    /// Verifier judging completed invocations.
    pub fn verifier(mut self, verifier: impl Verifier<N::Operation, N::Output> + 'static) -> Self {
        self.verifier = Some(Box::new(verifier));
        self
    }

    /// Closure-based verifier.
    pub fn verifier_fn<F>(mut self, name: &str, check: F) -> Self
    where
        F: Fn(&ExecutionScenario<N::Operation>, &ExecutionResult<N::Output>) -> bool + 'static,
    {
        self.verifier = Some(verifier_fn(name, check));
        self
    }

    /// Run the invocations and report the first failure.
    ///
    /// Fails only on an incomplete builder; simulation failures are part of
    /// the report.
    #[instrument(skip_all)]
    pub fn run(self) -> SimulationResult<DistributedReport<N::Output>> {
        let scenario = self.scenario.ok_or_else(|| missing("scenario"))?;
        let factory = self.factory.ok_or_else(|| missing("node factory"))?;
        let verifier = self.verifier.ok_or_else(|| missing("verifier"))?;

        let resolver = Rc::new(self.resolver);
        let mut runner =
            DistributedRunner::new(Rc::clone(&resolver), scenario, factory, &self.config);
        let mut strategy = DistributedRandomStrategy::new(resolver, self.config);
        info!(
            base_seed = strategy.seeds().base_seed(),
            verifier = verifier.name(),
            "starting distributed simulation"
        );

        let failure = strategy.run(&mut runner, verifier.as_ref());
        Ok(DistributedReport {
            invocations: strategy.invocations_run(),
            seeds_used: strategy.seeds_used().to_vec(),
            failure,
        })
    }
}

fn missing(what: &str) -> SimulationError {
    SimulationError::InvalidConfiguration(format!("distributed builder has no {what}"))
}
