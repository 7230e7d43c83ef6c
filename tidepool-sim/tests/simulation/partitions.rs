//! Partition notifications go through the `Runner` trait.

use std::path::PathBuf;
use std::rc::Rc;

use tidepool_sim::simulations::kv_sharding::{kv_scenario, KvNode, KvOperation, KvVerifier};
use tidepool_sim::simulations::kv_topology;
use tidepool_sim::{
    DistributedConfiguration, DistributedRandomStrategy, DistributedRunner, DistributedStrategy,
    Event, ExecutionScenario, Failure, NodeId, Runner, SimulationResult, StepOutcome,
};

/// Forwards everything to a [`DistributedRunner`] and remembers which
/// partitions it was told about.
struct Counting {
    inner: DistributedRunner<KvNode>,
    notified: Vec<usize>,
}

impl Runner for Counting {
    type Operation = KvOperation;
    type Output = Option<String>;

    fn initialize(&mut self) -> SimulationResult<()> {
        self.inner.initialize()
    }

    fn start_invocation(&mut self) {
        self.notified.clear();
        self.inner.start_invocation();
    }

    fn step(&mut self, strategy: &mut dyn DistributedStrategy) -> StepOutcome<Option<String>> {
        self.inner.step(strategy)
    }

    fn has_all_results(&self) -> bool {
        self.inner.has_all_results()
    }

    fn on_partition(&mut self, first: &[NodeId], second: &[NodeId], partition_id: usize) {
        self.notified.push(partition_id);
        self.inner.on_partition(first, second, partition_id);
    }

    fn construct_state_representation(&self) -> String {
        self.inner.construct_state_representation()
    }

    fn store_events_to_file(
        &self,
        failure: &Failure<Option<String>>,
    ) -> SimulationResult<Option<PathBuf>> {
        self.inner.store_events_to_file(failure)
    }

    fn scenario(&self) -> &ExecutionScenario<KvOperation> {
        self.inner.scenario()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

fn partition_heavy(seed: u64) -> DistributedConfiguration {
    let mut config = DistributedConfiguration::reliable();
    config.seed = Some(seed);
    config.invocations_per_iteration = 1;
    config.max_tasks_per_invocation = 2_000;
    config.probability.partition_probability = 1.0;
    config
}

fn counting_run(seed: u64) -> Counting {
    crate::init_tracing();
    let resolver = Rc::new(kv_topology().expect("valid topology"));
    let config = partition_heavy(seed);
    let mut runner = Counting {
        inner: DistributedRunner::new(
            Rc::clone(&resolver),
            kv_scenario(resolver.node_count(), 6),
            Rc::new(KvNode::new),
            &config,
        ),
        notified: Vec::new(),
    };
    let mut strategy = DistributedRandomStrategy::new(resolver, config);
    // the outcome does not matter here, only the notifications
    let _ = strategy.run(&mut runner, &KvVerifier);
    runner
}

#[test]
fn wrapping_runner_is_told_about_every_partition() {
    for seed in [3, 8, 21] {
        let runner = counting_run(seed);
        let created: Vec<usize> = runner
            .inner
            .events()
            .iter()
            .filter_map(|trace| match trace.event {
                Event::PartitionCreated { partition_id, .. } => Some(partition_id),
                _ => None,
            })
            .collect();

        assert!(!created.is_empty(), "seed {seed}: no partition created");
        assert_eq!(runner.notified, created, "seed {seed}");
    }
}

#[test]
fn deliveries_crossing_a_partition_never_arrive() {
    let runner = counting_run(3);
    let events = runner.inner.events();

    for (position, trace) in events.iter().enumerate() {
        let Event::PartitionCreated {
            partition_id,
            first_part,
            second_part,
        } = &trace.event
        else {
            continue;
        };
        let crosses = |from: &NodeId, to: &NodeId| {
            (first_part.contains(from) && second_part.contains(to))
                || (second_part.contains(from) && first_part.contains(to))
        };
        for later in &events[position + 1..] {
            match &later.event {
                Event::PartitionRemoved { partition_id: healed } if healed == partition_id => {
                    break;
                }
                Event::MessageDelivered { from, to, .. } => {
                    assert!(
                        !crosses(from, to),
                        "{from} -> {to} delivered across partition {partition_id}"
                    );
                }
                _ => {}
            }
        }
    }
}
