//! Sharded key-value store under crashes, partitions and duplication.

use std::rc::Rc;

use tidepool_sim::simulations::kv_sharding::{kv_scenario, KvNode, KvVerifier};
use tidepool_sim::simulations::{kv_topology, run_kv_sharding};
use tidepool_sim::{
    DistributedConfiguration, DistributedRandomStrategy, DistributedRunner, Event, Runner,
    TraceEvent,
};

fn kv_config(seed: u64, invocations: usize) -> DistributedConfiguration {
    let mut config = DistributedConfiguration::unreliable();
    config.seed = Some(seed);
    config.invocations_per_iteration = invocations;
    config
}

#[test]
fn kv_store_survives_faults() {
    crate::init_tracing();
    let report = run_kv_sharding(kv_config(2024, 40), 6).expect("complete builder");
    assert!(report.is_success(), "{report}");
    assert_eq!(report.invocations, 40);
    assert_eq!(report.seeds_used.len(), 40);
}

#[test]
fn kv_store_survives_crashes_at_log_access() {
    crate::init_tracing();
    let mut config = kv_config(77, 40);
    config.crash_before_database_access = true;
    config.crash_expectation = 5;
    let report = run_kv_sharding(config, 6).expect("complete builder");
    assert!(report.is_success(), "{report}");
}

fn single_invocation(seed: u64) -> (Vec<TraceEvent>, bool) {
    let resolver = Rc::new(kv_topology().expect("valid topology"));
    let mut config = kv_config(seed, 1);
    config.crash_expectation = 5;
    let mut runner = DistributedRunner::new(
        Rc::clone(&resolver),
        kv_scenario(resolver.node_count(), 6),
        Rc::new(KvNode::new),
        &config,
    );
    let mut strategy = DistributedRandomStrategy::new(resolver, config);
    let failure = strategy.run(&mut runner, &KvVerifier);
    assert!(failure.is_none(), "{failure:?}");
    (runner.events().to_vec(), runner.has_all_results())
}

#[test]
fn same_seed_produces_the_same_trace() {
    for seed in [1, 99, 4096] {
        let (first, _) = single_invocation(seed);
        let (second, _) = single_invocation(seed);
        assert!(!first.is_empty());
        assert_eq!(first, second, "seed {seed}");
    }
}

#[test]
fn faults_are_actually_injected() {
    let mut crashes = 0;
    let mut partitions = 0;
    let mut duplicates = 0;
    for seed in 0..30 {
        let (events, complete) = single_invocation(seed);
        assert!(complete, "seed {seed}");
        for trace in &events {
            match trace.event {
                Event::NodeCrashed { .. } => crashes += 1,
                Event::PartitionCreated { .. } => partitions += 1,
                Event::MessageSent { copies, .. } if copies > 1 => duplicates += 1,
                _ => {}
            }
        }
    }
    assert!(crashes > 0, "no crash in 30 invocations");
    assert!(partitions > 0, "no partition in 30 invocations");
    assert!(duplicates > 0, "no duplicated message in 30 invocations");
}
