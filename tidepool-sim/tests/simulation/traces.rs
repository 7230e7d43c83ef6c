//! Failure reports and persisted traces.

use std::fs;

use tidepool_sim::simulations::kv_sharding::{kv_scenario, KvNode};
use tidepool_sim::simulations::{kv_sharding_config, kv_topology};
use tidepool_sim::{DistributedBuilder, FailureKind, SimulationError};

#[test]
fn rejected_results_stop_the_run_and_write_a_trace() {
    crate::init_tracing();
    let directory = tempfile::tempdir().expect("temp dir");

    let report = DistributedBuilder::<KvNode>::new(kv_topology().expect("valid topology"))
        .seed(5)
        .invocations(10)
        .trace_directory(directory.path())
        .scenario(kv_scenario(3, 3))
        .nodes(KvNode::new)
        .verifier_fn("reject_everything", |_, _| false)
        .run()
        .expect("complete builder");

    assert!(!report.is_success());
    assert_eq!(report.invocations, 1);
    let failure = report.failure.as_ref().expect("failure");
    assert!(matches!(failure.kind, FailureKind::IncorrectResults(_)));
    assert_eq!(failure.seed, report.seeds_used[0]);

    let path = failure.trace_file.as_ref().expect("trace written");
    assert!(path.starts_with(directory.path()));
    let trace: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path).expect("readable trace"))
            .expect("valid json");
    assert_eq!(trace["kind"], "incorrect_results");
    assert_eq!(trace["seed"], failure.seed);
    assert!(trace["events"]
        .as_array()
        .is_some_and(|events| !events.is_empty()));

    let text = report.to_string();
    assert!(text.contains("Replay seed"));
    assert!(text.contains(&failure.seed.to_string()));
}

#[test]
fn failing_seed_replays_as_a_debug_seed() {
    let first = DistributedBuilder::<KvNode>::new(kv_topology().expect("valid topology"))
        .seed(11)
        .invocations(3)
        .scenario(kv_scenario(3, 3))
        .nodes(KvNode::new)
        .verifier_fn("reject_everything", |_, _| false)
        .run()
        .expect("complete builder");
    let failing = first.failure.expect("failure");

    let replay = DistributedBuilder::<KvNode>::new(kv_topology().expect("valid topology"))
        .debug_seeds(vec![failing.seed])
        .invocations(1)
        .scenario(kv_scenario(3, 3))
        .nodes(KvNode::new)
        .verifier_fn("reject_everything", |_, _| false)
        .run()
        .expect("complete builder");
    let replayed = replay.failure.expect("failure");

    assert_eq!(replayed.seed, failing.seed);
    assert_eq!(replayed.kind, failing.kind);
    assert_eq!(replayed.state_representation, failing.state_representation);
}

#[test]
fn binary_seed_argument_replays_the_reported_failure() {
    let directory = tempfile::tempdir().expect("temp dir");
    let run = |config: tidepool_sim::DistributedConfiguration| {
        let mut config = config;
        config.trace_directory = Some(directory.path().to_path_buf());
        DistributedBuilder::<KvNode>::new(kv_topology().expect("valid topology"))
            .config(config)
            .scenario(kv_scenario(3, 3))
            .nodes(KvNode::new)
            .verifier_fn("reject_everything", |_, _| false)
            .run()
            .expect("complete builder")
    };

    let mut first = kv_sharding_config(Some(3), None);
    first.seed = Some(17);
    let failing = run(first).failure.expect("failure");

    let replayed = run(kv_sharding_config(Some(1), Some(failing.seed)))
        .failure
        .expect("failure");

    assert_eq!(replayed.seed, failing.seed);
    assert_eq!(replayed.kind, failing.kind);
    assert_eq!(replayed.state_representation, failing.state_representation);
}

#[test]
fn incomplete_builder_is_rejected() {
    let result = DistributedBuilder::<KvNode>::new(kv_topology().expect("valid topology"))
        .scenario(kv_scenario(3, 1))
        .nodes(KvNode::new)
        .run();
    assert!(matches!(result, Err(SimulationError::InvalidConfiguration(_))));
}
