//! Runner outcomes on toy protocols.

use tidepool_sim::{
    verifier_fn, CrashMode, DistributedConfiguration, Event, ExecutionResult, ExecutionScenario,
    FailureKind, NodeTypeConfig, OperationResult, SimulationError,
};

use crate::toy::{run_toy, AcceptAll, Behavior};

fn config(seed: u64, invocations: usize) -> DistributedConfiguration {
    let mut config = DistributedConfiguration::reliable();
    config.seed = Some(seed);
    config.invocations_per_iteration = invocations;
    config
}

fn always_crashing(seed: u64) -> DistributedConfiguration {
    let mut config = config(seed, 1);
    config.crash_expectation = 1_000;
    config
}

#[test]
fn request_reply_completes_every_operation() {
    let verifier = verifier_fn(
        "pongs",
        |_: &ExecutionScenario<()>, results: &ExecutionResult<usize>| {
            (0..3).all(|node| {
                results
                    .results_for(node)
                    .iter()
                    .all(|result| *result == OperationResult::Value((node + 1) % 3))
            })
        },
    );
    let run = run_toy(
        NodeTypeConfig::new("node", 3),
        Behavior::PingNext,
        2,
        config(1, 5),
        verifier.as_ref(),
    );

    assert!(run.failure.is_none(), "{:?}", run.failure);
    assert_eq!(run.strategy.invocations_run(), 5);
    assert_eq!(run.runner.results().completed_count(), 6);
    assert!(run
        .runner
        .events()
        .iter()
        .any(|trace| matches!(trace.event, Event::ResponseMatched { .. })));
    assert!(run.runner.is_closed());
}

#[test]
fn reply_that_never_comes_is_a_deadlock() {
    let run = run_toy(
        NodeTypeConfig::new("node", 2),
        Behavior::Silent,
        1,
        config(2, 3),
        &AcceptAll,
    );

    let failure = run.failure.expect("deadlock");
    assert_eq!(failure.invocation, 0);
    assert_eq!(failure.seed, run.strategy.seeds_used()[0]);
    match failure.kind {
        FailureKind::Deadlock(results) => assert_eq!(results.completed_count(), 0),
        other => panic!("expected a deadlock, got {}", other.name()),
    }
    assert!(failure.state_representation.contains("\"awaiting\""));
}

#[test]
fn periodic_timer_without_progress_times_out() {
    let mut config = config(3, 1);
    config.max_tasks_per_invocation = 50;
    let run = run_toy(
        NodeTypeConfig::new("node", 2),
        Behavior::Ticking,
        1,
        config,
        &AcceptAll,
    );

    let failure = run.failure.expect("timeout");
    assert_eq!(failure.kind, FailureKind::Timeout { tasks_executed: 50 });
    assert!(run
        .runner
        .events()
        .iter()
        .any(|trace| matches!(trace.event, Event::TimerFired { .. })));
}

#[test]
fn protocol_error_is_unexpected() {
    let run = run_toy(
        NodeTypeConfig::new("node", 2),
        Behavior::Failing,
        1,
        config(4, 10),
        &AcceptAll,
    );

    let failure = run.failure.expect("unexpected error");
    assert_eq!(run.strategy.invocations_run(), 1);
    match failure.kind {
        FailureKind::UnexpectedError { node, message } => {
            assert!(node < 2);
            assert_eq!(message, "bad state");
        }
        other => panic!("expected an unexpected error, got {}", other.name()),
    }
}

#[test]
fn crash_without_recovery_resolves_the_remaining_operations() {
    let run = run_toy(
        NodeTypeConfig::new("node", 2)
            .max_failures(1)
            .crash_mode(CrashMode::NoRecover),
        Behavior::Chatty,
        2,
        always_crashing(5),
        &AcceptAll,
    );

    assert!(run.failure.is_none(), "{:?}", run.failure);
    let results = run.runner.results();
    assert_eq!(results.crashed_count(), 2);
    assert_eq!(results.completed_count(), 2);

    let crashed: Vec<_> = run
        .runner
        .events()
        .iter()
        .filter_map(|trace| match trace.event {
            Event::NodeCrashed { node, will_recover } => Some((node, will_recover)),
            _ => None,
        })
        .collect();
    assert_eq!(crashed.len(), 1);
    let (node, will_recover) = crashed[0];
    assert!(!will_recover);
    assert!(results
        .results_for(node)
        .iter()
        .all(|result| *result == OperationResult::Crashed));
}

#[test]
fn recovered_nodes_come_back_fresh_with_their_log() {
    let run = run_toy(
        NodeTypeConfig::new("node", 2)
            .max_failures(1)
            .crash_mode(CrashMode::AllNodesRecover),
        Behavior::Chatty,
        2,
        always_crashing(6),
        &AcceptAll,
    );

    assert!(run.failure.is_none(), "{:?}", run.failure);
    let recovered: Vec<_> = run
        .runner
        .events()
        .iter()
        .filter_map(|trace| match trace.event {
            Event::NodeRecovered { node } => Some(node),
            _ => None,
        })
        .collect();
    assert!(!recovered.is_empty());
    for &node in &recovered {
        assert!(run
            .runner
            .log(node)
            .contains(&format!("recovered {node}")));
    }
    assert!(run.runner.results().is_complete());
}

#[test]
fn scenario_larger_than_the_cluster_is_an_internal_error() {
    use std::rc::Rc;

    use tidepool_sim::{AddressResolver, DistributedRandomStrategy, DistributedRunner};

    use crate::toy::ToyNode;

    let resolver = Rc::new(
        AddressResolver::single_type(NodeTypeConfig::new("node", 2)).expect("valid topology"),
    );
    let config = config(7, 4);
    let mut runner = DistributedRunner::new(
        Rc::clone(&resolver),
        ExecutionScenario::new(vec![vec![()]; 3]),
        Rc::new(|id, _: &AddressResolver| ToyNode::new(id, Behavior::Chatty)),
        &config,
    );
    let mut strategy = DistributedRandomStrategy::new(resolver, config);

    let failure = strategy.run(&mut runner, &AcceptAll).expect("initialize fails");
    assert!(matches!(
        failure.kind,
        FailureKind::InternalError(SimulationError::InvalidConfiguration(_))
    ));
    assert_eq!(strategy.invocations_run(), 0);
    assert!(runner.is_closed());
}
