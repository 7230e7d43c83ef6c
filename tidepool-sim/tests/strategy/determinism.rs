//! Same seed, same decisions.

use std::rc::Rc;

use tidepool_sim::{
    AddressResolver, CrashMode, DistributedConfiguration, DistributedRandomStrategy,
    DistributedStrategy, NetworkPartitionMode, NodeTypeConfig, TaskId, TaskKind, TaskManager,
};

#[derive(Debug, PartialEq)]
enum Decision {
    Picked(TaskId, u64),
    Crash(usize, bool),
    Partition(usize, Option<Vec<usize>>),
    Copies(usize),
    RecoverAfter(u64),
}

fn record(seed: u64) -> Vec<Decision> {
    let resolver = AddressResolver::single_type(
        NodeTypeConfig::new("replica", 5)
            .max_failures(2)
            .crash_mode(CrashMode::MixedRecover)
            .partition_mode(NetworkPartitionMode::Components),
    )
    .expect("valid topology");
    let mut config = DistributedConfiguration::unreliable();
    config.crash_expectation = 20;
    config.probability.partition_probability = 0.2;
    let mut strategy = DistributedRandomStrategy::new(Rc::new(resolver), config);
    strategy.reset(seed);

    let mut tasks = TaskManager::new();
    for node in 0..5 {
        tasks.add_task(TaskKind::Operation { node, index: 0 });
        tasks.add_time_task(TaskKind::NodeRecover { node }, 3 + node as u64);
    }

    let mut decisions = Vec::new();
    let mut step = 0;
    while let Some(task) = strategy.next(&mut tasks, false) {
        decisions.push(Decision::Picked(task.id, tasks.time()));

        let sender = step % 5;
        let receiver = (step + 1) % 5;
        step += 1;
        if strategy.is_crashed(sender) || strategy.is_crashed(receiver) {
            continue;
        }
        let crashed = strategy.on_message_sent(sender, receiver, step).is_err();
        decisions.push(Decision::Crash(sender, crashed));
        if crashed {
            decisions.push(Decision::RecoverAfter(strategy.get_recover_timeout(&tasks)));
            continue;
        }
        let partition = strategy.try_add_partition_before_send(sender, receiver, step);
        decisions.push(Decision::Partition(
            step,
            partition.map(|partition| partition.first_part),
        ));
        decisions.push(Decision::Copies(
            strategy.get_message_rate(sender, receiver, step),
        ));
    }
    decisions
}

#[test]
fn same_seed_replays_every_decision() {
    for seed in [0, 1, 42, 0xdead_beef] {
        let first = record(seed);
        let second = record(seed);
        assert!(!first.is_empty());
        assert_eq!(first, second, "seed {seed}");
    }
}

#[test]
fn different_seeds_diverge() {
    let runs: Vec<Vec<Decision>> = (0..8).map(record).collect();
    assert!(runs.iter().any(|run| *run != runs[0]));
}
