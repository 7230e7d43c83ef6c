//! Component model: minority/majority sets per node type.

use std::rc::Rc;

use tidepool_sim::{
    AddressResolver, ComponentFailureManager, CrashMode, FailureManager, FailureTopology,
    NetworkPartitionMode, NodeTypeConfig, NodeTypeId,
};

fn three_nodes() -> Rc<AddressResolver> {
    Rc::new(
        AddressResolver::single_type(
            NodeTypeConfig::new("replica", 3)
                .max_failures(1)
                .crash_mode(CrashMode::AllNodesRecover)
                .partition_mode(NetworkPartitionMode::Components),
        )
        .expect("valid topology"),
    )
}

#[test]
fn crash_consumes_the_budget_and_recovery_frees_it() {
    let mut manager = FailureManager::new(three_nodes());
    assert_eq!(manager.topology(), FailureTopology::Components);

    assert!(manager.can_crash(0));
    manager.crash_node(0).expect("node 0 is up");
    assert!(!manager.can_send(0, 1));
    assert!(!manager.can_send(1, 0));
    assert!(manager.can_send(1, 2));
    assert!(!manager.can_crash(1), "budget exhausted");
    assert!(!manager.can_crash(2), "budget exhausted");

    manager.recover_node(0).expect("node 0 is down");
    assert!(manager.can_send(0, 1));
    for node in 0..3 {
        assert!(manager.can_crash(node));
    }
}

#[test]
fn crash_and_recover_check_their_preconditions() {
    let mut manager = FailureManager::new(three_nodes());
    assert!(manager.recover_node(1).is_err());
    manager.crash_node(1).expect("node 1 is up");
    assert!(manager.crash_node(1).is_err());
    assert!(!manager.can_crash(1));
}

#[test]
fn partition_isolates_the_minority() {
    let mut manager = ComponentFailureManager::new(three_nodes());
    assert!(manager.can_add_partition(0, 1));

    let mut limits = Vec::new();
    let result = manager.partition(0, 1, |peers, limit| {
        limits.push((peers.to_vec(), limit));
        Vec::new()
    });

    // one slot of budget left after node 0, type size 3 halves to 1
    assert_eq!(limits, vec![(vec![2], 0)]);
    assert_eq!(result.partition_id, 0);
    assert_eq!(result.first_part, vec![0]);
    assert_eq!(result.second_part, vec![1, 2]);
    assert!(!manager.can_send(0, 1));
    assert!(!manager.can_send(2, 0));
    assert!(manager.can_send(1, 2));
    assert_eq!(manager.unavailable_count(NodeTypeId(0)), 1);

    // partitioned node may still crash, nobody else may
    assert!(manager.can_crash(0));
    assert!(!manager.can_crash(1));
    assert!(!manager.can_add_partition(1, 2));

    manager.remove_partition(&result.first_part, &result.second_part);
    assert!(manager.can_send(0, 1));
    assert_eq!(manager.unavailable_count(NodeTypeId(0)), 0);
    assert_eq!(manager.partition_count(), 1);
}

#[test]
fn crashed_partitioned_node_counts_once() {
    let mut manager = ComponentFailureManager::new(three_nodes());
    let result = manager.partition(0, 1, |_, _| Vec::new());
    manager.crash_node(0).expect("node 0 is up");
    assert_eq!(manager.unavailable_count(NodeTypeId(0)), 1);

    manager.remove_partition(&result.first_part, &result.second_part);
    assert_eq!(manager.unavailable_count(NodeTypeId(0)), 1, "still crashed");
    manager.recover_node(0).expect("node 0 is down");
    assert_eq!(manager.unavailable_count(NodeTypeId(0)), 0);
}

#[test]
fn larger_budget_lets_peers_join_the_minority() {
    let resolver = Rc::new(
        AddressResolver::single_type(
            NodeTypeConfig::new("replica", 5)
                .max_failures(2)
                .partition_mode(NetworkPartitionMode::Components),
        )
        .expect("valid topology"),
    );
    let mut manager = ComponentFailureManager::new(resolver);

    let result = manager.partition(0, 4, |peers, limit| {
        assert_eq!(peers, [1, 2, 3]);
        assert_eq!(limit, 1);
        vec![2]
    });
    assert_eq!(result.first_part, vec![0, 2]);
    assert_eq!(result.second_part, vec![1, 3, 4]);
    assert!(manager.can_send(0, 2));
    assert!(!manager.can_send(2, 3));
    assert_eq!(manager.unavailable_count(NodeTypeId(0)), 2);
}

#[test]
fn different_types_talk_only_from_their_majorities() {
    let resolver = Rc::new(
        AddressResolver::builder()
            .node_type(
                NodeTypeConfig::new("server", 3)
                    .max_failures(1)
                    .partition_mode(NetworkPartitionMode::Components),
            )
            .node_type(NodeTypeConfig::new("client", 2).max_failures(1))
            .build()
            .expect("valid topology"),
    );
    let mut manager = FailureManager::new(resolver);
    assert_eq!(manager.topology(), FailureTopology::Components);

    manager.partition(0, 1, |_, _| Vec::new());
    assert!(!manager.can_send(0, 3), "server 0 is in its minority");
    assert!(manager.can_send(1, 3));
    assert!(manager.can_send(3, 4));
}
