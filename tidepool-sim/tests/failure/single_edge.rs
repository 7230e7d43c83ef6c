//! Single-edge model: independent link cuts over the full graph.

use std::rc::Rc;

use tidepool_sim::{
    AddressResolver, FailureManager, FailureTopology, NetworkPartitionMode, NodeTypeConfig,
    SingleEdgeFailureManager,
};

fn four_nodes() -> Rc<AddressResolver> {
    Rc::new(
        AddressResolver::single_type(
            NodeTypeConfig::new("peer", 4)
                .max_failures(1)
                .partition_mode(NetworkPartitionMode::SingleEdge),
        )
        .expect("valid topology"),
    )
}

#[test]
fn single_edge_mode_on_one_type_selects_the_edge_model() {
    let manager = FailureManager::new(four_nodes());
    assert_eq!(manager.topology(), FailureTopology::SingleEdge);
}

#[test]
fn cuts_stop_when_the_largest_component_would_shrink_too_much() {
    let mut manager = SingleEdgeFailureManager::new(four_nodes());

    for peer in 1..4 {
        assert!(manager.can_add_partition(0, peer));
        manager.partition(0, peer);
    }
    // node 0 is isolated; the other three still form a large enough component
    assert_eq!(manager.max_component_size(), 3);
    assert!(!manager.can_send(0, 2));
    assert!(!manager.can_crash(1), "would leave a component of 2");
    assert!(manager.can_crash(0));

    assert!(manager.can_add_partition(1, 2), "1 and 2 still meet through 3");
    manager.partition(1, 2);
    assert!(!manager.can_add_partition(1, 3), "would isolate node 1");
    assert!(!manager.can_add_partition(2, 3), "would isolate node 2");
}

#[test]
fn crash_shrinks_what_partitions_may_cut() {
    let mut manager = SingleEdgeFailureManager::new(four_nodes());
    manager.crash_node(0).expect("node 0 is up");
    assert_eq!(manager.max_component_size(), 3);

    assert!(manager.can_add_partition(1, 2), "1 and 2 still meet through 3");
    manager.partition(1, 2);
    assert!(!manager.can_add_partition(1, 3));
    assert_eq!(manager.max_component_size(), 3);
}

#[test]
fn rejected_look_aheads_leave_no_trace() {
    let mut manager = SingleEdgeFailureManager::new(four_nodes());
    manager.crash_node(0).expect("node 0 is up");
    manager.partition(1, 2);
    let cut_before: Vec<_> = manager.cut_edges().collect();

    assert!(!manager.can_add_partition(1, 3));
    assert!(!manager.can_crash(3));
    assert!(!manager.can_add_partition(2, 2));

    assert_eq!(manager.cut_edges().collect::<Vec<_>>(), cut_before);
    assert!(manager.can_send(1, 3));
    assert!(manager.can_send(2, 3));
    assert_eq!(manager.max_component_size(), 3);
}

#[test]
fn recovery_keeps_edges_cut_while_crashed() {
    let mut manager = SingleEdgeFailureManager::new(four_nodes());
    let result = manager.partition(0, 1);
    manager.crash_node(0).expect("node 0 is up");
    manager.recover_node(0).expect("node 0 is down");

    assert!(!manager.can_send(0, 1));
    assert!(manager.can_send(0, 2));

    manager.remove_partition(&result.first_part, &result.second_part);
    assert!(manager.can_send(1, 0));
}

#[test]
fn partition_results_name_the_edge() {
    let mut manager = SingleEdgeFailureManager::new(four_nodes());
    let first = manager.partition(2, 1);
    let second = manager.partition(3, 0);
    assert_eq!((first.partition_id, second.partition_id), (0, 1));
    assert_eq!(first.first_part, vec![2]);
    assert_eq!(first.second_part, vec![1]);
    assert!(!manager.can_send(1, 2), "cuts are undirected");
}
