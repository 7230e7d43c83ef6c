//! Example protocols and the configurations they are exercised with.
//!
//! Used both by the integration tests and by the binary targets under
//! `src/bin/sim/`.

pub mod kv_sharding;

use tidepool_core::{
    AddressResolver, CrashMode, NetworkPartitionMode, NodeTypeConfig, SimulationResult,
};

use crate::config::DistributedConfiguration;
use crate::runner::{DistributedBuilder, DistributedReport};

use kv_sharding::{kv_scenario, KvNode, KvVerifier};

/// Three shards, one of which may be down or cut off at a time. Every
/// crashed shard comes back.
pub fn kv_topology() -> SimulationResult<AddressResolver> {
    AddressResolver::single_type(
        NodeTypeConfig::new("kv", 3)
            .max_failures(1)
            .crash_mode(CrashMode::AllNodesRecover)
            .partition_mode(NetworkPartitionMode::Components),
    )
}

/// Configuration of the `kv_sharding` binary: unreliable network, traces
/// under the system temp directory, an optional invocation count and an
/// optional seed to replay first.
pub fn kv_sharding_config(
    invocations: Option<usize>,
    replay_seed: Option<u64>,
) -> DistributedConfiguration {
    let mut config = DistributedConfiguration::unreliable();
    if let Some(invocations) = invocations {
        config.invocations_per_iteration = invocations;
    }
    if let Some(seed) = replay_seed {
        config = config.with_replay_seed(seed);
    }
    config.trace_directory = Some(std::env::temp_dir().join("tidepool-traces"));
    config
}

/// Run the key-value simulation with duplicated messages, crashes and
/// partitions.
pub fn run_kv_sharding(
    config: DistributedConfiguration,
    ops_per_node: usize,
) -> SimulationResult<DistributedReport<Option<String>>> {
    let resolver = kv_topology()?;
    let node_count = resolver.node_count();
    DistributedBuilder::new(resolver)
        .config(config)
        .scenario(kv_scenario(node_count, ops_per_node))
        .nodes(KvNode::new)
        .verifier(KvVerifier)
        .run()
}
