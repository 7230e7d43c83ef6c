//! Run configuration.
//!
//! ## Presets
//!
//! | Preset | Loss | Duplication | Partitions |
//! |--------|------|-------------|------------|
//! | [`DistributedConfiguration::default`] | none | none | 5% per send |
//! | [`DistributedConfiguration::reliable`] | none | none | never |
//! | [`DistributedConfiguration::unreliable`] | none | 10%, up to 2 extra | 5% per send |
//!
//! Per-node crash and partition modes live on the
//! [`AddressResolver`](tidepool_core::AddressResolver); a partition
//! probability here only matters for node types whose partition mode allows
//! partitions.

use std::path::PathBuf;

use crate::sim::ProbabilityConfiguration;

/// Configuration of a strategy run.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedConfiguration {
    /// Number of invocations executed by one run.
    pub invocations_per_iteration: usize,
    /// Base seed. Invocation seeds are derived from it; `None` picks one from
    /// the wall clock.
    pub seed: Option<u64>,
    /// Seeds replayed first, one per invocation, before derived seeds.
    pub debug_seeds: Vec<u64>,
    /// Number of crashes expected per invocation.
    pub crash_expectation: usize,
    /// Probability knobs.
    pub probability: ProbabilityConfiguration,
    /// Also inject crashes right before a node touches its persistent log.
    pub crash_before_database_access: bool,
    /// Scheduling decisions after which an invocation is reported as timed
    /// out.
    pub max_tasks_per_invocation: usize,
    /// Where failing traces are written. `None` keeps them in memory only.
    pub trace_directory: Option<PathBuf>,
}

impl Default for DistributedConfiguration {
    fn default() -> Self {
        Self {
            invocations_per_iteration: 100,
            seed: None,
            debug_seeds: Vec::new(),
            crash_expectation: 3,
            probability: ProbabilityConfiguration::default(),
            crash_before_database_access: false,
            max_tasks_per_invocation: 10_000,
            trace_directory: None,
        }
    }
}

impl DistributedConfiguration {
    /// No partitions, no loss, no duplication. Crashes still follow the
    /// node types' crash modes.
    pub fn reliable() -> Self {
        Self {
            probability: ProbabilityConfiguration {
                partition_probability: 0.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Run `seed` as the first invocation, as printed in the "Replay seed"
    /// line of a failing report. Later invocations derive their seeds from
    /// the base seed as usual.
    pub fn with_replay_seed(mut self, seed: u64) -> Self {
        self.debug_seeds = vec![seed];
        self
    }

    /// Partitions and duplicated deliveries enabled.
    pub fn unreliable() -> Self {
        Self {
            probability: ProbabilityConfiguration {
                duplication_probability: 0.1,
                max_duplicates: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
