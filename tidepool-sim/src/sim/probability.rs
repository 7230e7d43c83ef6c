//! Seeded probability model driving every fault-injection decision.
//!
//! The model holds no generator of its own: it shapes draws from the
//! thread-local simulation RNG (see [`crate::sim::rng`]) and owns its seed
//! lifecycle through [`ProbabilityModel::reset`].
//!
//! ## Decisions
//!
//! | Decision | Method | Shape |
//! |----------|--------|-------|
//! | Crash on send | [`node_failed`](ProbabilityModel::node_failed) | `crash_expectation / expected_messages` |
//! | Partition on send | [`is_network_partition`](ProbabilityModel::is_network_partition) | fixed probability |
//! | Delivery count | [`duplication_rate`](ProbabilityModel::duplication_rate) | 0 (lost), 1, or `2..=1+max_duplicates` |
//! | Minority members | [`partition`](ProbabilityModel::partition) | uniform size, uniform members |
//! | Recovery delay | [`recover_timeout`](ProbabilityModel::recover_timeout) | uniform in `base..=2*base` |
//! | Timer readiness | [`poisson_probability`](ProbabilityModel::poisson_probability) | `e^-λ λ^r / r!` |

use tidepool_core::NodeId;
use tracing::debug;

use super::rng::{
    get_current_sim_seed, reset_sim_rng, set_sim_seed, sim_random_bool, sim_random_f64,
    sim_random_range,
};

/// Knobs shaping the probability model.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityConfiguration {
    /// Rough number of sends per invocation, used to spread the expected
    /// crashes across the run.
    pub expected_messages: usize,
    /// Chance that a send triggers a new partition.
    pub partition_probability: f64,
    /// Chance that a message is lost.
    pub message_loss_probability: f64,
    /// Chance that a message is delivered more than once.
    pub duplication_probability: f64,
    /// Maximum number of extra deliveries of a duplicated message.
    pub max_duplicates: usize,
    /// Chance that a crashed node recovers in mixed recovery mode.
    pub recover_probability: f64,
    /// Mean of the Poisson readiness test for timers not yet due.
    pub poisson_mean: f64,
    /// Recovery delay used when no timer bounds it.
    pub default_recover_timeout: u64,
}

impl Default for ProbabilityConfiguration {
    fn default() -> Self {
        Self {
            expected_messages: 100,
            partition_probability: 0.05,
            message_loss_probability: 0.0,
            duplication_probability: 0.0,
            max_duplicates: 2,
            recover_probability: 0.5,
            poisson_mean: 0.1,
            default_recover_timeout: ProbabilityModel::DEFAULT_RECOVER_TIMEOUT,
        }
    }
}

/// Seeded decisions for one invocation.
#[derive(Debug, Clone)]
pub struct ProbabilityModel {
    config: ProbabilityConfiguration,
    node_fail_probability: f64,
}

impl ProbabilityModel {
    /// Virtual-time delay before recovery when nothing else is scheduled.
    pub const DEFAULT_RECOVER_TIMEOUT: u64 = 10;

    /// Create a model. Call [`reset`](Self::reset) before drawing.
    pub fn new(config: ProbabilityConfiguration) -> Self {
        Self {
            config,
            node_fail_probability: 0.0,
        }
    }

    /// The configuration this model was built with.
    pub fn config(&self) -> &ProbabilityConfiguration {
        &self.config
    }

    /// Seed of the current invocation, as last set on the simulation RNG.
    pub fn seed(&self) -> u64 {
        get_current_sim_seed()
    }

    /// Per-send crash probability for the current invocation.
    pub fn node_fail_probability(&self) -> f64 {
        self.node_fail_probability
    }

    /// Start a new invocation: reseed the simulation RNG and recompute the
    /// crash rate so that about `crash_expectation` crashes happen per run.
    pub fn reset(&mut self, seed: u64, crash_expectation: usize) {
        reset_sim_rng();
        set_sim_seed(seed);
        let expected = self.config.expected_messages.max(1) as f64;
        self.node_fail_probability = (crash_expectation as f64 / expected).clamp(0.0, 1.0);
        debug!(
            seed,
            node_fail_probability = self.node_fail_probability,
            "probability model reset"
        );
    }

    /// Should the sending node crash now?
    pub fn node_failed(&self) -> bool {
        sim_random_bool(self.node_fail_probability)
    }

    /// Should this send split the network?
    pub fn is_network_partition(&self) -> bool {
        sim_random_bool(self.config.partition_probability)
    }

    /// How many copies of a message are delivered.
    pub fn duplication_rate(&self) -> usize {
        if sim_random_bool(self.config.message_loss_probability) {
            return 0;
        }
        if self.config.max_duplicates > 0 && sim_random_bool(self.config.duplication_probability)
        {
            return 1 + sim_random_range(1..self.config.max_duplicates + 1);
        }
        1
    }

    /// Pick up to `limit` of `nodes` to join the minority side.
    ///
    /// The size is uniform in `0..=limit`, members are uniform, and the result
    /// keeps the input order.
    pub fn partition(&self, nodes: &[NodeId], limit: usize) -> Vec<NodeId> {
        let limit = limit.min(nodes.len());
        if limit == 0 {
            return Vec::new();
        }
        let size = sim_random_range(0..limit + 1);
        let mut pool: Vec<usize> = (0..nodes.len()).collect();
        let mut picked = Vec::with_capacity(size);
        for _ in 0..size {
            let slot = sim_random_range(0..pool.len());
            picked.push(pool.swap_remove(slot));
        }
        picked.sort_unstable();
        picked.into_iter().map(|index| nodes[index]).collect()
    }

    /// Recovery delay of at least `base` ticks.
    pub fn recover_timeout(&self, base: u64) -> u64 {
        let base = base.max(1);
        sim_random_range(base..base.saturating_mul(2).saturating_add(1))
    }

    /// Does a node in mixed recovery mode come back?
    pub fn node_recovered(&self) -> bool {
        sim_random_bool(self.config.recover_probability)
    }

    /// Readiness test for a timer `remaining` ticks in the future.
    ///
    /// Fires with the Poisson probability of exactly `remaining` arrivals, so
    /// timers close to their deadline fire early more often than distant ones.
    pub fn poisson_probability(&self, remaining: u64) -> bool {
        sim_random_f64() < poisson(self.config.poisson_mean, remaining)
    }

    /// Uniform index in `0..len`.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    pub fn choose_index(&self, len: usize) -> usize {
        sim_random_range(0..len)
    }
}

fn poisson(lambda: f64, k: u64) -> f64 {
    let mut probability = (-lambda).exp();
    for i in 1..=k {
        probability *= lambda / i as f64;
        if probability == 0.0 {
            break;
        }
    }
    probability
}
