//! Deterministic building blocks shared by the strategy and the runner.
//!
//! - [`rng`]: the thread-local seeded generator
//! - [`probability`]: fault-injection decisions drawn from it
//! - [`task`]: pending work and the virtual clock

pub mod probability;
pub mod rng;
pub mod task;

pub use probability::{ProbabilityConfiguration, ProbabilityModel};
pub use rng::{
    get_current_sim_seed, reset_sim_rng, set_sim_seed, sim_random, sim_random_bool,
    sim_random_f64, sim_random_range,
};
pub use task::{Task, TaskId, TaskKind, TaskManager};
