//! Thread-local random number generation for simulation.
//!
//! Every random decision of an invocation (scheduling order, crash and
//! partition coins, duplication, recovery delays) is drawn from one
//! thread-local ChaCha8 generator. Seeding it is the only way to replay an
//! invocation, so nothing in the engine may use another source of randomness.

use std::cell::{Cell, RefCell};

use rand::distr::{uniform::SampleUniform, Distribution, StandardUniform};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

thread_local! {
    /// Thread-local random number generator for simulation.
    static SIM_RNG: RefCell<ChaCha8Rng> = RefCell::new(ChaCha8Rng::seed_from_u64(0));

    /// Seed last set via [`set_sim_seed`], kept for failure reports.
    static CURRENT_SEED: Cell<u64> = const { Cell::new(0) };
}

/// Generate a random value using the thread-local simulation RNG.
///
/// The same seed always produces the same sequence of values on a thread.
pub fn sim_random<T>() -> T
where
    StandardUniform: Distribution<T>,
{
    SIM_RNG.with(|rng| rng.borrow_mut().sample(StandardUniform))
}

/// Generate a random value within `range` (exclusive upper bound).
///
/// # Panics
///
/// Panics if the range is empty.
pub fn sim_random_range<T>(range: std::ops::Range<T>) -> T
where
    T: SampleUniform + PartialOrd,
{
    SIM_RNG.with(|rng| rng.borrow_mut().random_range(range))
}

/// Generate a random f64 in `[0.0, 1.0)`.
pub fn sim_random_f64() -> f64 {
    SIM_RNG.with(|rng| rng.borrow_mut().sample(StandardUniform))
}

/// Returns true with probability `probability`.
///
/// Probabilities at or below zero never fire and do not consume randomness,
/// so disabled fault knobs leave the schedule untouched.
pub fn sim_random_bool(probability: f64) -> bool {
    if probability <= 0.0 {
        return false;
    }
    if probability >= 1.0 {
        return true;
    }
    sim_random_f64() < probability
}

/// Set the seed for the thread-local simulation RNG.
pub fn set_sim_seed(seed: u64) {
    SIM_RNG.with(|rng| {
        *rng.borrow_mut() = ChaCha8Rng::seed_from_u64(seed);
    });
    CURRENT_SEED.with(|current| current.set(seed));
}

/// Get the seed last set via [`set_sim_seed`], or 0 after a reset.
pub fn get_current_sim_seed() -> u64 {
    CURRENT_SEED.with(|current| current.get())
}

/// Reset the thread-local simulation RNG to a fresh state.
///
/// Called between invocations so none of them observes generator state left
/// by the previous one.
pub fn reset_sim_rng() {
    SIM_RNG.with(|rng| {
        *rng.borrow_mut() = ChaCha8Rng::seed_from_u64(0);
    });
    CURRENT_SEED.with(|current| current.set(0));
}
