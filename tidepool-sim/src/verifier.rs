//! Verifiers judge the results of a completed invocation.
//!
//! A verifier sees the scenario and the per-operation results, including
//! operations recorded as [`OperationResult::Crashed`](crate::OperationResult::Crashed)
//! whose effects may or may not have been applied. It must accept every
//! outcome the protocol allows under crashes and retries.
//!
//! # Example
//!
//! ```ignore
//! let verifier = verifier_fn("all_completed", |_scenario, results| {
//!     results.completed_count() > 0
//! });
//! ```

use crate::runner::{ExecutionResult, ExecutionScenario};

/// Checks the results of a completed invocation.
pub trait Verifier<Op, R> {
    /// Name used in logs.
    fn name(&self) -> &str {
        "verifier"
    }

    /// Returns true if `results` is a legal outcome of `scenario`.
    fn verify_results(&self, scenario: &ExecutionScenario<Op>, results: &ExecutionResult<R>)
        -> bool;
}

/// Create a verifier from a closure.
pub fn verifier_fn<Op, R, F>(name: &str, check: F) -> Box<dyn Verifier<Op, R>>
where
    F: Fn(&ExecutionScenario<Op>, &ExecutionResult<R>) -> bool + 'static,
    Op: 'static,
    R: 'static,
{
    Box::new(FnVerifier {
        name: name.to_string(),
        check,
    })
}

struct FnVerifier<F> {
    name: String,
    check: F,
}

impl<Op, R, F> Verifier<Op, R> for FnVerifier<F>
where
    F: Fn(&ExecutionScenario<Op>, &ExecutionResult<R>) -> bool,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn verify_results(
        &self,
        scenario: &ExecutionScenario<Op>,
        results: &ExecutionResult<R>,
    ) -> bool {
        (self.check)(scenario, results)
    }
}

impl<Op, R, V: Verifier<Op, R> + ?Sized> Verifier<Op, R> for Box<V> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn verify_results(
        &self,
        scenario: &ExecutionScenario<Op>,
        results: &ExecutionResult<R>,
    ) -> bool {
        (**self).verify_results(scenario, results)
    }
}
