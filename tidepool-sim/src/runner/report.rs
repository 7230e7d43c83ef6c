//! Invocation outcomes, failures and run reports.

use std::fmt;
use std::path::PathBuf;

use tidepool_core::{NodeId, SimulationError};

use super::scenario::ExecutionResult;

/// How one invocation ended, as reported by a runner.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult<R> {
    /// Every operation resolved; results go to the verifier.
    Completed(ExecutionResult<R>),
    /// Nothing left to schedule while operations were still outstanding.
    Deadlock(ExecutionResult<R>),
    /// The scheduling budget ran out.
    Timeout {
        /// Tasks executed before giving up.
        tasks_executed: usize,
    },
    /// Node code reported an error it could not handle.
    UnexpectedError {
        /// Failing node.
        node: NodeId,
        /// Error message.
        message: String,
    },
    /// A framework precondition was violated.
    InternalError(SimulationError),
}

impl<R> InvocationResult<R> {
    /// Failure kind of a non-completed invocation. `Completed` is judged by
    /// the verifier instead and maps to `None`.
    pub fn into_failure_kind(self) -> Option<FailureKind<R>> {
        match self {
            InvocationResult::Completed(_) => None,
            InvocationResult::Deadlock(results) => Some(FailureKind::Deadlock(results)),
            InvocationResult::Timeout { tasks_executed } => {
                Some(FailureKind::Timeout { tasks_executed })
            }
            InvocationResult::UnexpectedError { node, message } => {
                Some(FailureKind::UnexpectedError { node, message })
            }
            InvocationResult::InternalError(error) => Some(FailureKind::InternalError(error)),
        }
    }
}

/// What went wrong in a failing invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind<R> {
    /// The verifier rejected the collected results.
    IncorrectResults(ExecutionResult<R>),
    /// See [`InvocationResult::Deadlock`].
    Deadlock(ExecutionResult<R>),
    /// See [`InvocationResult::Timeout`].
    Timeout {
        /// Tasks executed before giving up.
        tasks_executed: usize,
    },
    /// See [`InvocationResult::UnexpectedError`].
    UnexpectedError {
        /// Failing node.
        node: NodeId,
        /// Error message.
        message: String,
    },
    /// See [`InvocationResult::InternalError`].
    InternalError(SimulationError),
}

impl<R> FailureKind<R> {
    /// Short name used in logs and trace files.
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::IncorrectResults(_) => "incorrect_results",
            FailureKind::Deadlock(_) => "deadlock",
            FailureKind::Timeout { .. } => "timeout",
            FailureKind::UnexpectedError { .. } => "unexpected_error",
            FailureKind::InternalError(_) => "internal_error",
        }
    }
}

/// The first failing invocation of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure<R> {
    /// Index of the invocation within the run.
    pub invocation: usize,
    /// Seed replaying the invocation.
    pub seed: u64,
    /// What went wrong.
    pub kind: FailureKind<R>,
    /// Snapshot of the runner state when the invocation ended.
    pub state_representation: String,
    /// Trace file written for this failure, if any.
    pub trace_file: Option<PathBuf>,
}

impl<R: fmt::Debug> fmt::Display for Failure<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in invocation {} (seed {})",
            self.kind.name(),
            self.invocation,
            self.seed
        )?;
        match &self.kind {
            FailureKind::IncorrectResults(results) | FailureKind::Deadlock(results) => {
                write!(f, ": {results:?}")
            }
            FailureKind::Timeout { tasks_executed } => {
                write!(f, ": gave up after {tasks_executed} tasks")
            }
            FailureKind::UnexpectedError { node, message } => {
                write!(f, ": node {node}: {message}")
            }
            FailureKind::InternalError(error) => write!(f, ": {error}"),
        }
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedReport<R> {
    /// Invocations executed, including the failing one.
    pub invocations: usize,
    /// Seed of every executed invocation, in order.
    pub seeds_used: Vec<u64>,
    /// First failure, if any.
    pub failure: Option<Failure<R>>,
}

impl<R> DistributedReport<R> {
    /// Returns true if no invocation failed.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

impl<R: fmt::Debug> fmt::Display for DistributedReport<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Distributed Simulation Report ===")?;
        writeln!(f, "Invocations: {}", self.invocations)?;
        match &self.failure {
            None => writeln!(f, "Result: all invocations verified")?,
            Some(failure) => {
                writeln!(f, "Result: FAILED")?;
                writeln!(f, "Failure: {failure}")?;
                writeln!(f, "Replay seed: {}", failure.seed)?;
                if let Some(path) = &failure.trace_file {
                    writeln!(f, "Trace: {}", path.display())?;
                }
                writeln!(f)?;
                writeln!(f, "State:")?;
                writeln!(f, "{}", failure.state_representation)?;
            }
        }
        Ok(())
    }
}
