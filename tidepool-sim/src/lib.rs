//! # Tidepool Simulation Engine
//!
//! Deterministic fault injection and scheduling for testing distributed
//! protocols in a single thread.
//!
//! A protocol is written as a set of [`Node`] state machines. A
//! [`DistributedRunner`] executes a scenario of client operations against
//! them while a [`DistributedStrategy`] decides, for every step, which
//! pending task runs next, whether a node crashes, whether the network
//! splits, and whether a message is lost or duplicated. Every decision comes
//! from one seeded generator, so a failing seed replays the exact same
//! execution.
//!
//! ## Core Components
//!
//! - [`AddressResolver`]: node ids, node types and their failure budgets
//! - [`ProbabilityModel`]: every random fault decision
//! - [`FailureManager`]: which nodes are crashed and which links are cut,
//!   bounded by the per-type budgets
//! - [`TaskManager`]: ready and timed tasks, and the virtual clock
//! - [`DistributedRandomStrategy`]: uniform scheduling with seeded faults
//! - [`Runner`] and [`Verifier`]: the contracts the strategy drives
//!
//! ## Quick Start
//!
//! ```ignore
//! use tidepool_sim::simulations::kv_sharding::{kv_scenario, KvNode, KvVerifier};
//! use tidepool_sim::{AddressResolver, CrashMode, DistributedBuilder, NodeTypeConfig};
//!
//! let resolver = AddressResolver::single_type(
//!     NodeTypeConfig::new("kv", 3)
//!         .max_failures(1)
//!         .crash_mode(CrashMode::AllNodesRecover),
//! )?;
//! let report = DistributedBuilder::new(resolver)
//!     .invocations(100)
//!     .scenario(kv_scenario(3, 4))
//!     .nodes(KvNode::new)
//!     .verifier(KvVerifier)
//!     .run()?;
//! println!("{report}");
//! ```
//!
//! ## Fault Injection Overview
//!
//! | Fault | Injected at | Bounded by |
//! |-------|-------------|------------|
//! | Node crash | every send, optionally every log access | crash mode, `max_failures` per type |
//! | Node recovery | timed task after the crash | crash mode |
//! | Component partition | before a send | `max_failures` per type, minority side only |
//! | Single-edge partition | before a send | largest live component size |
//! | Message loss | every send | `message_loss_probability` |
//! | Message duplication | every send | `duplication_probability`, `max_duplicates` |
//!
//! ## Replaying a failure
//!
//! A failing run reports the seed of the failing invocation. Replaying it as
//! the first debug seed reproduces the same trace:
//!
//! ```ignore
//! DistributedBuilder::new(resolver)
//!     .debug_seeds(vec![failing_seed])
//!     .invocations(1)
//!     // ...
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Run configuration.
pub mod config;
/// Crash and partition bookkeeping.
pub mod failure;
/// Runners, nodes and reports.
pub mod runner;
/// Seeded randomness, probabilities and tasks.
pub mod sim;
/// Example protocols exercised under fault injection.
pub mod simulations;
/// Scheduling and fault-injection strategies.
pub mod strategy;
/// Result verification.
pub mod verifier;

// =============================================================================
// Re-exports
// =============================================================================

// Core types from tidepool-core
pub use tidepool_core::{
    AddressResolver, AddressResolverBuilder, CrashMode, FailureTopology, NetworkPartitionMode,
    NodeError, NodeId, NodeResult, NodeTypeConfig, NodeTypeId, SimulationError,
    SimulationResult,
};

// Configuration
pub use config::DistributedConfiguration;

// Failure management
pub use failure::{
    ComponentFailureManager, FailureManager, PartitionResult, SingleEdgeFailureManager,
};

// Deterministic primitives
pub use sim::{
    get_current_sim_seed, reset_sim_rng, set_sim_seed, sim_random, sim_random_range,
    ProbabilityConfiguration, ProbabilityModel, Task, TaskId, TaskKind, TaskManager,
};

// Strategies
pub use strategy::{DistributedRandomStrategy, DistributedStrategy, InvocationSeeds};

// Runners and reports
pub use runner::{
    DistributedBuilder, DistributedReport, DistributedRunner, DropReason, Environment, Event,
    ExecutionResult, ExecutionScenario, Failure, FailureKind, InvocationResult, Node,
    NodeFactory, OperationResult, PendingResponse, ProtocolMessage, Runner, StepOutcome,
    TraceEvent,
};

// Verification
pub use verifier::{verifier_fn, Verifier};
