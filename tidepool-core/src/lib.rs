//! # tidepool-core
//!
//! Core types for the tidepool fault-injection engine.
//!
//! This crate holds everything that describes a simulated cluster without
//! running it:
//!
//! - **Identity**: [`NodeId`] and [`NodeTypeId`], plain integers that index
//!   into per-node and per-type arrays
//! - **Failure modes**: [`CrashMode`] and [`NetworkPartitionMode`], chosen per
//!   node type
//! - **Topology**: [`AddressResolver`], the static mapping between node ids and
//!   node types, with per-type failure budgets
//! - **Errors**: [`SimulationError`] for framework contract violations and
//!   [`NodeError`] for what node handlers propagate
//!
//! ## Failure topologies
//!
//! | Topology | Chosen when | Partition unit |
//! |----------|-------------|----------------|
//! | [`FailureTopology::Components`] | several node types, or any non single-edge mode | minority/majority set per type |
//! | [`FailureTopology::SingleEdge`] | one node type in single-edge mode | one undirected edge |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod error;
mod node_address;
mod types;

// Error exports
pub use error::{NodeError, NodeResult, SimulationError, SimulationResult};

// Topology exports
pub use node_address::{AddressResolver, AddressResolverBuilder, NodeTypeConfig};

// Core type exports
pub use types::{CrashMode, FailureTopology, NetworkPartitionMode, NodeId, NodeTypeId};
