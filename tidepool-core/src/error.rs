use thiserror::Error;

use crate::NodeId;

/// Errors raised by the simulation framework itself.
///
/// These indicate a scheduling bug or an invalid setup, never a bug in the
/// protocol under test, and abort the current invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// `crash_node` was called on a node that is already down.
    #[error("node {0} is already crashed")]
    NodeAlreadyCrashed(NodeId),
    /// `recover_node` was called on a node that is up.
    #[error("node {0} is not crashed")]
    NodeNotCrashed(NodeId),
    /// A node id outside `[0, node_count)` was used.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// The topology, scenario or configuration cannot be simulated.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The simulation is in an invalid state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),
    /// An I/O error occurred while persisting simulation output.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// A type alias for `Result<T, SimulationError>`.
pub type SimulationResult<T> = Result<T, SimulationError>;

impl From<std::io::Error> for SimulationError {
    fn from(err: std::io::Error) -> Self {
        SimulationError::IoError(err.to_string())
    }
}

/// Errors propagated out of node handlers.
///
/// [`NodeError::Crashed`] is not a failure: it is the control signal raised at
/// a crash-injection point. Handlers propagate it with `?` so the rest of the
/// node's step is discarded, and the runner switches the node to crashed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The node was crashed by fault injection.
    #[error("node {0} crashed")]
    Crashed(NodeId),
    /// The protocol hit a state it cannot handle.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// A framework contract was violated while the node was running.
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// A type alias for `Result<T, NodeError>`.
pub type NodeResult<T> = Result<T, NodeError>;

impl NodeError {
    /// Returns true if this is the injected-crash control signal.
    pub fn is_crash(&self) -> bool {
        matches!(self, NodeError::Crashed(_))
    }
}
