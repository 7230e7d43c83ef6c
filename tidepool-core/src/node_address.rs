//! Static topology of a simulated cluster.
//!
//! Node types are registered in order and receive contiguous node ids, so a
//! cluster of three servers followed by two clients maps to ids `0..3` and
//! `3..5`. The resolver never changes once built.

use std::ops::Range;

use crate::{
    CrashMode, FailureTopology, NetworkPartitionMode, NodeId, NodeTypeId, SimulationError,
    SimulationResult,
};

/// Description of one node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTypeConfig {
    /// Human readable name, used in logs and traces.
    pub name: String,
    /// Number of nodes of this type.
    pub count: usize,
    /// Maximum number of nodes of this type that may be unavailable at once.
    pub max_failures: usize,
    /// Crash behaviour for nodes of this type.
    pub crash_mode: CrashMode,
    /// Partition behaviour for nodes of this type.
    pub partition_mode: NetworkPartitionMode,
}

impl NodeTypeConfig {
    /// A type of `count` nodes that never fails.
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            count,
            max_failures: 0,
            crash_mode: CrashMode::NoCrashes,
            partition_mode: NetworkPartitionMode::None,
        }
    }

    /// Set the failure budget.
    pub fn max_failures(mut self, max_failures: usize) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Set the crash mode.
    pub fn crash_mode(mut self, crash_mode: CrashMode) -> Self {
        self.crash_mode = crash_mode;
        self
    }

    /// Set the partition mode.
    pub fn partition_mode(mut self, partition_mode: NetworkPartitionMode) -> Self {
        self.partition_mode = partition_mode;
        self
    }
}

/// Builder for [`AddressResolver`].
#[derive(Debug, Default)]
pub struct AddressResolverBuilder {
    types: Vec<NodeTypeConfig>,
}

impl AddressResolverBuilder {
    /// Register a node type. Its nodes take the next free ids.
    pub fn node_type(mut self, config: NodeTypeConfig) -> Self {
        self.types.push(config);
        self
    }

    /// Validate the registered types and build the resolver.
    pub fn build(self) -> SimulationResult<AddressResolver> {
        if self.types.is_empty() {
            return Err(SimulationError::InvalidConfiguration(
                "at least one node type is required".to_string(),
            ));
        }

        let mut ranges = Vec::with_capacity(self.types.len());
        let mut node_types = Vec::new();
        for (index, config) in self.types.iter().enumerate() {
            if config.count == 0 {
                return Err(SimulationError::InvalidConfiguration(format!(
                    "node type '{}' has no nodes",
                    config.name
                )));
            }
            if config.max_failures > config.count {
                return Err(SimulationError::InvalidConfiguration(format!(
                    "node type '{}' allows {} failures but only has {} nodes",
                    config.name, config.max_failures, config.count
                )));
            }
            let start = node_types.len();
            node_types.extend(std::iter::repeat(NodeTypeId(index)).take(config.count));
            ranges.push(start..node_types.len());
        }

        Ok(AddressResolver {
            types: self.types,
            ranges,
            node_types,
        })
    }
}

/// Read-only mapping between node ids and node types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressResolver {
    types: Vec<NodeTypeConfig>,
    ranges: Vec<Range<NodeId>>,
    node_types: Vec<NodeTypeId>,
}

impl AddressResolver {
    /// Start building a resolver.
    pub fn builder() -> AddressResolverBuilder {
        AddressResolverBuilder::default()
    }

    /// A single node type, the most common test setup.
    pub fn single_type(config: NodeTypeConfig) -> SimulationResult<Self> {
        Self::builder().node_type(config).build()
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.node_types.len()
    }

    /// Number of registered node types.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Iterate over every node id.
    pub fn nodes(&self) -> Range<NodeId> {
        0..self.node_count()
    }

    /// Type of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is out of range. Use [`AddressResolver::contains`]
    /// to check untrusted ids.
    pub fn node_type(&self, node: NodeId) -> NodeTypeId {
        self.node_types[node]
    }

    /// Returns true if `node` is a valid id for this topology.
    pub fn contains(&self, node: NodeId) -> bool {
        node < self.node_count()
    }

    /// Contiguous id range of the nodes of `ty`.
    pub fn nodes_of_type(&self, ty: NodeTypeId) -> Range<NodeId> {
        self.ranges[ty.0].clone()
    }

    /// Failure budget of `ty`.
    pub fn max_failures(&self, ty: NodeTypeId) -> usize {
        self.types[ty.0].max_failures
    }

    /// Name of `ty`.
    pub fn type_name(&self, ty: NodeTypeId) -> &str {
        &self.types[ty.0].name
    }

    /// Crash mode of the type of `node`.
    pub fn crash_mode(&self, node: NodeId) -> CrashMode {
        self.types[self.node_type(node).0].crash_mode
    }

    /// Partition mode of the type of `node`.
    pub fn partition_mode(&self, node: NodeId) -> NetworkPartitionMode {
        self.types[self.node_type(node).0].partition_mode
    }

    /// Which partition bookkeeping this topology needs.
    ///
    /// Single-edge cuts are only tracked when the whole cluster is one node
    /// type configured for them; anything else uses per-type components.
    pub fn failure_topology(&self) -> FailureTopology {
        match self.types.as_slice() {
            [only] if only.partition_mode == NetworkPartitionMode::SingleEdge => {
                FailureTopology::SingleEdge
            }
            _ => FailureTopology::Components,
        }
    }
}
