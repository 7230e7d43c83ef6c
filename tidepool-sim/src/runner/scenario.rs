//! Operations each node runs, and what they returned.

use std::fmt::Debug;

use tidepool_core::NodeId;

/// Per-node operation lists of one scenario.
///
/// Each node runs its operations one after the other; nodes run
/// concurrently with each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionScenario<Op> {
    operations: Vec<Vec<Op>>,
}

impl<Op> ExecutionScenario<Op> {
    /// Scenario where node `i` runs `operations[i]`. Nodes past the end of
    /// the list run nothing.
    pub fn new(operations: Vec<Vec<Op>>) -> Self {
        Self { operations }
    }

    /// Operations of `node`.
    pub fn operations_for(&self, node: NodeId) -> &[Op] {
        self.operations.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of nodes with an operation list, including empty lists.
    pub fn node_count(&self) -> usize {
        self.operations.len()
    }

    /// Total number of operations.
    pub fn total_operations(&self) -> usize {
        self.operations.iter().map(Vec::len).sum()
    }
}

/// Outcome of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult<R> {
    /// The operation completed with a value.
    Value(R),
    /// The node crashed before the operation completed. It may still take
    /// effect later.
    Crashed,
    /// The operation never finished.
    NoResult,
}

impl<R> OperationResult<R> {
    /// Returns true unless the operation is still outstanding.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, OperationResult::NoResult)
    }
}

/// Results of every operation, indexed like the scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult<R> {
    results: Vec<Vec<OperationResult<R>>>,
}

impl<R: Clone + Debug> ExecutionResult<R> {
    /// All operations of `scenario` outstanding, padded to `node_count`.
    pub fn pending<Op>(scenario: &ExecutionScenario<Op>, node_count: usize) -> Self {
        let results = (0..node_count)
            .map(|node| vec![OperationResult::NoResult; scenario.operations_for(node).len()])
            .collect();
        Self { results }
    }

    /// Results of `node`.
    pub fn results_for(&self, node: NodeId) -> &[OperationResult<R>] {
        self.results.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Set the result of one operation.
    pub fn set(&mut self, node: NodeId, index: usize, result: OperationResult<R>) {
        if let Some(slot) = self.results.get_mut(node).and_then(|r| r.get_mut(index)) {
            *slot = result;
        }
    }

    /// Returns true once every operation is resolved.
    pub fn is_complete(&self) -> bool {
        self.results.iter().flatten().all(OperationResult::is_resolved)
    }

    /// Index of the first outstanding operation of `node`.
    pub fn first_pending(&self, node: NodeId) -> Option<usize> {
        self.results_for(node)
            .iter()
            .position(|result| !result.is_resolved())
    }

    /// Number of operations that completed with a value.
    pub fn completed_count(&self) -> usize {
        self.results
            .iter()
            .flatten()
            .filter(|result| matches!(result, OperationResult::Value(_)))
            .count()
    }

    /// Number of operations interrupted by a crash.
    pub fn crashed_count(&self) -> usize {
        self.results
            .iter()
            .flatten()
            .filter(|result| matches!(result, OperationResult::Crashed))
            .count()
    }
}
