//! Pending work of an invocation and the virtual clock.
//!
//! Tasks are split in two sets:
//!
//! - **ready tasks** (operation starts, message deliveries) may run as soon as
//!   the scheduler picks them;
//! - **timed tasks** (timers, node recoveries, partition recoveries) carry a
//!   deadline in virtual time.
//!
//! Both sets keep insertion order so that, for a given seed, index based
//! selection is reproducible.

use serde::Serialize;
use tidepool_core::NodeId;

/// Identifier of a task, unique within an invocation.
pub type TaskId = u64;

/// What a task does when executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Start the operation at `index` of `node`'s scenario.
    Operation {
        /// Node running the operation.
        node: NodeId,
        /// Position in the node's operation list.
        index: usize,
    },
    /// Deliver message `message_id` from `from` to `to`.
    MessageReceive {
        /// Sender.
        from: NodeId,
        /// Receiver.
        to: NodeId,
        /// Index of the payload in the runner's message table.
        message_id: usize,
    },
    /// Fire a timer on `node`.
    Timer {
        /// Node owning the timer.
        node: NodeId,
        /// Timer name passed back to the node.
        name: String,
        /// Re-arm period for periodic timers.
        period: Option<u64>,
    },
    /// Bring a crashed node back.
    NodeRecover {
        /// Node to recover.
        node: NodeId,
    },
    /// Heal a partition.
    PartitionRecover {
        /// Partition id returned when it was created.
        partition_id: usize,
        /// First side of the partition.
        first_part: Vec<NodeId>,
        /// Second side of the partition.
        second_part: Vec<NodeId>,
    },
}

impl TaskKind {
    /// Returns true for timers that re-arm themselves forever.
    pub fn is_periodic_timer(&self) -> bool {
        matches!(self, TaskKind::Timer { period: Some(_), .. })
    }

    /// Node whose continuation this task resumes, if any.
    ///
    /// Message deliveries are not owned by their receiver: they stay in
    /// flight when it crashes.
    pub fn owner(&self) -> Option<NodeId> {
        match self {
            TaskKind::Operation { node, .. } | TaskKind::Timer { node, .. } => Some(*node),
            _ => None,
        }
    }
}

/// A unit of pending work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// Unique id.
    pub id: TaskId,
    /// Virtual time at which the task was created (ready tasks) or becomes
    /// due (timed tasks).
    pub time: u64,
    /// What to do.
    pub kind: TaskKind,
}

/// Ready tasks, timed tasks and the virtual clock.
#[derive(Debug, Default)]
pub struct TaskManager {
    tasks: Vec<Task>,
    time_tasks: Vec<Task>,
    time: u64,
    next_id: TaskId,
}

impl TaskManager {
    /// Empty manager at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Ready tasks, in insertion order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Timed tasks, in insertion order.
    pub fn time_tasks(&self) -> &[Task] {
        &self.time_tasks
    }

    /// Returns true if no task of either kind is pending.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.time_tasks.is_empty()
    }

    /// Latest deadline among timed tasks.
    pub fn latest_deadline(&self) -> Option<u64> {
        self.time_tasks.iter().map(|task| task.time).max()
    }

    /// Add a task runnable immediately.
    pub fn add_task(&mut self, kind: TaskKind) -> TaskId {
        let task = self.make_task(self.time, kind);
        let id = task.id;
        self.tasks.push(task);
        id
    }

    /// Add a task due `delay` ticks from now.
    pub fn add_time_task(&mut self, kind: TaskKind, delay: u64) -> TaskId {
        let task = self.make_task(self.time.saturating_add(delay), kind);
        let id = task.id;
        self.time_tasks.push(task);
        id
    }

    /// Remove a task from either set.
    ///
    /// Removing a timed task means it is about to run, so the clock moves
    /// forward to its deadline (never backwards).
    pub fn remove_task(&mut self, id: TaskId) -> Option<Task> {
        if let Some(position) = self.tasks.iter().position(|task| task.id == id) {
            return Some(self.tasks.remove(position));
        }
        let position = self.time_tasks.iter().position(|task| task.id == id)?;
        let task = self.time_tasks.remove(position);
        self.time = self.time.max(task.time);
        Some(task)
    }

    /// Drop every task matching `predicate`, returning how many were removed.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&Task) -> bool) -> usize {
        let before = self.tasks.len() + self.time_tasks.len();
        self.tasks.retain(|task| !predicate(task));
        self.time_tasks.retain(|task| !predicate(task));
        before - self.tasks.len() - self.time_tasks.len()
    }

    /// Drop the operation and timer tasks of a crashed node.
    pub fn remove_node_tasks(&mut self, node: NodeId) -> usize {
        self.remove_where(|task| task.kind.owner() == Some(node))
    }

    /// Move the clock forward.
    pub fn advance_time(&mut self, ticks: u64) {
        self.time = self.time.saturating_add(ticks);
    }

    /// Forget every task and rewind the clock.
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.time_tasks.clear();
        self.time = 0;
        self.next_id = 0;
    }

    fn make_task(&mut self, time: u64, kind: TaskKind) -> Task {
        let id = self.next_id;
        self.next_id += 1;
        Task { id, time, kind }
    }
}
