//! Trace of everything an invocation did, kept for postmortem replay.

use serde::Serialize;
use tidepool_core::NodeId;

/// Why a message never reached its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The sender and receiver could not communicate at send time.
    Unreachable,
    /// The network lost it.
    Lost,
    /// The receiver was down at delivery time.
    ReceiverCrashed,
    /// A partition was created while it was in flight.
    Partitioned,
}

/// One traced step. Payloads and values are stored in their `Debug` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A node started an operation.
    OperationStarted {
        /// Node.
        node: NodeId,
        /// Operation index.
        index: usize,
        /// Operation.
        operation: String,
    },
    /// An operation completed.
    OperationCompleted {
        /// Node.
        node: NodeId,
        /// Operation index.
        index: usize,
        /// Returned value.
        result: String,
    },
    /// A message left its sender.
    MessageSent {
        /// Sender.
        from: NodeId,
        /// Receiver.
        to: NodeId,
        /// Message id.
        message_id: usize,
        /// Number of deliveries scheduled.
        copies: usize,
        /// Payload.
        message: String,
    },
    /// A message reached its receiver.
    MessageDelivered {
        /// Sender.
        from: NodeId,
        /// Receiver.
        to: NodeId,
        /// Message id.
        message_id: usize,
    },
    /// A message was dropped.
    MessageDropped {
        /// Sender.
        from: NodeId,
        /// Receiver.
        to: NodeId,
        /// Message id.
        message_id: usize,
        /// Why.
        reason: DropReason,
    },
    /// A reply matched a node's pending response slot.
    ResponseMatched {
        /// Waiting node.
        node: NodeId,
        /// Replying peer.
        from: NodeId,
        /// Request id the reply answers.
        request_id: u64,
    },
    /// A node waiting on a peer was woken because the peer is reachable again.
    PeerReconnected {
        /// Woken node.
        node: NodeId,
        /// Peer it was waiting on.
        peer: NodeId,
    },
    /// A timer fired.
    TimerFired {
        /// Node.
        node: NodeId,
        /// Timer name.
        name: String,
    },
    /// A node was crashed by fault injection.
    NodeCrashed {
        /// Node.
        node: NodeId,
        /// Whether a recovery was scheduled.
        will_recover: bool,
    },
    /// A crashed node came back.
    NodeRecovered {
        /// Node.
        node: NodeId,
    },
    /// A partition was created.
    PartitionCreated {
        /// Partition id.
        partition_id: usize,
        /// First side.
        first_part: Vec<NodeId>,
        /// Second side.
        second_part: Vec<NodeId>,
    },
    /// A partition was healed.
    PartitionRemoved {
        /// Partition id.
        partition_id: usize,
    },
}

/// An [`Event`] stamped with the virtual time it happened at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    /// Virtual time.
    pub time: u64,
    /// What happened.
    #[serde(flatten)]
    pub event: Event,
}
