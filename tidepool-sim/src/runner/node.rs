//! Contract between the runner and the protocol under test.
//!
//! Nodes are explicit state machines. The runner resumes a node by calling
//! one of its handlers; a node that needs a reply records it with
//! [`Environment::await_response`] and returns, leaving control to the
//! scheduler. Nothing blocks.

use std::fmt::Debug;

use tidepool_core::{NodeId, NodeResult};

use super::environment::Environment;

/// Message exchanged between nodes.
pub trait ProtocolMessage: Clone + Debug {
    /// Request id this message answers, if it is a reply.
    ///
    /// A reply whose id matches the receiver's pending response slot is
    /// routed to [`Node::on_response`] instead of [`Node::on_message`].
    fn response_to(&self) -> Option<u64> {
        None
    }
}

/// A simulated participant of the protocol under test.
///
/// Every handler receives an [`Environment`] and returns a
/// [`NodeResult`]. Crash-injection points inside the environment return
/// [`NodeError::Crashed`](tidepool_core::NodeError::Crashed); handlers
/// propagate it with `?` and the rest of the step is discarded.
///
/// A crash destroys the node instance. On recovery the runner builds a fresh
/// one from the node factory and calls [`Node::recover`]; only the
/// persistent log survives.
pub trait Node: Sized {
    /// Messages this node sends and receives.
    type Message: ProtocolMessage;
    /// Entries of the persistent per-node log.
    type LogEntry: Clone + Debug;
    /// Operations the scenario invokes.
    type Operation: Clone + Debug;
    /// Values operations return.
    type Output: Clone + Debug + PartialEq;

    /// Start `operation`. Return `Some` to complete it immediately, or
    /// `None` and call [`Environment::complete`] from a later handler.
    fn invoke(
        &mut self,
        env: &mut Environment<'_, Self>,
        operation: &Self::Operation,
    ) -> NodeResult<Option<Self::Output>>;

    /// Handle a message from `sender`.
    fn on_message(
        &mut self,
        env: &mut Environment<'_, Self>,
        message: Self::Message,
        sender: NodeId,
    ) -> NodeResult<()>;

    /// Handle the reply matching the pending response slot.
    fn on_response(
        &mut self,
        env: &mut Environment<'_, Self>,
        message: Self::Message,
        sender: NodeId,
    ) -> NodeResult<()> {
        self.on_message(env, message, sender)
    }

    /// The peer this node was waiting on is reachable again, after a
    /// recovery or a healed partition. The pending slot has been cleared;
    /// requests that may have been lost should be sent again.
    fn on_peer_reconnected(
        &mut self,
        _env: &mut Environment<'_, Self>,
        _peer: NodeId,
    ) -> NodeResult<()> {
        Ok(())
    }

    /// Handle a timer set with [`Environment::set_timer`] or
    /// [`Environment::set_periodic_timer`].
    fn on_timer(&mut self, _env: &mut Environment<'_, Self>, _name: &str) -> NodeResult<()> {
        Ok(())
    }

    /// Rebuild volatile state after a crash, typically from the log.
    fn recover(&mut self, _env: &mut Environment<'_, Self>) -> NodeResult<()> {
        Ok(())
    }

    /// Optional description of the node's state for failure snapshots.
    fn state_representation(&self) -> Option<String> {
        None
    }
}
