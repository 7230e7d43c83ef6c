//! Minimal protocol whose behavior is picked per test.

use std::rc::Rc;

use tidepool_sim::{
    AddressResolver, DistributedConfiguration, DistributedRandomStrategy, DistributedRunner,
    Environment, ExecutionResult, ExecutionScenario, Failure, Node, NodeError, NodeId,
    NodeResult, NodeTypeConfig, ProtocolMessage, Verifier,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// Ask the next node for a pong and complete with its id.
    PingNext,
    /// Wait for a reply nobody sends.
    Silent,
    /// Arm a periodic timer and never complete.
    Ticking,
    /// Fail every operation with a protocol error.
    Failing,
    /// Send a note to the next node and complete with the own id.
    Chatty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ToyMessage {
    Ping(u64),
    Pong(u64),
    Note,
}

impl ProtocolMessage for ToyMessage {
    fn response_to(&self) -> Option<u64> {
        match self {
            ToyMessage::Pong(request) => Some(*request),
            _ => None,
        }
    }
}

pub(crate) struct ToyNode {
    id: NodeId,
    behavior: Behavior,
    next_request: u64,
}

impl ToyNode {
    pub(crate) fn new(id: NodeId, behavior: Behavior) -> Self {
        Self {
            id,
            behavior,
            next_request: 0,
        }
    }

    fn peer(&self, env: &Environment<'_, Self>) -> NodeId {
        (self.id + 1) % env.number_of_nodes()
    }
}

impl Node for ToyNode {
    type Message = ToyMessage;
    type LogEntry = String;
    type Operation = ();
    type Output = usize;

    fn invoke(&mut self, env: &mut Environment<'_, Self>, _: &()) -> NodeResult<Option<usize>> {
        let peer = self.peer(env);
        match self.behavior {
            Behavior::PingNext => {
                let request = self.next_request;
                self.next_request += 1;
                env.await_response(peer, request);
                env.send(ToyMessage::Ping(request), peer)?;
                Ok(None)
            }
            Behavior::Silent => {
                env.await_response(peer, 0);
                env.send(ToyMessage::Note, peer)?;
                Ok(None)
            }
            Behavior::Ticking => {
                env.set_periodic_timer("tick", 1);
                Ok(None)
            }
            Behavior::Failing => Err(NodeError::Protocol("bad state".to_string())),
            Behavior::Chatty => {
                env.send(ToyMessage::Note, peer)?;
                Ok(Some(self.id))
            }
        }
    }

    fn on_message(
        &mut self,
        env: &mut Environment<'_, Self>,
        message: ToyMessage,
        sender: NodeId,
    ) -> NodeResult<()> {
        match message {
            ToyMessage::Ping(request) => env.send(ToyMessage::Pong(request), sender),
            ToyMessage::Pong(_) | ToyMessage::Note => Ok(()),
        }
    }

    fn on_response(
        &mut self,
        env: &mut Environment<'_, Self>,
        _message: ToyMessage,
        sender: NodeId,
    ) -> NodeResult<()> {
        env.complete(sender)
    }

    fn recover(&mut self, env: &mut Environment<'_, Self>) -> NodeResult<()> {
        env.log()?.push(format!("recovered {}", self.id));
        Ok(())
    }
}

pub(crate) struct AcceptAll;

impl Verifier<(), usize> for AcceptAll {
    fn verify_results(&self, _: &ExecutionScenario<()>, _: &ExecutionResult<usize>) -> bool {
        true
    }
}

/// Everything a toy run leaves behind.
pub(crate) struct ToyRun {
    pub(crate) runner: DistributedRunner<ToyNode>,
    pub(crate) strategy: DistributedRandomStrategy,
    pub(crate) failure: Option<Failure<usize>>,
}

pub(crate) fn run_toy(
    node_type: NodeTypeConfig,
    behavior: Behavior,
    ops_per_node: usize,
    config: DistributedConfiguration,
    verifier: &dyn Verifier<(), usize>,
) -> ToyRun {
    crate::init_tracing();
    let resolver = Rc::new(AddressResolver::single_type(node_type).expect("valid topology"));
    let scenario = ExecutionScenario::new(vec![vec![(); ops_per_node]; resolver.node_count()]);
    let mut runner = DistributedRunner::new(
        Rc::clone(&resolver),
        scenario,
        Rc::new(move |id, _: &AddressResolver| ToyNode::new(id, behavior)),
        &config,
    );
    let mut strategy = DistributedRandomStrategy::new(resolver, config);
    let failure = strategy.run(&mut runner, verifier);
    ToyRun {
        runner,
        strategy,
        failure,
    }
}
