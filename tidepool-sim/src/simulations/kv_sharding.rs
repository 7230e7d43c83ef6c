//! Sharded key-value store.
//!
//! Every key is owned by `fnv1a(key) mod n`. A node serving a client
//! operation on a key it owns applies it locally; otherwise it forwards the
//! request to the owner, parks on the reply, and resends the request when the
//! owner becomes reachable again after a crash or a partition.
//!
//! Owners record every applied request in their log together with its reply,
//! so retried and duplicated requests are answered without being applied
//! twice, also across crashes.

use std::collections::{BTreeMap, HashMap};

use tidepool_core::{AddressResolver, NodeId, NodeResult};
use tracing::debug;

use crate::runner::{
    Environment, ExecutionResult, ExecutionScenario, Node, OperationResult, ProtocolMessage,
};
use crate::verifier::Verifier;

/// Client operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOperation {
    /// Store `value` under `key`. Completes with `None`.
    Put {
        /// Key to write.
        key: String,
        /// Value to store.
        value: String,
    },
    /// Read `key`. Completes with the stored value, if any.
    Get {
        /// Key to read.
        key: String,
    },
}

impl KvOperation {
    /// Key the operation touches.
    pub fn key(&self) -> &str {
        match self {
            KvOperation::Put { key, .. } | KvOperation::Get { key } => key,
        }
    }
}

/// Messages between nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvMessage {
    /// Forwarded put.
    PutRequest {
        /// Request id, unique per client node.
        op_id: u64,
        /// Key to write.
        key: String,
        /// Value to store.
        value: String,
    },
    /// Forwarded get.
    GetRequest {
        /// Request id, unique per client node.
        op_id: u64,
        /// Key to read.
        key: String,
    },
    /// Owner's answer to a request.
    Reply {
        /// Request being answered.
        op_id: u64,
        /// Value read, `None` for puts.
        value: Option<String>,
    },
}

impl ProtocolMessage for KvMessage {
    fn response_to(&self) -> Option<u64> {
        match self {
            KvMessage::Reply { op_id, .. } => Some(*op_id),
            _ => None,
        }
    }
}

/// Durable record of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvLogEntry {
    /// A client operation was issued with this request id.
    Issued {
        /// Request id.
        op_id: u64,
    },
    /// A value was stored for a key this node owns.
    Stored {
        /// Key written.
        key: String,
        /// Value stored.
        value: String,
    },
    /// A forwarded request was applied and answered with `reply`.
    Applied {
        /// Node that sent the request.
        client: NodeId,
        /// Its request id.
        op_id: u64,
        /// Reply sent back.
        reply: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct Outstanding {
    op_id: u64,
    owner: NodeId,
    request: KvMessage,
}

/// Owner of `key` in a cluster of `node_count` nodes.
///
/// Stable across builds and platforms, so a replayed seed routes every key
/// to the same owner.
pub fn owner_of(key: &str, node_count: usize) -> NodeId {
    (fnv1a(key.as_bytes()) % node_count.max(1) as u64) as NodeId
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// One shard of the store, also acting as a client.
#[derive(Debug)]
pub struct KvNode {
    id: NodeId,
    node_count: usize,
    store: BTreeMap<String, String>,
    applied: HashMap<(NodeId, u64), Option<String>>,
    next_op_id: u64,
    outstanding: Option<Outstanding>,
}

impl KvNode {
    /// Fresh node with empty volatile state.
    pub fn new(id: NodeId, resolver: &AddressResolver) -> Self {
        Self {
            id,
            node_count: resolver.node_count(),
            store: BTreeMap::new(),
            applied: HashMap::new(),
            next_op_id: 0,
            outstanding: None,
        }
    }

    /// Value stored for a key this node owns.
    pub fn stored(&self, key: &str) -> Option<&str> {
        self.store.get(key).map(String::as_str)
    }

    fn apply_local(
        &mut self,
        env: &mut Environment<'_, Self>,
        operation: &KvOperation,
    ) -> NodeResult<Option<String>> {
        match operation {
            KvOperation::Put { key, value } => {
                env.log()?.push(KvLogEntry::Stored {
                    key: key.clone(),
                    value: value.clone(),
                });
                self.store.insert(key.clone(), value.clone());
                Ok(None)
            }
            KvOperation::Get { key } => Ok(self.store.get(key).cloned()),
        }
    }

    fn apply_put(
        &mut self,
        env: &mut Environment<'_, Self>,
        client: NodeId,
        op_id: u64,
        key: String,
        value: String,
    ) -> NodeResult<Option<String>> {
        if let Some(reply) = self.applied.get(&(client, op_id)) {
            debug!(node = self.id, client, op_id, "duplicate put");
            return Ok(reply.clone());
        }
        let log = env.log()?;
        log.push(KvLogEntry::Stored {
            key: key.clone(),
            value: value.clone(),
        });
        log.push(KvLogEntry::Applied {
            client,
            op_id,
            reply: None,
        });
        self.store.insert(key, value);
        self.applied.insert((client, op_id), None);
        Ok(None)
    }
}

impl Node for KvNode {
    type Message = KvMessage;
    type LogEntry = KvLogEntry;
    type Operation = KvOperation;
    type Output = Option<String>;

    fn invoke(
        &mut self,
        env: &mut Environment<'_, Self>,
        operation: &KvOperation,
    ) -> NodeResult<Option<Option<String>>> {
        let op_id = self.next_op_id;
        env.log()?.push(KvLogEntry::Issued { op_id });
        self.next_op_id += 1;

        let owner = owner_of(operation.key(), self.node_count);
        if owner == self.id {
            return self.apply_local(env, operation).map(Some);
        }

        let request = match operation {
            KvOperation::Put { key, value } => KvMessage::PutRequest {
                op_id,
                key: key.clone(),
                value: value.clone(),
            },
            KvOperation::Get { key } => KvMessage::GetRequest {
                op_id,
                key: key.clone(),
            },
        };
        self.outstanding = Some(Outstanding {
            op_id,
            owner,
            request: request.clone(),
        });
        env.await_response(owner, op_id);
        env.send(request, owner)?;
        Ok(None)
    }

    fn on_message(
        &mut self,
        env: &mut Environment<'_, Self>,
        message: KvMessage,
        sender: NodeId,
    ) -> NodeResult<()> {
        match message {
            KvMessage::PutRequest { op_id, key, value } => {
                let reply = self.apply_put(env, sender, op_id, key, value)?;
                env.send(KvMessage::Reply { op_id, value: reply }, sender)
            }
            KvMessage::GetRequest { op_id, key } => {
                let value = self.store.get(&key).cloned();
                env.send(KvMessage::Reply { op_id, value }, sender)
            }
            // late or duplicated reply
            KvMessage::Reply { .. } => Ok(()),
        }
    }

    fn on_response(
        &mut self,
        env: &mut Environment<'_, Self>,
        message: KvMessage,
        _sender: NodeId,
    ) -> NodeResult<()> {
        let KvMessage::Reply { op_id, value } = message else {
            return Ok(());
        };
        match &self.outstanding {
            Some(outstanding) if outstanding.op_id == op_id => {
                self.outstanding = None;
                env.complete(value)
            }
            _ => Ok(()),
        }
    }

    fn on_peer_reconnected(
        &mut self,
        env: &mut Environment<'_, Self>,
        peer: NodeId,
    ) -> NodeResult<()> {
        let Some(outstanding) = &self.outstanding else {
            return Ok(());
        };
        if outstanding.owner != peer {
            return Ok(());
        }
        let (op_id, request) = (outstanding.op_id, outstanding.request.clone());
        debug!(node = self.id, owner = peer, op_id, "resending request");
        env.await_response(peer, op_id);
        env.send(request, peer)
    }

    fn recover(&mut self, env: &mut Environment<'_, Self>) -> NodeResult<()> {
        for entry in env.log()?.iter() {
            match entry {
                KvLogEntry::Issued { op_id } => {
                    self.next_op_id = self.next_op_id.max(op_id + 1);
                }
                KvLogEntry::Stored { key, value } => {
                    self.store.insert(key.clone(), value.clone());
                }
                KvLogEntry::Applied {
                    client,
                    op_id,
                    reply,
                } => {
                    self.applied.insert((*client, *op_id), reply.clone());
                }
            }
        }
        debug!(
            node = self.id,
            keys = self.store.len(),
            next_op_id = self.next_op_id,
            "state rebuilt from log"
        );
        Ok(())
    }

    fn state_representation(&self) -> Option<String> {
        Some(format!(
            "store={:?} next_op_id={} outstanding={:?}",
            self.store,
            self.next_op_id,
            self.outstanding.as_ref().map(|o| (o.op_id, o.owner))
        ))
    }
}

/// What the verifier knows about one key.
#[derive(Debug, Default)]
struct KeyHistory {
    current: Option<String>,
    /// Puts interrupted by a crash and not observed yet. Each may take effect
    /// at any later point, or never.
    floating: Vec<String>,
}

impl KeyHistory {
    fn apply(
        &mut self,
        operation: &KvOperation,
        result: &OperationResult<Option<String>>,
    ) -> bool {
        match (operation, result) {
            (_, OperationResult::NoResult) => false,
            (KvOperation::Put { value, .. }, OperationResult::Crashed) => {
                self.floating.push(value.clone());
                true
            }
            (KvOperation::Put { value, .. }, OperationResult::Value(None)) => {
                self.current = Some(value.clone());
                true
            }
            (KvOperation::Put { .. }, OperationResult::Value(Some(_))) => false,
            (KvOperation::Get { .. }, OperationResult::Crashed) => true,
            (KvOperation::Get { .. }, OperationResult::Value(observed)) => {
                if *observed == self.current {
                    return true;
                }
                let Some(observed) = observed else {
                    return false;
                };
                match self.floating.iter().position(|value| value == observed) {
                    Some(position) => {
                        self.floating.remove(position);
                        self.current = Some(observed.clone());
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

/// Accepts a history iff every node's operations are consistent with a
/// sequential map, where crashed puts may take effect at any later point.
///
/// Assumes every key is used by a single client node, as
/// [`kv_scenario`] generates.
#[derive(Debug, Clone, Copy, Default)]
pub struct KvVerifier;

impl Verifier<KvOperation, Option<String>> for KvVerifier {
    fn name(&self) -> &str {
        "kv_sharding"
    }

    fn verify_results(
        &self,
        scenario: &ExecutionScenario<KvOperation>,
        results: &ExecutionResult<Option<String>>,
    ) -> bool {
        for node in 0..scenario.node_count() {
            let operations = scenario.operations_for(node);
            let node_results = results.results_for(node);
            if operations.len() != node_results.len() {
                return false;
            }
            let mut keys: HashMap<&str, KeyHistory> = HashMap::new();
            for (index, (operation, result)) in operations.iter().zip(node_results).enumerate() {
                let history = keys.entry(operation.key()).or_default();
                if !history.apply(operation, result) {
                    debug!(node, index, ?operation, ?result, ?history, "history rejected");
                    return false;
                }
            }
        }
        true
    }
}

/// Scenario where each of `node_count` nodes runs `ops_per_node` operations
/// over two keys of its own, mixing puts and reads.
pub fn kv_scenario(node_count: usize, ops_per_node: usize) -> ExecutionScenario<KvOperation> {
    let operations = (0..node_count)
        .map(|node| {
            (0..ops_per_node)
                .map(|index| {
                    let key = format!("n{node}-k{}", index % 2);
                    if index % 3 == 2 {
                        KvOperation::Get { key }
                    } else {
                        KvOperation::Put {
                            key,
                            value: format!("n{node}-v{index}"),
                        }
                    }
                })
                .collect()
        })
        .collect();
    ExecutionScenario::new(operations)
}
