// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, error};

use super::{Graph, GraphId, NodeId};
use crate::errors::{GraphError, WorkerError};
use crate::record::{Record, Schema};

/// A single processing stage of a graph.
///
/// The id must be stable across processes: remote peers address nodes by it.
#[async_trait]
pub trait NodeProcessor: Send + Sync + 'static {
    fn id(&self) -> NodeId;

    /// Schema of records this node accepts from remote peers. Nodes returning
    /// `None` cannot be targeted by remote dispatch.
    fn input_schema(&self) -> Option<&'static Schema> {
        None
    }

    async fn process(&self, record: Record, next: &Next) -> Result<(), WorkerError>;

    /// Called once when the owning graph is sealed, with the forwarder to this
    /// node's downstream edges.
    fn on_sealed(&self, _next: Next) {}
}

pub(crate) struct NodeSlot {
    pub(crate) processor: Arc<dyn NodeProcessor>,
    pub(crate) next: Vec<usize>,
}

/// Arena holding a graph's nodes; edges are indexes into `nodes`.
pub(crate) struct Topology {
    pub(crate) graph_id: GraphId,
    pub(crate) nodes: Vec<NodeSlot>,
    pub(crate) index: HashMap<NodeId, usize>,
    pub(crate) entry: Option<usize>,
}

impl Topology {
    pub(crate) fn new(graph_id: GraphId) -> Self {
        Self {
            graph_id,
            nodes: Vec::new(),
            index: HashMap::new(),
            entry: None,
        }
    }
}

pub(crate) async fn run_node(topology: &Arc<Topology>, index: usize, record: Record) {
    let slot = &topology.nodes[index];
    let next = Next {
        graph_id: topology.graph_id,
        node: index,
        topology: Arc::downgrade(topology),
    };
    if let Err(e) = slot.processor.process(record, &next).await {
        error!(
            graph_id = topology.graph_id,
            node_id = slot.processor.id(),
            "Failed to process record: {e}"
        );
    }
}

/// Forwarder to the downstream edges of one node of a sealed graph.
#[derive(Clone, Debug)]
pub struct Next {
    graph_id: GraphId,
    node: usize,
    topology: Weak<Topology>,
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("graph_id", &self.graph_id)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Next {
    /// A forwarder attached to nothing. Records handed to it are discarded.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            graph_id: -1,
            node: 0,
            topology: Weak::new(),
        }
    }

    pub(crate) fn new(graph_id: GraphId, node: usize, topology: &Arc<Topology>) -> Self {
        Self {
            graph_id,
            node,
            topology: Arc::downgrade(topology),
        }
    }

    #[must_use]
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    #[must_use]
    pub fn downstream_count(&self) -> usize {
        self.topology
            .upgrade()
            .map_or(0, |topology| topology.nodes[self.node].next.len())
    }

    /// Hands `record` to every downstream node, in registration order. The
    /// last edge receives the record itself, the others a clone.
    pub async fn execute(&self, record: Record) {
        let Some(topology) = self.topology.upgrade() else {
            debug!(graph_id = self.graph_id, "Dropping record sent to a detached node");
            return;
        };
        let targets = &topology.nodes[self.node].next;
        let mut record = Some(record);
        for (i, &target) in targets.iter().enumerate() {
            let input = if i + 1 == targets.len() {
                record.take()
            } else {
                record.clone()
            };
            if let Some(input) = input {
                run_node(&topology, target, input).await;
            }
        }
    }
}

/// Handle on a registered node, used to chain downstream nodes.
#[derive(Clone)]
pub struct NodeHandle {
    pub(crate) graph: Arc<Graph>,
    pub(crate) index: usize,
    pub(crate) node_id: NodeId,
    pub(crate) input_schema: Option<&'static Schema>,
}

impl NodeHandle {
    /// Registers `processor` downstream of this node and returns its handle.
    /// Calling it several times on the same handle fans out.
    pub fn add_next(&self, processor: Arc<dyn NodeProcessor>) -> Result<NodeHandle, GraphError> {
        self.graph.register(Some(self.index), processor)
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    #[must_use]
    pub fn graph_id(&self) -> GraphId {
        self.graph.id()
    }

    #[must_use]
    pub fn input_schema(&self) -> Option<&'static Schema> {
        self.input_schema
    }

    /// Forwarder to this node's downstream edges. Requires a sealed graph.
    pub fn next(&self) -> Result<Next, GraphError> {
        let topology = self.graph.sealed_topology()?;
        Ok(Next::new(self.graph.id(), self.index, topology))
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("graph_id", &self.graph.id())
            .field("node_id", &self.node_id)
            .finish()
    }
}
