// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Graph engine.
//!
//! A graph is a small DAG of [`NodeProcessor`]s built during startup:
//!
//! ```text
//!   graph.add_node(entry) ──> handle.add_next(a) ──> a.add_next(b)
//!                                                └─> a.add_next(c)   (fan-out)
//! ```
//!
//! Nodes live in an arena owned by the graph and edges are index lists. Node
//! ids are unique per graph: registering an id twice is rejected as a
//! potential cycle, which is the only cycle protection the engine offers.
//!
//! Once every pipeline is registered the graph is sealed. Sealing freezes the
//! arena behind an `Arc`; traversal after that point never takes a lock.

mod finder;
mod node;

pub use finder::NodeFinder;
pub use node::{Next, NodeHandle, NodeProcessor};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::GraphError;
use crate::record::{Record, Schema};
use node::{run_node, NodeSlot, Topology};

pub type GraphId = i32;
pub type NodeId = i32;

pub struct Graph {
    id: GraphId,
    building: Mutex<Topology>,
    sealed: OnceLock<Arc<Topology>>,
}

impl Graph {
    fn new(id: GraphId) -> Self {
        Self {
            id,
            building: Mutex::new(Topology::new(id)),
            sealed: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> GraphId {
        self.id
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    /// Registers the entry node. A graph has exactly one entry.
    pub fn add_node(
        self: &Arc<Self>,
        processor: Arc<dyn NodeProcessor>,
    ) -> Result<NodeHandle, GraphError> {
        self.register(None, processor)
    }

    pub(crate) fn register(
        self: &Arc<Self>,
        parent: Option<usize>,
        processor: Arc<dyn NodeProcessor>,
    ) -> Result<NodeHandle, GraphError> {
        let mut topology = self.building();
        if self.is_sealed() {
            return Err(GraphError::Sealed(self.id));
        }
        if parent.is_none() && topology.entry.is_some() {
            return Err(GraphError::EntryAlreadySet(self.id));
        }
        let node_id = processor.id();
        if topology.index.contains_key(&node_id) {
            return Err(GraphError::PotentialCyclicGraph {
                graph_id: self.id,
                node_id,
            });
        }

        let input_schema = processor.input_schema();
        let index = topology.nodes.len();
        topology.nodes.push(NodeSlot {
            processor,
            next: Vec::new(),
        });
        topology.index.insert(node_id, index);
        match parent {
            Some(parent) => topology.nodes[parent].next.push(index),
            None => topology.entry = Some(index),
        }
        debug!(graph_id = self.id, node_id, "Registered graph node");

        Ok(NodeHandle {
            graph: Arc::clone(self),
            index,
            node_id,
            input_schema,
        })
    }

    /// Freezes the topology and hands every node its downstream forwarder.
    /// Sealing twice is a no-op.
    pub fn seal(&self) -> Result<(), GraphError> {
        let mut building = self.building();
        if self.is_sealed() {
            return Ok(());
        }
        let topology = Arc::new(std::mem::replace(&mut *building, Topology::new(self.id)));
        if topology.entry.is_none() {
            warn!(graph_id = self.id, "Sealing a graph without entry node");
        }
        for (index, slot) in topology.nodes.iter().enumerate() {
            slot.processor.on_sealed(Next::new(self.id, index, &topology));
        }
        // Still holding the building lock, so nobody else can have set it.
        let _ = self.sealed.set(topology);
        Ok(())
    }

    /// Pushes `record` into the entry node.
    pub async fn start(&self, record: Record) -> Result<(), GraphError> {
        let topology = self.sealed_topology()?;
        let entry = topology.entry.ok_or(GraphError::NoEntry(self.id))?;
        run_node(topology, entry, record).await;
        Ok(())
    }

    #[must_use]
    pub fn to_finder(self: &Arc<Self>) -> NodeFinder {
        NodeFinder::new(Arc::clone(self))
    }

    /// Node and edge listing, for diagnostics.
    #[must_use]
    pub fn describe(&self) -> GraphDescription {
        match self.sealed.get() {
            Some(topology) => describe(topology),
            None => describe(&self.building()),
        }
    }

    pub(crate) fn sealed_topology(&self) -> Result<&Arc<Topology>, GraphError> {
        self.sealed.get().ok_or(GraphError::NotSealed(self.id))
    }

    pub(crate) fn lookup(&self, node_id: NodeId) -> Option<(usize, Option<&'static Schema>)> {
        let find = |topology: &Topology| {
            topology
                .index
                .get(&node_id)
                .map(|&i| (i, topology.nodes[i].processor.input_schema()))
        };
        match self.sealed.get() {
            Some(topology) => find(topology),
            None => find(&self.building()),
        }
    }

    fn building(&self) -> MutexGuard<'_, Topology> {
        #[allow(clippy::expect_used)]
        self.building.lock().expect("lock poisoned")
    }
}

fn describe(topology: &Topology) -> GraphDescription {
    let id_of = |i: usize| topology.nodes[i].processor.id();
    GraphDescription {
        graph_id: topology.graph_id,
        entry: topology.entry.map(id_of),
        nodes: topology
            .nodes
            .iter()
            .map(|slot| NodeDescription {
                node_id: slot.processor.id(),
                next: slot.next.iter().copied().map(id_of).collect(),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphDescription {
    pub graph_id: GraphId,
    pub entry: Option<NodeId>,
    pub nodes: Vec<NodeDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDescription {
    pub node_id: NodeId,
    pub next: Vec<NodeId>,
}

/// Registry of graphs keyed by id. Constructed once at startup and passed to
/// every component that needs to look a graph up.
#[derive(Default)]
pub struct GraphManager {
    graphs: RwLock<HashMap<GraphId, Arc<Graph>>>,
}

impl GraphManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the graph registered under `id`, creating an empty one if needed.
    pub fn create_if_absent(&self, id: GraphId) -> Arc<Graph> {
        #[allow(clippy::expect_used)]
        if let Some(graph) = self.graphs.read().expect("lock poisoned").get(&id) {
            return Arc::clone(graph);
        }
        #[allow(clippy::expect_used)]
        let mut graphs = self.graphs.write().expect("lock poisoned");
        Arc::clone(graphs.entry(id).or_insert_with(|| Arc::new(Graph::new(id))))
    }

    pub fn find(&self, id: GraphId) -> Result<Arc<Graph>, GraphError> {
        #[allow(clippy::expect_used)]
        self.graphs
            .read()
            .expect("lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(GraphError::GraphNotFound(id))
    }

    pub fn seal_all(&self) -> Result<(), GraphError> {
        for graph in self.all() {
            graph.seal()?;
        }
        Ok(())
    }

    pub async fn start(&self, graph_id: GraphId, record: Record) -> Result<(), GraphError> {
        let graph = self.find(graph_id)?;
        graph.start(record).await
    }

    #[must_use]
    pub fn graph_ids(&self) -> Vec<GraphId> {
        let mut ids: Vec<GraphId> = self.all().iter().map(|g| g.id()).collect();
        ids.sort_unstable();
        ids
    }

    /// Drops every graph. Only meant for test teardown.
    pub fn reset(&self) {
        #[allow(clippy::expect_used)]
        self.graphs.write().expect("lock poisoned").clear();
    }

    fn all(&self) -> Vec<Arc<Graph>> {
        #[allow(clippy::expect_used)]
        self.graphs
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}
