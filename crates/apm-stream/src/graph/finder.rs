// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use super::{Graph, Next, NodeHandle, NodeId};
use crate::errors::GraphError;

/// Looks up nodes of an already built graph, either to attach more edges
/// before sealing or to enter the graph in the middle (remote dispatch).
pub struct NodeFinder {
    graph: Arc<Graph>,
}

impl NodeFinder {
    pub(crate) fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    pub fn find_node(&self, node_id: NodeId) -> Result<NodeHandle, GraphError> {
        let (index, input_schema) =
            self.graph
                .lookup(node_id)
                .ok_or(GraphError::NodeNotFound {
                    graph_id: self.graph.id(),
                    node_id,
                })?;
        Ok(NodeHandle {
            graph: Arc::clone(&self.graph),
            index,
            node_id,
            input_schema,
        })
    }

    /// Forwarder to the downstream edges of `node_id`.
    pub fn find_next(&self, node_id: NodeId) -> Result<Next, GraphError> {
        self.find_node(node_id)?.next()
    }
}
