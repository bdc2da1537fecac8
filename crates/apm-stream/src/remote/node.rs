// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;

use super::manager::{RemoteClientManager, Route};
use super::wire::encode_message;
use crate::errors::WorkerError;
use crate::graph::{GraphId, Next, NodeId, NodeProcessor};
use crate::record::{Record, Schema};

/// Sends every record to the peer owning its id. Records owned by the local
/// process continue down the graph without being serialized; the others
/// resume on the owner at this node's downstream edges.
pub struct RemoteNode {
    id: NodeId,
    graph_id: GraphId,
    schema: &'static Schema,
    manager: Arc<RemoteClientManager>,
}

impl RemoteNode {
    #[must_use]
    pub fn new(
        id: NodeId,
        graph_id: GraphId,
        schema: &'static Schema,
        manager: Arc<RemoteClientManager>,
    ) -> Self {
        Self {
            id,
            graph_id,
            schema,
            manager,
        }
    }
}

#[async_trait]
impl NodeProcessor for RemoteNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn input_schema(&self) -> Option<&'static Schema> {
        Some(self.schema)
    }

    async fn process(&self, record: Record, next: &Next) -> Result<(), WorkerError> {
        match self.manager.route(record.id())? {
            Route::Local => next.execute(record).await,
            Route::Remote(client) => {
                client.push(encode_message(self.graph_id, self.id, &record))?;
            }
        }
        Ok(())
    }
}
