// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stream graphs.
//!
//! Every stream gets one graph. Node ids are `graph_id * 100 + stage`, which
//! keeps them unique across graphs and therefore usable as worker ids.
//!
//! Inventory streams persist a single row per entity:
//!
//! ```text
//!   aggregation ─> remote ─> persistence (merge with stored row)
//! ```
//!
//! Metric streams persist per minute and roll up into hour, day and month:
//!
//! ```text
//!   aggregation ─> remote ─┬─> persistence(minute)
//!                          ├─> transform(hour)  ─> persistence(hour)
//!                          ├─> transform(day)   ─> persistence(day)
//!                          └─> transform(month) ─> persistence(month)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::aggregation::AggregationWorkerFactory;
use crate::constants::{
    DEFAULT_QUEUE_SIZE, HOT_QUEUE_SIZE, INSTANCE_HEARTBEAT_GRAPH_ID, INSTANCE_MAPPING_GRAPH_ID,
    JVM_CPU_GRAPH_ID, JVM_GC_GRAPH_ID, JVM_MEMORY_GRAPH_ID, SERVICE_HEARTBEAT_GRAPH_ID,
    SERVICE_REFERENCE_GRAPH_ID,
};
use crate::errors::PipelineError;
use crate::graph::{GraphId, GraphManager, NodeHandle, NodeId};
use crate::metrics::schemas::{
    INSTANCE_HEARTBEAT, INSTANCE_MAPPING, JVM_CPU, JVM_GC, JVM_MEMORY, SERVICE_HEARTBEAT,
    SERVICE_REFERENCE,
};
use crate::persistence::memory::table_name;
use crate::persistence::{
    HistoryDeleter, InMemoryDao, InMemoryStorage, PersistenceWorkerFactory, StorageDao,
    TransformNode,
};
use crate::record::{Granularity, Schema};
use crate::remote::{RemoteClientManager, RemoteNode};
use crate::worker::{OverflowPolicy, WorkerInstances};

pub const AGGREGATION_STAGE: NodeId = 1;
pub const REMOTE_STAGE: NodeId = 2;
/// Persistence of inventory streams and of minute metrics.
pub const PERSISTENCE_STAGE: NodeId = 3;

/// Transform and persistence stages of the coarser metric granularities.
fn rollup_stages(granularity: Granularity) -> Option<(NodeId, NodeId)> {
    match granularity {
        Granularity::Minute => None,
        Granularity::Hour => Some((4, 5)),
        Granularity::Day => Some((6, 7)),
        Granularity::Month => Some((8, 9)),
    }
}

#[must_use]
pub fn node_id(graph_id: GraphId, stage: NodeId) -> NodeId {
    graph_id * 100 + stage
}

/// Source of the DAOs backing each persisted table.
pub trait StorageProvider: Send + Sync {
    type Dao: StorageDao;

    fn dao(&self, schema: &'static Schema, granularity: Option<Granularity>) -> Arc<Self::Dao>;
}

impl StorageProvider for InMemoryStorage {
    type Dao = InMemoryDao;

    fn dao(&self, schema: &'static Schema, granularity: Option<Granularity>) -> Arc<InMemoryDao> {
        InMemoryStorage::dao(self, schema, granularity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Inventory,
    Metric,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamDefinition {
    pub graph_id: GraphId,
    pub schema: &'static Schema,
    pub kind: StreamKind,
    /// Fed once per segment; gets the larger aggregation queue.
    pub hot: bool,
}

pub static STREAMS: [StreamDefinition; 7] = [
    StreamDefinition {
        graph_id: SERVICE_HEARTBEAT_GRAPH_ID,
        schema: &SERVICE_HEARTBEAT,
        kind: StreamKind::Inventory,
        hot: true,
    },
    StreamDefinition {
        graph_id: INSTANCE_HEARTBEAT_GRAPH_ID,
        schema: &INSTANCE_HEARTBEAT,
        kind: StreamKind::Inventory,
        hot: true,
    },
    StreamDefinition {
        graph_id: INSTANCE_MAPPING_GRAPH_ID,
        schema: &INSTANCE_MAPPING,
        kind: StreamKind::Inventory,
        hot: false,
    },
    StreamDefinition {
        graph_id: SERVICE_REFERENCE_GRAPH_ID,
        schema: &SERVICE_REFERENCE,
        kind: StreamKind::Metric,
        hot: false,
    },
    StreamDefinition {
        graph_id: JVM_CPU_GRAPH_ID,
        schema: &JVM_CPU,
        kind: StreamKind::Metric,
        hot: false,
    },
    StreamDefinition {
        graph_id: JVM_MEMORY_GRAPH_ID,
        schema: &JVM_MEMORY,
        kind: StreamKind::Metric,
        hot: false,
    },
    StreamDefinition {
        graph_id: JVM_GC_GRAPH_ID,
        schema: &JVM_GC,
        kind: StreamKind::Metric,
        hot: false,
    },
];

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub queue_size: usize,
    pub hot_queue_size: usize,
    pub overflow_policy: OverflowPolicy,
    pub aggregation_flush_interval: Duration,
    pub persistence_flush_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            hot_queue_size: HOT_QUEUE_SIZE,
            overflow_policy: OverflowPolicy::Block,
            aggregation_flush_interval: Duration::from_secs(1),
            persistence_flush_interval: Duration::from_secs(3),
        }
    }
}

/// Everything a stream graph is built from.
pub struct PipelineContext<S: StorageProvider> {
    pub graphs: Arc<GraphManager>,
    pub workers: Arc<WorkerInstances>,
    pub remote: Arc<RemoteClientManager>,
    pub storage: Arc<S>,
    pub settings: PipelineSettings,
}

impl<S: StorageProvider> PipelineContext<S> {
    /// Builds every stream and seals all graphs. Tables with a time bucket
    /// are registered with `deleter`.
    ///
    /// Must be called from within a tokio runtime, since it starts workers.
    pub fn build_all(&self, deleter: &mut HistoryDeleter) -> Result<(), PipelineError> {
        for stream in &STREAMS {
            self.build_stream(stream, deleter)?;
        }
        self.graphs.seal_all()?;
        info!(
            "Built {} stream graphs with {} workers",
            STREAMS.len(),
            self.workers.len()
        );
        Ok(())
    }

    /// Registers the nodes of one stream. The graph is left unsealed.
    pub fn build_stream(
        &self,
        stream: &StreamDefinition,
        deleter: &mut HistoryDeleter,
    ) -> Result<(), PipelineError> {
        let graph_id = stream.graph_id;
        let name = stream.schema.name;
        let graph = self.graphs.create_if_absent(graph_id);

        let aggregation = self.workers.create(&AggregationWorkerFactory {
            id: node_id(graph_id, AGGREGATION_STAGE),
            name: format!("{name}_aggregation"),
            queue_size: if stream.hot {
                self.settings.hot_queue_size
            } else {
                self.settings.queue_size
            },
            overflow_policy: self.settings.overflow_policy,
            flush_interval: self.settings.aggregation_flush_interval,
        })?;
        let remote = graph.add_node(aggregation)?.add_next(Arc::new(RemoteNode::new(
            node_id(graph_id, REMOTE_STAGE),
            graph_id,
            stream.schema,
            Arc::clone(&self.remote),
        )))?;

        match stream.kind {
            StreamKind::Inventory => {
                self.add_persistence(&remote, stream.schema, None, PERSISTENCE_STAGE)?;
            }
            StreamKind::Metric => {
                self.add_persistence(
                    &remote,
                    stream.schema,
                    Some(Granularity::Minute),
                    PERSISTENCE_STAGE,
                )?;
                for granularity in Granularity::ALL {
                    let Some((transform_stage, persistence_stage)) = rollup_stages(granularity)
                    else {
                        continue;
                    };
                    let transform = remote.add_next(Arc::new(TransformNode::new(
                        node_id(graph_id, transform_stage),
                        Granularity::Minute,
                        granularity,
                    )))?;
                    self.add_persistence(
                        &transform,
                        stream.schema,
                        Some(granularity),
                        persistence_stage,
                    )?;
                }
                for granularity in Granularity::ALL {
                    let dao = self.storage.dao(stream.schema, Some(granularity));
                    deleter.register(table_name(stream.schema, Some(granularity)), granularity, dao);
                }
            }
        }
        Ok(())
    }

    fn add_persistence(
        &self,
        parent: &NodeHandle,
        schema: &'static Schema,
        granularity: Option<Granularity>,
        stage: NodeId,
    ) -> Result<NodeHandle, PipelineError> {
        let table = table_name(schema, granularity);
        let worker = self.workers.create(&PersistenceWorkerFactory {
            id: node_id(parent.graph_id(), stage),
            name: format!("{table}_persistence"),
            dao: self.storage.dao(schema, granularity),
            need_merge_db_data: true,
            queue_size: self.settings.queue_size,
            overflow_policy: self.settings.overflow_policy,
            flush_interval: self.settings.persistence_flush_interval,
        })?;
        Ok(parent.add_next(worker)?)
    }
}
