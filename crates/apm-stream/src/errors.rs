// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types shared across the stream core.
//!
//! Construction-time failures (`GraphError`, `PipelineError`) abort startup.
//! Everything raised while a record is in flight (`WorkerError` and the errors
//! it wraps) is logged where it happens and the record is dropped.

use crate::graph::{GraphId, NodeId};
use crate::record::ValueKind;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("schema `{schema}` has no attribute `{attribute}`")]
    UnknownAttribute {
        schema: &'static str,
        attribute: String,
    },
    #[error("attribute `{attribute}` of schema `{schema}` expects {expected:?}, got {actual:?}")]
    KindMismatch {
        schema: &'static str,
        attribute: &'static str,
        expected: ValueKind,
        actual: ValueKind,
    },
    #[error("schema `{schema}` expects {expected} values, got {actual}")]
    Arity {
        schema: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("cannot merge `{other}` into `{this}`: schema or id differs")]
    Unmergeable { this: String, other: String },
    #[error("timestamp {0}ms is out of range")]
    InvalidTimestamp(i64),
    #[error("time bucket {0} is not a valid calendar bucket")]
    InvalidTimeBucket(i64),
    #[error("cannot convert a {from} bucket to {to}")]
    Granularity {
        from: &'static str,
        to: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("potential cyclic graph: node {node_id} is already registered in graph {graph_id}")]
    PotentialCyclicGraph { graph_id: GraphId, node_id: NodeId },
    #[error("node {node_id} not found in graph {graph_id}")]
    NodeNotFound { graph_id: GraphId, node_id: NodeId },
    #[error("graph {0} not found")]
    GraphNotFound(GraphId),
    #[error("graph {0} already has an entry node")]
    EntryAlreadySet(GraphId),
    #[error("graph {0} has no entry node")]
    NoEntry(GraphId),
    #[error("graph {0} is sealed, no more nodes can be registered")]
    Sealed(GraphId),
    #[error("graph {0} is not sealed yet")]
    NotSealed(GraphId),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage write failed: {0}")]
    Write(String),
    #[error("storage read failed: {0}")]
    Read(String),
    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to decode remote message: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("remote message has no payload")]
    MissingPayload,
    #[error("node {node_id} of graph {graph_id} does not accept remote records")]
    NotRemoteTarget { graph_id: GraphId, node_id: NodeId },
    #[error("schema `{schema}` expects {expected} {kind:?} fields on the wire, got {actual}")]
    FieldCount {
        schema: &'static str,
        kind: ValueKind,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("no healthy peer available")]
    NoPeers,
    #[error("peer {0} left the cluster")]
    PeerEvicted(String),
    #[error("send buffer for peer {0} is full")]
    BufferFull(String),
    #[error("invalid peer address `{0}`, expected host:port")]
    InvalidAddress(String),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("queue of worker `{0}` is full, record dropped")]
    QueueFull(String),
    #[error("queue of worker `{0}` is closed")]
    QueueClosed(String),
    #[error("worker {0} is already registered")]
    DuplicateWorker(NodeId),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("segment {0} still references unresolved names")]
    Unresolved(String),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}
