// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector nodes and telemetry builders shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use apm_stream::graph::GraphManager;
use apm_stream::persistence::{HistoryDeleter, InMemoryStorage};
use apm_stream::pipeline::{PipelineContext, PipelineSettings};
use apm_stream::remote::{
    ClusterRegistry, PeerAddress, RemoteClientManager, RemoteReceiver, StaticClusterRegistry,
    TcpRemoteClientFactory,
};
use apm_stream::telemetry::{Span, SpanType, TraceSegment};
use apm_stream::worker::{OverflowPolicy, WorkerInstances};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

// 2024-01-15T10:30:45.123Z
pub const TS: i64 = 1_705_314_645_123;

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        queue_size: 256,
        hot_queue_size: 256,
        overflow_policy: OverflowPolicy::Block,
        aggregation_flush_interval: Duration::from_millis(50),
        persistence_flush_interval: Duration::from_millis(100),
    }
}

/// One collector process: stream graphs, workers, storage and a remote
/// receiver listening on an ephemeral port.
pub struct TestNode {
    pub address: PeerAddress,
    pub graphs: Arc<GraphManager>,
    pub workers: Arc<WorkerInstances>,
    pub storage: Arc<InMemoryStorage>,
    pub remote: Arc<RemoteClientManager>,
    pub cluster: StaticClusterRegistry,
    pub cancel: CancellationToken,
    listener: Option<TcpListener>,
}

impl TestNode {
    /// Binds the receiver port. Pipelines start with [`TestNode::start`].
    pub async fn bind(settings: &PipelineSettings) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let address = PeerAddress::new("127.0.0.1", port);
        let remote = Arc::new(RemoteClientManager::new(
            address.clone(),
            64,
            Arc::new(TcpRemoteClientFactory {
                buffer: 1024,
                connect_timeout: Duration::from_secs(1),
            }),
        ));
        let node = Self {
            address,
            graphs: Arc::new(GraphManager::new()),
            workers: Arc::new(WorkerInstances::new()),
            storage: Arc::new(InMemoryStorage::new()),
            remote,
            cluster: StaticClusterRegistry::default(),
            cancel: CancellationToken::new(),
            listener: Some(listener),
        };
        node.context(settings)
            .build_all(&mut HistoryDeleter::default())
            .unwrap();
        node
    }

    /// Joins `peers` and starts serving remote messages.
    pub fn start(&mut self, peers: &[PeerAddress]) {
        self.cluster.subscribe(self.remote.clone());
        for peer in peers {
            self.cluster.join(peer.clone());
        }
        if let Some(listener) = self.listener.take() {
            let receiver = Arc::new(RemoteReceiver::new(Arc::clone(&self.graphs)));
            tokio::spawn(receiver.serve(listener, self.cancel.clone()));
        }
    }

    pub async fn stop(&self) {
        self.workers.shutdown().await;
        self.cancel.cancel();
        self.remote.close_all();
    }

    fn context(&self, settings: &PipelineSettings) -> PipelineContext<InMemoryStorage> {
        PipelineContext {
            graphs: Arc::clone(&self.graphs),
            workers: Arc::clone(&self.workers),
            remote: Arc::clone(&self.remote),
            storage: Arc::clone(&self.storage),
            settings: settings.clone(),
        }
    }
}

/// Polls `check` until it holds or `within` elapses.
pub async fn eventually(within: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

pub fn entry_segment(segment_id: &str, service: &str, instance: &str, duration: i64) -> TraceSegment {
    TraceSegment {
        trace_id: format!("trace-{segment_id}"),
        segment_id: segment_id.to_string(),
        service_name: service.to_string(),
        service_instance_name: instance.to_string(),
        spans: vec![Span {
            span_id: 0,
            parent_span_id: -1,
            span_type: SpanType::Entry,
            operation_name: "/checkout".to_string(),
            start_time: TS,
            end_time: TS + duration,
            is_error: false,
            peer: None,
            refs: Vec::new(),
            operation_id: None,
            peer_id: None,
        }],
        service_id: None,
        service_instance_id: None,
    }
}
