// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Aggregation worker: merges records sharing an id inside the current
//! window and forwards the merged window downstream on every flush.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::WorkerError;
use crate::graph::{Next, NodeId};
use crate::record::Record;
use crate::worker::{DoubleBufferedWindow, OverflowPolicy, Worker, WorkerFactory};

pub struct AggregationWorker {
    name: String,
    window: DoubleBufferedWindow,
    flush_interval: Duration,
}

impl AggregationWorker {
    #[must_use]
    pub fn new(name: String, flush_interval: Duration) -> Self {
        Self {
            name,
            window: DoubleBufferedWindow::new(),
            flush_interval,
        }
    }
}

#[async_trait]
impl Worker for AggregationWorker {
    async fn on_work(&self, record: Record, _next: &Next) -> Result<(), WorkerError> {
        self.window.accept(record)?;
        Ok(())
    }

    fn flush_interval(&self) -> Option<Duration> {
        Some(self.flush_interval)
    }

    async fn on_flush(&self, next: &Next) {
        let records = self.window.swap_and_drain();
        if records.is_empty() {
            return;
        }
        debug!(worker = %self.name, "Forwarding {} aggregated records", records.len());
        for record in records {
            next.execute(record).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregationWorkerFactory {
    pub id: NodeId,
    pub name: String,
    pub queue_size: usize,
    pub overflow_policy: OverflowPolicy,
    pub flush_interval: Duration,
}

impl WorkerFactory for AggregationWorkerFactory {
    type Worker = AggregationWorker;

    fn worker_id(&self) -> NodeId {
        self.id
    }

    fn worker_name(&self) -> String {
        self.name.clone()
    }

    fn worker_instance(&self) -> AggregationWorker {
        AggregationWorker::new(self.name.clone(), self.flush_interval)
    }

    fn queue_size(&self) -> usize {
        self.queue_size
    }

    fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::Tap;
    use crate::graph::GraphManager;
    use crate::metrics::schemas::SERVICE_HEARTBEAT;
    use crate::worker::WorkerInstances;

    fn heartbeat(service_id: &str, time: i64) -> Record {
        Record::builder(&SERVICE_HEARTBEAT, service_id, 0)
            .set("heart_beat_time", time)
            .build()
            .unwrap()
    }

    fn factory(flush_interval: Duration) -> AggregationWorkerFactory {
        AggregationWorkerFactory {
            id: 1,
            name: "service_heartbeat_aggregation".into(),
            queue_size: 16,
            overflow_policy: OverflowPolicy::Block,
            flush_interval,
        }
    }

    #[tokio::test]
    async fn test_last_heartbeat_wins_within_window() {
        let worker = AggregationWorker::new("hb".into(), Duration::from_secs(1));
        let downstream = Tap::new(2);
        let graph = GraphManager::new().create_if_absent(2);
        graph.add_node(Tap::new(1)).unwrap().add_next(downstream.clone()).unwrap();
        graph.seal().unwrap();
        let next = graph.to_finder().find_next(1).unwrap();

        worker.on_work(heartbeat("3", 100), &next).await.unwrap();
        worker.on_work(heartbeat("3", 200), &next).await.unwrap();
        worker.on_flush(&next).await;

        let seen = downstream.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id(), "3");
        assert_eq!(seen[0].get_long("heart_beat_time"), Some(200));
    }

    #[tokio::test]
    async fn test_empty_window_flushes_nothing() {
        let graph = GraphManager::new().create_if_absent(1);
        let downstream = Tap::new(2);
        graph.add_node(Tap::new(1)).unwrap().add_next(downstream.clone()).unwrap();
        graph.seal().unwrap();
        let next = graph.to_finder().find_next(1).unwrap();

        let worker = AggregationWorker::new("hb".into(), Duration::from_secs(1));
        worker.on_flush(&next).await;
        worker.on_flush(&next).await;
        assert!(downstream.seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_flushes_on_its_interval() {
        let workers = WorkerInstances::new();
        let graph = GraphManager::new().create_if_absent(1);
        let downstream = Tap::new(2);
        graph
            .add_node(workers.create(&factory(Duration::from_secs(1))).unwrap())
            .unwrap()
            .add_next(downstream.clone())
            .unwrap();
        graph.seal().unwrap();

        graph.start(heartbeat("3", 100)).await.unwrap();
        graph.start(heartbeat("3", 200)).await.unwrap();
        graph.start(heartbeat("4", 50)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let mut seen = downstream.seen();
        seen.sort_by(|a, b| a.id().cmp(b.id()));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].get_long("heart_beat_time"), Some(200));
        assert_eq!(seen[1].get_long("heart_beat_time"), Some(50));

        graph.start(heartbeat("3", 300)).await.unwrap();
        workers.shutdown().await;
        assert_eq!(downstream.seen().len(), 3);
    }
}
