// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Persistence workers and the storage boundary.

pub mod dao;
pub mod memory;
pub mod transform;
pub mod ttl;

pub use dao::{HistoryCleaner, StorageDao};
pub use memory::{InMemoryDao, InMemoryStorage, MemoryBatchEntity};
pub use transform::TransformNode;
pub use ttl::{HistoryDeleter, TtlConfig};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::errors::{StorageError, WorkerError};
use crate::graph::{Next, NodeId};
use crate::record::Record;
use crate::worker::{DoubleBufferedWindow, OverflowPolicy, Worker, WorkerFactory};

/// Batches records and writes them through a [`StorageDao`] on every flush.
///
/// With `need_merge_db_data` set, each record is first merged into the row
/// already stored under its id (if any) and written as an update, so buckets
/// hit by several aggregation cycles accumulate instead of being overwritten.
pub struct PersistenceWorker<D: StorageDao> {
    name: String,
    dao: Arc<D>,
    window: DoubleBufferedWindow,
    need_merge_db_data: bool,
    flush_interval: Duration,
}

impl<D: StorageDao> PersistenceWorker<D> {
    #[must_use]
    pub fn new(name: String, dao: Arc<D>, need_merge_db_data: bool, flush_interval: Duration) -> Self {
        Self {
            name,
            dao,
            window: DoubleBufferedWindow::new(),
            need_merge_db_data,
            flush_interval,
        }
    }

    async fn prepare(&self, record: Record) -> Result<(D::BatchEntity, Record), StorageError> {
        if !self.need_merge_db_data {
            return Ok((self.dao.prepare_batch_insert(record.clone())?, record));
        }
        match self.dao.get(record.schema(), record.id()).await? {
            Some(mut stored) => {
                stored.merge(&record)?;
                Ok((self.dao.prepare_batch_update(stored.clone())?, stored))
            }
            None => Ok((self.dao.prepare_batch_insert(record.clone())?, record)),
        }
    }
}

#[async_trait]
impl<D: StorageDao> Worker for PersistenceWorker<D> {
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

        let mut batch = Vec::with_capacity(records.len());
        let mut persisted = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id().to_string();
            match self.prepare(record).await {
                Ok((entity, record)) => {
                    batch.push(entity);
                    persisted.push(record);
                }
                Err(e) => error!(worker = %self.name, record_id = %id, "Failed to prepare record: {e}"),
            }
        }
        if batch.is_empty() {
            return;
        }

        let size = batch.len();
        if let Err(e) = self.dao.batch_persist(batch).await {
            error!(worker = %self.name, "Failed to persist batch of {size} records, dropping it: {e}");
            return;
        }
        debug!(worker = %self.name, "Persisted {size} records");

        if next.downstream_count() > 0 {
            for record in persisted {
                next.execute(record).await;
            }
        }
    }
}

pub struct PersistenceWorkerFactory<D: StorageDao> {
    pub id: NodeId,
    pub name: String,
    pub dao: Arc<D>,
    pub need_merge_db_data: bool,
    pub queue_size: usize,
    pub overflow_policy: OverflowPolicy,
    pub flush_interval: Duration,
}

impl<D: StorageDao> WorkerFactory for PersistenceWorkerFactory<D> {
    type Worker = PersistenceWorker<D>;

    fn worker_id(&self) -> NodeId {
        self.id
    }

    fn worker_name(&self) -> String {
        self.name.clone()
    }

    fn worker_instance(&self) -> PersistenceWorker<D> {
        PersistenceWorker::new(
            self.name.clone(),
            Arc::clone(&self.dao),
            self.need_merge_db_data,
            self.flush_interval,
        )
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
    use crate::graph::{GraphManager, NodeProcessor};
    use crate::metrics::schemas::SERVICE_REFERENCE;
    use crate::record::Granularity;

    const BUCKET: i64 = 202_401_151_030;

    fn reference(front: i32, s1: i64) -> Record {
        Record::builder(&SERVICE_REFERENCE, "1_2", BUCKET)
            .set("front_service_id", front)
            .set("one_second_less", s1)
            .set("summary", s1)
            .build()
            .unwrap()
    }

    fn worker(dao: &Arc<InMemoryDao>, merge: bool) -> PersistenceWorker<InMemoryDao> {
        PersistenceWorker::new("persist".into(), Arc::clone(dao), merge, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_merge_with_stored_row() {
        let dao = Arc::new(InMemoryDao::new("t".into(), Some(Granularity::Minute)));
        dao.put(reference(1, 5));
        let worker = worker(&dao, true);
        let next = Next::detached();

        worker.on_work(reference(9, 3), &next).await.unwrap();
        worker.on_flush(&next).await;

        let row = dao.row("1_2_202401151030").unwrap();
        assert_eq!(row.get_long("one_second_less"), Some(8));
        assert_eq!(row.get_long("summary"), Some(8));
        assert_eq!(row.get_int("front_service_id"), Some(1));
    }

    #[tokio::test]
    async fn test_without_merge_the_row_is_overwritten() {
        let dao = Arc::new(InMemoryDao::new("t".into(), Some(Granularity::Minute)));
        dao.put(reference(1, 5));
        let worker = worker(&dao, false);
        let next = Next::detached();

        worker.on_work(reference(1, 3), &next).await.unwrap();
        worker.on_flush(&next).await;
        assert_eq!(dao.row("1_2_202401151030").unwrap().get_long("one_second_less"), Some(3));
    }

    #[tokio::test]
    async fn test_same_id_is_merged_inside_the_batch() {
        let dao = Arc::new(InMemoryDao::new("t".into(), Some(Granularity::Minute)));
        let worker = worker(&dao, true);
        let next = Next::detached();

        worker.on_work(reference(1, 5), &next).await.unwrap();
        worker.on_work(reference(1, 3), &next).await.unwrap();
        worker.on_flush(&next).await;
        assert_eq!(dao.len(), 1);
        assert_eq!(dao.row("1_2_202401151030").unwrap().get_long("one_second_less"), Some(8));
    }

    #[tokio::test]
    async fn test_failed_batch_is_not_requeued() {
        let dao = Arc::new(InMemoryDao::new("t".into(), Some(Granularity::Minute)));
        let worker = worker(&dao, true);
        let next = Next::detached();

        dao.set_failing(true);
        worker.on_work(reference(1, 5), &next).await.unwrap();
        worker.on_flush(&next).await;

        dao.set_failing(false);
        worker.on_flush(&next).await;
        assert!(dao.is_empty());
    }

    #[tokio::test]
    async fn test_persisted_rows_are_forwarded() {
        use crate::graph::tests::Tap;

        let dao = Arc::new(InMemoryDao::new("t".into(), Some(Granularity::Minute)));
        let graph = GraphManager::new().create_if_absent(1);
        let tap = Tap::new(2);
        let entry = Tap::new(1);
        graph.add_node(entry.clone()).unwrap().add_next(tap.clone()).unwrap();
        graph.seal().unwrap();
        let next = graph.to_finder().find_next(entry.id()).unwrap();

        dao.put(reference(1, 5));
        let worker = worker(&dao, true);
        worker.on_work(reference(1, 1), &next).await.unwrap();
        worker.on_flush(&next).await;

        assert_eq!(tap.seen().len(), 1);
        assert_eq!(tap.seen()[0].get_long("one_second_less"), Some(6));
    }
}
