// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reference storage keeping every table in memory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::dao::StorageDao;
use crate::errors::StorageError;
use crate::record::{time_bucket, Granularity, Record, Schema};

#[derive(Debug)]
pub enum MemoryBatchEntity {
    Insert(Record),
    Update(Record),
}

/// One table. `granularity` is `None` for tables whose ids carry no bucket.
#[derive(Debug)]
pub struct InMemoryDao {
    table: String,
    granularity: Option<Granularity>,
    rows: RwLock<BTreeMap<String, Record>>,
    failing: AtomicBool,
}

impl InMemoryDao {
    #[must_use]
    pub fn new(table: String, granularity: Option<Granularity>) -> Self {
        Self {
            table,
            granularity,
            rows: RwLock::new(BTreeMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn row(&self, id: &str) -> Option<Record> {
        self.read().get(id).cloned()
    }

    #[must_use]
    pub fn rows(&self) -> Vec<Record> {
        self.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Simulates a storage outage: while set, every batch write fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Writes `record` directly, bypassing batching.
    pub fn put(&self, record: Record) {
        self.write().insert(record.id().to_string(), record);
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Record>> {
        #[allow(clippy::expect_used)]
        self.rows.read().expect("lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Record>> {
        #[allow(clippy::expect_used)]
        self.rows.write().expect("lock poisoned")
    }
}

#[async_trait]
impl StorageDao for InMemoryDao {
    type BatchEntity = MemoryBatchEntity;

    async fn get(
        &self,
        _schema: &'static Schema,
        id: &str,
    ) -> Result<Option<Record>, StorageError> {
        Ok(self.row(id))
    }

    fn prepare_batch_insert(&self, record: Record) -> Result<MemoryBatchEntity, StorageError> {
        Ok(MemoryBatchEntity::Insert(record))
    }

    fn prepare_batch_update(&self, record: Record) -> Result<MemoryBatchEntity, StorageError> {
        Ok(MemoryBatchEntity::Update(record))
    }

    async fn batch_persist(&self, batch: Vec<MemoryBatchEntity>) -> Result<(), StorageError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(StorageError::Write(format!("table {} is unavailable", self.table)));
        }
        let mut rows = self.write();
        for entity in batch {
            let (MemoryBatchEntity::Insert(record) | MemoryBatchEntity::Update(record)) = entity;
            rows.insert(record.id().to_string(), record);
        }
        Ok(())
    }

    async fn delete_history(
        &self,
        start_millis: i64,
        end_millis: i64,
    ) -> Result<usize, StorageError> {
        let Some(granularity) = self.granularity else {
            return Ok(0);
        };
        let mut rows = self.write();
        let before = rows.len();
        let mut failure = None;
        rows.retain(|_, record| {
            match time_bucket::start_millis(record.time_bucket(), granularity) {
                Ok(start) => !(start_millis..end_millis).contains(&start),
                Err(e) => {
                    failure.get_or_insert(e);
                    true
                }
            }
        });
        if let Some(e) = failure {
            return Err(StorageError::Record(e));
        }
        let removed = before - rows.len();
        debug!(table = %self.table, "Deleted {removed} history rows");
        Ok(removed)
    }
}

/// Hands out one [`InMemoryDao`] per table, creating it on first use.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: DashMap<String, Arc<InMemoryDao>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dao(&self, schema: &'static Schema, granularity: Option<Granularity>) -> Arc<InMemoryDao> {
        let table = table_name(schema, granularity);
        Arc::clone(
            self.tables
                .entry(table.clone())
                .or_insert_with(|| Arc::new(InMemoryDao::new(table, granularity)))
                .value(),
        )
    }

    /// Looks a table up without creating it.
    #[must_use]
    pub fn table(&self, schema: &'static Schema, granularity: Option<Granularity>) -> Option<Arc<InMemoryDao>> {
        self.tables
            .get(&table_name(schema, granularity))
            .map(|dao| Arc::clone(dao.value()))
    }

    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[must_use]
pub fn table_name(schema: &Schema, granularity: Option<Granularity>) -> String {
    match granularity {
        Some(g) => format!("{}_{g}", schema.name),
        None => schema.name.to_string(),
    }
}
