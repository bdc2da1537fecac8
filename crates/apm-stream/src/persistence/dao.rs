// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::errors::StorageError;
use crate::record::{Record, Schema};

/// Storage contract for one record type at one granularity. The core never
/// looks inside a `BatchEntity`; it only collects them for `batch_persist`.
#[async_trait]
pub trait StorageDao: Send + Sync + 'static {
    type BatchEntity: Send + 'static;

    async fn get(&self, schema: &'static Schema, id: &str)
        -> Result<Option<Record>, StorageError>;

    fn prepare_batch_insert(&self, record: Record) -> Result<Self::BatchEntity, StorageError>;

    fn prepare_batch_update(&self, record: Record) -> Result<Self::BatchEntity, StorageError>;

    async fn batch_persist(&self, batch: Vec<Self::BatchEntity>) -> Result<(), StorageError>;

    /// Removes rows whose bucket starts in `[start_millis, end_millis)`.
    /// Returns the number of removed rows.
    async fn delete_history(&self, start_millis: i64, end_millis: i64)
        -> Result<usize, StorageError>;
}

/// Object-safe slice of [`StorageDao`] used by history deletion, which holds
/// DAOs of unrelated batch types side by side.
#[async_trait]
pub trait HistoryCleaner: Send + Sync {
    async fn purge(&self, start_millis: i64, end_millis: i64) -> Result<usize, StorageError>;
}

#[async_trait]
impl<D: StorageDao> HistoryCleaner for D {
    async fn purge(&self, start_millis: i64, end_millis: i64) -> Result<usize, StorageError> {
        StorageDao::delete_history(self, start_millis, end_millis).await
    }
}
