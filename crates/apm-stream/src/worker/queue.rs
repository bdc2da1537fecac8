// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::errors::WorkerError;
use crate::record::Record;

/// What a producer does when a worker queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for the consumer to free a slot.
    #[default]
    Block,
    /// Discard the record and count it.
    Drop,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "drop" => Ok(Self::Drop),
            other => Err(format!("unknown overflow policy `{other}`")),
        }
    }
}

/// Creates a bounded single-consumer queue of `capacity` records.
#[must_use]
pub fn bounded(
    name: &str,
    capacity: usize,
    policy: OverflowPolicy,
) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        QueueSender {
            name: Arc::from(name),
            tx,
            policy,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        QueueReceiver { rx },
    )
}

#[derive(Clone, Debug)]
pub struct QueueSender {
    name: Arc<str>,
    tx: mpsc::Sender<Record>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

impl QueueSender {
    pub async fn push(&self, record: Record) -> Result<(), WorkerError> {
        match self.policy {
            OverflowPolicy::Block => self
                .tx
                .send(record)
                .await
                .map_err(|_| WorkerError::QueueClosed(self.name.to_string())),
            OverflowPolicy::Drop => match self.tx.try_send(record) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    Err(WorkerError::QueueFull(self.name.to_string()))
                }
                Err(TrySendError::Closed(_)) => {
                    Err(WorkerError::QueueClosed(self.name.to_string()))
                }
            },
        }
    }

    /// Records currently waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Records discarded because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Record>,
}

impl QueueReceiver {
    pub async fn recv(&mut self) -> Option<Record> {
        self.rx.recv().await
    }

    /// Stops accepting new records and returns whatever is still buffered.
    pub fn close_and_drain(&mut self) -> Vec<Record> {
        self.rx.close();
        let mut left = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            left.push(record);
        }
        left
    }
}
