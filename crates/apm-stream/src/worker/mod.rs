// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue-backed workers.
//!
//! Every worker owns one bounded queue and one consumer task that feeds the
//! queue's records to [`Worker::on_work`] sequentially. Workers that declare a
//! flush interval also get a flusher task calling [`Worker::on_flush`].
//! Inside the graph a worker is represented by a [`WorkerRef`], whose
//! `process` only enqueues.

pub mod queue;
pub mod window;

pub use queue::{bounded, OverflowPolicy, QueueReceiver, QueueSender};
pub use window::{DoubleBufferedWindow, Window};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::constants::DEFAULT_QUEUE_SIZE;
use crate::errors::WorkerError;
use crate::graph::{Next, NodeId, NodeProcessor};
use crate::record::{Record, Schema};

#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn on_work(&self, record: Record, next: &Next) -> Result<(), WorkerError>;

    /// Period of the flusher task. `None` means the worker never flushes.
    fn flush_interval(&self) -> Option<Duration> {
        None
    }

    async fn on_flush(&self, _next: &Next) {}
}

pub trait WorkerFactory {
    type Worker: Worker;

    fn worker_id(&self) -> NodeId;

    fn worker_name(&self) -> String;

    fn worker_instance(&self) -> Self::Worker;

    fn queue_size(&self) -> usize {
        DEFAULT_QUEUE_SIZE
    }

    fn overflow_policy(&self) -> OverflowPolicy {
        OverflowPolicy::default()
    }

    /// Schema accepted from remote peers when this worker is a remote target.
    fn input_schema(&self) -> Option<&'static Schema> {
        None
    }
}

/// Graph-side face of a running worker.
pub struct WorkerRef {
    id: NodeId,
    name: String,
    sender: QueueSender,
    input_schema: Option<&'static Schema>,
    downstream: Arc<OnceLock<Next>>,
}

impl WorkerRef {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn queue(&self) -> &QueueSender {
        &self.sender
    }
}

#[async_trait]
impl NodeProcessor for WorkerRef {
    fn id(&self) -> NodeId {
        self.id
    }

    fn input_schema(&self) -> Option<&'static Schema> {
        self.input_schema
    }

    async fn process(&self, record: Record, _next: &Next) -> Result<(), WorkerError> {
        self.sender.push(record).await
    }

    fn on_sealed(&self, next: Next) {
        if self.downstream.set(next).is_err() {
            warn!(worker = %self.name, "Worker is already bound to a sealed graph");
        }
    }
}

struct RunningWorker {
    id: NodeId,
    name: String,
    worker: Arc<dyn Worker>,
    downstream: Arc<OnceLock<Next>>,
    consumer: JoinHandle<()>,
    consumer_cancel: CancellationToken,
    flusher: Option<(JoinHandle<()>, CancellationToken)>,
}

#[derive(Default)]
struct Registry {
    ids: HashSet<NodeId>,
    running: Vec<RunningWorker>,
}

/// Owner of every worker task in the process. At most one worker is alive
/// per worker id.
#[derive(Default)]
pub struct WorkerInstances {
    registry: Mutex<Registry>,
}

impl WorkerInstances {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the worker built by `factory` and returns its graph node.
    /// Must be called from within a tokio runtime.
    pub fn create<F: WorkerFactory>(&self, factory: &F) -> Result<Arc<WorkerRef>, WorkerError> {
        let id = factory.worker_id();
        let mut registry = self.registry();
        if !registry.ids.insert(id) {
            return Err(WorkerError::DuplicateWorker(id));
        }

        let name = factory.worker_name();
        let worker: Arc<dyn Worker> = Arc::new(factory.worker_instance());
        let (sender, receiver) = bounded(&name, factory.queue_size(), factory.overflow_policy());
        let downstream = Arc::new(OnceLock::new());

        let consumer_cancel = CancellationToken::new();
        let consumer = tokio::spawn(consume(
            name.clone(),
            Arc::clone(&worker),
            receiver,
            Arc::clone(&downstream),
            consumer_cancel.clone(),
        ));
        let flusher = worker.flush_interval().map(|period| {
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(flush_periodically(
                Arc::clone(&worker),
                period,
                Arc::clone(&downstream),
                cancel.clone(),
            ));
            (handle, cancel)
        });
        debug!(worker = %name, id, queue_size = sender.capacity(), "Started worker");

        registry.running.push(RunningWorker {
            id,
            name: name.clone(),
            worker,
            downstream: Arc::clone(&downstream),
            consumer,
            consumer_cancel,
            flusher,
        });

        Ok(Arc::new(WorkerRef {
            id,
            name,
            sender,
            input_schema: factory.input_schema(),
            downstream,
        }))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().running.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops workers in creation order. Each worker drains its queue, then
    /// runs a last flush, so upstream workers hand their final window to
    /// downstream workers that are still running.
    pub async fn shutdown(&self) {
        let running = std::mem::take(&mut self.registry().running);
        info!("Stopping {} workers", running.len());
        for worker in running {
            worker.consumer_cancel.cancel();
            if let Err(e) = worker.consumer.await {
                error!(worker = %worker.name, "Worker consumer panicked: {e}");
            }
            if let Some((handle, cancel)) = worker.flusher {
                cancel.cancel();
                if let Err(e) = handle.await {
                    error!(worker = %worker.name, "Worker flusher panicked: {e}");
                }
                worker.worker.on_flush(&bound_next(&worker.downstream)).await;
            }
            debug!(worker = %worker.name, id = worker.id, "Stopped worker");
        }
        self.registry().ids.clear();
    }

    /// Aborts every task without draining. Only meant for test teardown.
    pub fn reset(&self) {
        let mut registry = self.registry();
        for worker in registry.running.drain(..) {
            worker.consumer.abort();
            if let Some((handle, _)) = worker.flusher {
                handle.abort();
            }
        }
        registry.ids.clear();
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        #[allow(clippy::expect_used)]
        self.registry.lock().expect("lock poisoned")
    }
}

fn bound_next(downstream: &OnceLock<Next>) -> Next {
    downstream.get().cloned().unwrap_or_else(Next::detached)
}

async fn consume(
    name: String,
    worker: Arc<dyn Worker>,
    mut receiver: QueueReceiver,
    downstream: Arc<OnceLock<Next>>,
    cancel: CancellationToken,
) {
    loop {
        let record = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            record = receiver.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };
        handle(&name, worker.as_ref(), record, &downstream).await;
    }

    let left = receiver.close_and_drain();
    if !left.is_empty() {
        debug!(worker = %name, "Draining {} queued records", left.len());
    }
    for record in left {
        handle(&name, worker.as_ref(), record, &downstream).await;
    }
}

async fn handle(name: &str, worker: &dyn Worker, record: Record, downstream: &OnceLock<Next>) {
    let id = record.id().to_string();
    if let Err(e) = worker.on_work(record, &bound_next(downstream)).await {
        error!(worker = %name, record_id = %id, "Failed to process record: {e}");
    }
}

async fn flush_periodically(
    worker: Arc<dyn Worker>,
    period: Duration,
    downstream: Arc<OnceLock<Next>>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.tick().await; // discard first tick, which is instantaneous
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => worker.on_flush(&bound_next(&downstream)).await,
        }
    }
}
