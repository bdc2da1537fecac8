// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Id exchange: replaces the names carried by telemetry with registered ids
//! before the telemetry is parsed into records.

pub mod registry;
pub mod segment;

pub use registry::{IdRegistry, InMemoryIdRegistry, NameKind};
pub use segment::SegmentExchanger;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

/// Fills the ids of `T` in place. Returns true once every id is known.
pub trait Exchanger<T>: Send + Sync {
    fn exchange(&self, item: &mut T) -> bool;
}

struct Deferred<T> {
    item: T,
    attempts: u32,
}

/// Passes items through id exchange, parking the ones still referencing
/// unknown names until a later retry resolves them.
pub struct Standardizer<T> {
    exchanger: Arc<dyn Exchanger<T>>,
    pending: Mutex<VecDeque<Deferred<T>>>,
    max_attempts: u32,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T: Send> Standardizer<T> {
    #[must_use]
    pub fn new(exchanger: Arc<dyn Exchanger<T>>, max_attempts: u32, capacity: usize) -> Self {
        Self {
            exchanger,
            pending: Mutex::new(VecDeque::new()),
            max_attempts: max_attempts.max(1),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Returns the item if it could be exchanged right away; otherwise parks
    /// it, or drops it when the pending queue is full.
    pub fn offer(&self, mut item: T) -> Option<T> {
        if self.exchanger.exchange(&mut item) {
            return Some(item);
        }
        if self.max_attempts <= 1 {
            self.drop_one("exchange failed");
            return None;
        }
        let mut pending = self.pending();
        if pending.len() >= self.capacity {
            drop(pending);
            self.drop_one("pending queue is full");
            return None;
        }
        pending.push_back(Deferred { item, attempts: 1 });
        None
    }

    /// Retries every parked item once; returns those now fully exchanged.
    /// Items reaching `max_attempts` are dropped.
    pub fn retry_pending(&self) -> Vec<T> {
        let parked: Vec<Deferred<T>> = self.pending().drain(..).collect();
        if parked.is_empty() {
            return Vec::new();
        }

        let mut ready = Vec::new();
        let mut still_pending = Vec::new();
        for mut deferred in parked {
            deferred.attempts += 1;
            if self.exchanger.exchange(&mut deferred.item) {
                ready.push(deferred.item);
            } else if deferred.attempts >= self.max_attempts {
                self.drop_one("gave up after max attempts");
            } else {
                still_pending.push(deferred);
            }
        }
        debug!(
            "Id exchange retry: {} ready, {} still pending",
            ready.len(),
            still_pending.len()
        );

        let mut pending = self.pending();
        // Keep the retried items ahead of the ones offered meanwhile.
        for deferred in still_pending.into_iter().rev() {
            pending.push_front(deferred);
        }
        ready
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    /// Items abandoned so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn drop_one(&self, reason: &str) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(dropped, "Dropping item with unresolved names: {reason}");
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<Deferred<T>>> {
        #[allow(clippy::expect_used)]
        self.pending.lock().expect("lock poisoned")
    }
}
