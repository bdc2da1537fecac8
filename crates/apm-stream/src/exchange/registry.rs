// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::debug;

use crate::constants::{USER_SERVICE_ID, USER_SERVICE_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Service,
    ServiceInstance,
    Endpoint,
    NetworkAddress,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NameKind::Service => "service",
            NameKind::ServiceInstance => "service_instance",
            NameKind::Endpoint => "endpoint",
            NameKind::NetworkAddress => "network_address",
        })
    }
}

/// Maps names to stable integer ids.
///
/// `scope` narrows the namespace (the owning service id for instances and
/// endpoints, 0 otherwise). A miss returns `None` and schedules the name for
/// registration; callers retry later.
pub trait IdRegistry: Send + Sync {
    fn get_or_register(&self, kind: NameKind, scope: i32, name: &str) -> Option<i32>;
}

type NameKey = (NameKind, i32, String);

/// Registry assigning ids in memory. Misses are parked until
/// [`InMemoryIdRegistry::resolve_pending`] runs, mimicking an asynchronous
/// registration round trip.
pub struct InMemoryIdRegistry {
    ids: DashMap<NameKey, i32>,
    pending: Mutex<HashSet<NameKey>>,
    next_id: AtomicI32,
}

impl Default for InMemoryIdRegistry {
    fn default() -> Self {
        let ids = DashMap::new();
        ids.insert(
            (NameKind::Service, 0, USER_SERVICE_NAME.to_string()),
            USER_SERVICE_ID,
        );
        Self {
            ids,
            pending: Mutex::new(HashSet::new()),
            next_id: AtomicI32::new(USER_SERVICE_ID + 1),
        }
    }
}

impl InMemoryIdRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` right away and returns its id.
    pub fn register(&self, kind: NameKind, scope: i32, name: &str) -> i32 {
        *self
            .ids
            .entry((kind, scope, name.to_string()))
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Assigns ids to every parked name; returns how many were assigned.
    pub fn resolve_pending(&self) -> usize {
        let pending: Vec<NameKey> = {
            #[allow(clippy::expect_used)]
            let mut pending = self.pending.lock().expect("lock poisoned");
            pending.drain().collect()
        };
        for (kind, scope, name) in &pending {
            let id = self.register(*kind, *scope, name);
            debug!(kind = %kind, scope, name = %name, id, "Registered name");
        }
        pending.len()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.pending.lock().expect("lock poisoned").len()
    }
}

impl IdRegistry for InMemoryIdRegistry {
    fn get_or_register(&self, kind: NameKind, scope: i32, name: &str) -> Option<i32> {
        let key = (kind, scope, name.to_string());
        if let Some(id) = self.ids.get(&key) {
            return Some(*id);
        }
        #[allow(clippy::expect_used)]
        self.pending.lock().expect("lock poisoned").insert(key);
        None
    }
}
