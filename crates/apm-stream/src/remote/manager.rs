// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use tracing::{debug, info};

use super::client::{RemoteClient, RemoteClientFactory};
use super::cluster::{ClusterListener, PeerAddress};
use super::ring::HashRing;
use crate::errors::RemoteError;

/// Where a record should be aggregated.
pub enum Route {
    Local,
    Remote(Arc<dyn RemoteClient>),
}

/// Tracks cluster peers and their clients, and picks the owner of every key.
///
/// The local process is always part of the ring. Clients are created on the
/// first record routed to a peer and evicted when the peer leaves.
pub struct RemoteClientManager {
    self_address: PeerAddress,
    factory: Arc<dyn RemoteClientFactory>,
    clients: DashMap<PeerAddress, Arc<dyn RemoteClient>>,
    ring: RwLock<HashRing>,
}

impl RemoteClientManager {
    #[must_use]
    pub fn new(
        self_address: PeerAddress,
        virtual_nodes: usize,
        factory: Arc<dyn RemoteClientFactory>,
    ) -> Self {
        let mut ring = HashRing::new(virtual_nodes);
        ring.add(self_address.clone());
        Self {
            self_address,
            factory,
            clients: DashMap::new(),
            ring: RwLock::new(ring),
        }
    }

    #[must_use]
    pub fn self_address(&self) -> &PeerAddress {
        &self.self_address
    }

    pub fn route(&self, key: &str) -> Result<Route, RemoteError> {
        let peer = self.ring().route(key).cloned().ok_or(RemoteError::NoPeers)?;
        if peer == self.self_address {
            return Ok(Route::Local);
        }
        if let Some(client) = self.clients.get(&peer) {
            return Ok(Route::Remote(Arc::clone(client.value())));
        }

        let ring = self.ring();
        if !ring.contains(&peer) {
            return Err(RemoteError::PeerEvicted(peer.to_string()));
        }
        let client = self
            .clients
            .entry(peer.clone())
            .or_insert_with(|| {
                debug!(peer = %peer, "Creating remote client");
                self.factory.create(&peer)
            })
            .value()
            .clone();
        drop(ring);
        Ok(Route::Remote(client))
    }

    /// Peers currently in the ring, the local process included.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerAddress> {
        self.ring().peers().cloned().collect()
    }

    #[must_use]
    pub fn connected_clients(&self) -> usize {
        self.clients.len()
    }

    /// Closes every client. The ring is left as is.
    pub fn close_all(&self) {
        for entry in self.clients.iter() {
            entry.value().close();
        }
        self.clients.clear();
    }

    fn ring(&self) -> RwLockReadGuard<'_, HashRing> {
        #[allow(clippy::expect_used)]
        self.ring.read().expect("lock poisoned")
    }

    fn ring_mut(&self) -> RwLockWriteGuard<'_, HashRing> {
        #[allow(clippy::expect_used)]
        self.ring.write().expect("lock poisoned")
    }
}

impl ClusterListener for RemoteClientManager {
    fn on_join(&self, peer: PeerAddress) {
        if peer == self.self_address {
            return;
        }
        if self.ring_mut().add(peer.clone()) {
            info!(peer = %peer, "Added peer to the hash ring");
        }
    }

    fn on_quit(&self, peer: &PeerAddress) {
        if *peer == self.self_address {
            return;
        }
        // Ring first, so no new client can be created for the peer.
        let removed = self.ring_mut().remove(peer);
        if let Some((_, client)) = self.clients.remove(peer) {
            client.close();
        }
        if removed {
            info!(peer = %peer, "Removed peer from the hash ring");
        }
    }
}
