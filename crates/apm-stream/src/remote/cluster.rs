// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::RemoteError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RemoteError::InvalidAddress(s.to_string());
        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

/// Receives cluster membership changes.
pub trait ClusterListener: Send + Sync {
    fn on_join(&self, peer: PeerAddress);

    fn on_quit(&self, peer: &PeerAddress);
}

/// Source of cluster membership. Discovery itself lives outside this crate.
pub trait ClusterRegistry: Send + Sync {
    fn healthy_peers(&self) -> Vec<PeerAddress>;

    /// Registers `listener`; it is immediately told about every current peer.
    fn subscribe(&self, listener: Arc<dyn ClusterListener>);
}

/// Registry backed by a fixed peer list, changed only through `join`/`quit`.
#[derive(Default)]
pub struct StaticClusterRegistry {
    peers: RwLock<Vec<PeerAddress>>,
    listeners: RwLock<Vec<Arc<dyn ClusterListener>>>,
}

impl StaticClusterRegistry {
    #[must_use]
    pub fn new(peers: Vec<PeerAddress>) -> Self {
        Self {
            peers: RwLock::new(peers),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn join(&self, peer: PeerAddress) {
        {
            #[allow(clippy::expect_used)]
            let mut peers = self.peers.write().expect("lock poisoned");
            if peers.contains(&peer) {
                return;
            }
            peers.push(peer.clone());
        }
        info!(peer = %peer, "Peer joined the cluster");
        for listener in self.listeners() {
            listener.on_join(peer.clone());
        }
    }

    pub fn quit(&self, peer: &PeerAddress) {
        {
            #[allow(clippy::expect_used)]
            let mut peers = self.peers.write().expect("lock poisoned");
            let before = peers.len();
            peers.retain(|p| p != peer);
            if peers.len() == before {
                return;
            }
        }
        info!(peer = %peer, "Peer left the cluster");
        for listener in self.listeners() {
            listener.on_quit(peer);
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn ClusterListener>> {
        #[allow(clippy::expect_used)]
        self.listeners.read().expect("lock poisoned").clone()
    }
}

impl ClusterRegistry for StaticClusterRegistry {
    fn healthy_peers(&self) -> Vec<PeerAddress> {
        #[allow(clippy::expect_used)]
        self.peers.read().expect("lock poisoned").clone()
    }

    fn subscribe(&self, listener: Arc<dyn ClusterListener>) {
        for peer in self.healthy_peers() {
            listener.on_join(peer);
        }
        #[allow(clippy::expect_used)]
        self.listeners.write().expect("lock poisoned").push(listener);
    }
}
