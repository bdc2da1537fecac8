// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use xxhash_rust::xxh64::xxh64;

use super::cluster::PeerAddress;

/// Consistent hash ring over cluster peers. Each peer owns `virtual_nodes`
/// points on the ring; a key belongs to the first point at or after its hash.
#[derive(Debug, Clone)]
pub struct HashRing {
    virtual_nodes: usize,
    points: BTreeMap<u64, PeerAddress>,
    peers: BTreeSet<PeerAddress>,
}

impl HashRing {
    #[must_use]
    pub fn new(virtual_nodes: usize) -> Self {
        Self {
            virtual_nodes: virtual_nodes.max(1),
            points: BTreeMap::new(),
            peers: BTreeSet::new(),
        }
    }

    /// Returns false if the peer was already present.
    pub fn add(&mut self, peer: PeerAddress) -> bool {
        if !self.peers.insert(peer.clone()) {
            return false;
        }
        for i in 0..self.virtual_nodes {
            self.points.insert(hash(&format!("{peer}#{i}")), peer.clone());
        }
        true
    }

    /// Returns false if the peer was not present.
    pub fn remove(&mut self, peer: &PeerAddress) -> bool {
        if !self.peers.remove(peer) {
            return false;
        }
        self.points.retain(|_, owner| owner != peer);
        true
    }

    #[must_use]
    pub fn route(&self, key: &str) -> Option<&PeerAddress> {
        let h = hash(key);
        self.points
            .range(h..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, peer)| peer)
    }

    #[must_use]
    pub fn contains(&self, peer: &PeerAddress) -> bool {
        self.peers.contains(peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerAddress> {
        self.peers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

// Point labels differ only in their suffix, so the hash has to avalanche.
fn hash(key: &str) -> u64 {
    xxh64(key.as_bytes(), 0)
}
