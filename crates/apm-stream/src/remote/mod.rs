// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cross-peer dispatch.
//!
//! Every record is aggregated on the peer that owns its id on the hash ring.
//! A [`RemoteNode`] sits right after the first aggregation of each stream:
//! it either continues locally or ships the record to its owner, whose
//! [`RemoteReceiver`] resumes the same graph after the same node.

pub mod client;
pub mod cluster;
pub mod manager;
pub mod node;
pub mod receiver;
pub mod ring;
pub mod wire;

pub use client::{RemoteClient, RemoteClientFactory, TcpRemoteClient, TcpRemoteClientFactory};
pub use cluster::{ClusterListener, ClusterRegistry, PeerAddress, StaticClusterRegistry};
pub use manager::{RemoteClientManager, Route};
pub use node::RemoteNode;
pub use receiver::RemoteReceiver;
pub use ring::HashRing;
pub use wire::{RemoteData, RemoteMessage};
