// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::SinkExt;
use prost::Message;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::cluster::PeerAddress;
use super::wire::RemoteMessage;
use crate::constants::MAX_REMOTE_FRAME_SIZE;
use crate::errors::RemoteError;

/// Connection to one cluster peer.
pub trait RemoteClient: Send + Sync {
    fn address(&self) -> &PeerAddress;

    /// Queues `message` for the peer without waiting for it to be written.
    fn push(&self, message: RemoteMessage) -> Result<(), RemoteError>;

    /// Stops the client. Queued and later messages are dropped.
    fn close(&self);
}

pub trait RemoteClientFactory: Send + Sync {
    fn create(&self, peer: &PeerAddress) -> Arc<dyn RemoteClient>;
}

#[must_use]
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_REMOTE_FRAME_SIZE)
        .new_codec()
}

/// Streams length-delimited protobuf frames over one TCP connection, opened
/// on first use and reopened after a write failure. Messages that cannot be
/// written are dropped; nothing is retried.
pub struct TcpRemoteClient {
    address: PeerAddress,
    tx: mpsc::Sender<RemoteMessage>,
    cancel: CancellationToken,
}

impl TcpRemoteClient {
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(address: PeerAddress, buffer: usize, connect_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        tokio::spawn(write_loop(address.clone(), rx, connect_timeout, cancel.clone()));
        Self { address, tx, cancel }
    }
}

impl RemoteClient for TcpRemoteClient {
    fn address(&self) -> &PeerAddress {
        &self.address
    }

    fn push(&self, message: RemoteMessage) -> Result<(), RemoteError> {
        if self.cancel.is_cancelled() {
            return Err(RemoteError::PeerEvicted(self.address.to_string()));
        }
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => RemoteError::BufferFull(self.address.to_string()),
            TrySendError::Closed(_) => RemoteError::PeerEvicted(self.address.to_string()),
        })
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TcpRemoteClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn write_loop(
    address: PeerAddress,
    mut rx: mpsc::Receiver<RemoteMessage>,
    connect_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut connection: Option<Framed<TcpStream, LengthDelimitedCodec>> = None;
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        if connection.is_none() {
            connection = connect(&address, connect_timeout).await;
        }
        let Some(framed) = connection.as_mut() else {
            warn!(peer = %address, "Dropping remote message, peer unreachable");
            continue;
        };
        if let Err(e) = framed.send(Bytes::from(message.encode_to_vec())).await {
            error!(peer = %address, "Failed to send remote message: {e}");
            connection = None;
        }
    }
    rx.close();
    debug!(peer = %address, "Remote client stopped");
}

async fn connect(
    address: &PeerAddress,
    connect_timeout: Duration,
) -> Option<Framed<TcpStream, LengthDelimitedCodec>> {
    let target = (address.host.as_str(), address.port);
    match timeout(connect_timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            debug!(peer = %address, "Connected to peer");
            Some(Framed::new(stream, frame_codec()))
        }
        Ok(Err(e)) => {
            error!(peer = %address, "Failed to connect to peer: {e}");
            None
        }
        Err(_) => {
            error!(peer = %address, "Timed out connecting to peer after {}ms", connect_timeout.as_millis());
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TcpRemoteClientFactory {
    pub buffer: usize,
    pub connect_timeout: Duration,
}

impl RemoteClientFactory for TcpRemoteClientFactory {
    fn create(&self, peer: &PeerAddress) -> Arc<dyn RemoteClient> {
        Arc::new(TcpRemoteClient::new(
            peer.clone(),
            self.buffer,
            self.connect_timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::net::TcpListener;

    fn message(node_id: i32) -> RemoteMessage {
        RemoteMessage {
            graph_id: 1,
            node_id,
            payload: None,
        }
    }

    #[tokio::test]
    async fn test_frames_reach_the_peer_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = TcpRemoteClient::new(
            PeerAddress::new("127.0.0.1", port),
            16,
            Duration::from_secs(1),
        );
        client.push(message(1)).unwrap();
        client.push(message(2)).unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let mut frames = Framed::new(stream, frame_codec());
        for expected in [1, 2] {
            let frame = frames.next().await.unwrap().unwrap();
            assert_eq!(RemoteMessage::decode(frame).unwrap().node_id, expected);
        }
    }

    #[tokio::test]
    async fn test_closed_client_rejects_messages() {
        let client = TcpRemoteClient::new(PeerAddress::new("127.0.0.1", 1), 4, Duration::from_millis(10));
        client.close();
        assert!(matches!(
            client.push(message(1)),
            Err(RemoteError::PeerEvicted(_))
        ));
    }
}
