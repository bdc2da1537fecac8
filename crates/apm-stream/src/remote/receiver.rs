// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use prost::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::frame_codec;
use super::wire::{decode_record, RemoteMessage};
use crate::errors::{RemoteError, WireError};
use crate::graph::GraphManager;

/// Injects records received from peers into the local graphs.
pub struct RemoteReceiver {
    graphs: Arc<GraphManager>,
}

impl RemoteReceiver {
    #[must_use]
    pub fn new(graphs: Arc<GraphManager>) -> Self {
        Self { graphs }
    }

    /// Decodes the payload with the schema of the addressed node and resumes
    /// the graph at that node's downstream edges.
    pub async fn dispatch(&self, message: RemoteMessage) -> Result<(), RemoteError> {
        let graph = self.graphs.find(message.graph_id)?;
        let node = graph.to_finder().find_node(message.node_id)?;
        let schema = node.input_schema().ok_or(WireError::NotRemoteTarget {
            graph_id: message.graph_id,
            node_id: message.node_id,
        })?;
        let payload = message.payload.ok_or(WireError::MissingPayload)?;
        let record = decode_record(schema, payload)?;
        node.next()?.execute(record).await;
        Ok(())
    }

    pub async fn dispatch_frame(&self, frame: &[u8]) -> Result<(), RemoteError> {
        let message = RemoteMessage::decode(frame).map_err(WireError::from)?;
        self.dispatch(message).await
    }

    /// Accepts peer connections until `cancel` fires.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!("Remote receiver listening on {addr}");
        }
        loop {
            let accepted = tokio::select! {
                () = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    let receiver = Arc::clone(&self);
                    let cancel = cancel.clone();
                    tokio::spawn(async move { receiver.read_peer(stream, peer, cancel).await });
                }
                Err(e) => error!("Failed to accept peer connection: {e}"),
            }
        }
        debug!("Remote receiver stopped");
    }

    async fn read_peer(&self, stream: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        debug!(peer = %peer, "Peer connected");
        let mut frames = Framed::new(stream, frame_codec());
        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => break,
                frame = frames.next() => frame,
            };
            match frame {
                Some(Ok(bytes)) => {
                    if let Err(e) = self.dispatch_frame(&bytes).await {
                        warn!(peer = %peer, "Dropping remote message: {e}");
                    }
                }
                Some(Err(e)) => {
                    error!(peer = %peer, "Failed to read from peer: {e}");
                    break;
                }
                None => break,
            }
        }
        debug!(peer = %peer, "Peer disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::Tap;
    use crate::graph::{NodeProcessor, Next};
    use crate::metrics::schemas::{SERVICE_HEARTBEAT, SERVICE_REFERENCE};
    use crate::record::{Record, Schema};
    use crate::remote::wire::encode_message;
    use async_trait::async_trait;

    /// Stand-in for a remote node: declares the schema and forwards.
    struct Entry;

    #[async_trait]
    impl NodeProcessor for Entry {
        fn id(&self) -> i32 {
            1
        }

        fn input_schema(&self) -> Option<&'static Schema> {
            Some(&SERVICE_HEARTBEAT)
        }

        async fn process(&self, record: Record, next: &Next) -> Result<(), crate::errors::WorkerError> {
            next.execute(record).await;
            Ok(())
        }
    }

    fn heartbeat() -> Record {
        Record::builder(&SERVICE_HEARTBEAT, "3", 0)
            .set("heart_beat_time", 200_i64)
            .build()
            .unwrap()
    }

    fn setup() -> (RemoteReceiver, Arc<Tap>) {
        let graphs = Arc::new(GraphManager::new());
        let graph = graphs.create_if_absent(100);
        let tap = Tap::new(2);
        graph.add_node(Arc::new(Entry)).unwrap().add_next(tap.clone()).unwrap();
        graph.seal().unwrap();
        (RemoteReceiver::new(graphs), tap)
    }

    #[tokio::test]
    async fn test_resumes_after_addressed_node() {
        let (receiver, tap) = setup();
        receiver.dispatch(encode_message(100, 1, &heartbeat())).await.unwrap();
        assert_eq!(tap.seen(), vec![heartbeat()]);
    }

    #[tokio::test]
    async fn test_unknown_targets_are_errors() {
        let (receiver, tap) = setup();
        assert!(matches!(
            receiver.dispatch(encode_message(999, 1, &heartbeat())).await,
            Err(RemoteError::Graph(_))
        ));
        assert!(matches!(
            receiver.dispatch(encode_message(100, 42, &heartbeat())).await,
            Err(RemoteError::Graph(_))
        ));
        let reference = Record::builder(&SERVICE_REFERENCE, "1_2", 202_401_151_030)
            .build()
            .unwrap();
        assert!(matches!(
            receiver.dispatch(encode_message(100, 1, &reference)).await,
            Err(RemoteError::Wire(WireError::FieldCount { .. }))
        ));
        assert!(matches!(
            receiver.dispatch_frame(&[0xff, 0xff, 0xff]).await,
            Err(RemoteError::Wire(WireError::Decode(_)))
        ));
        assert!(tap.seen().is_empty());
    }
}
