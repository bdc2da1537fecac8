// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use apm_stream::{
    collector::Collector,
    config::Config,
    exchange::InMemoryIdRegistry,
    graph::GraphManager,
    logger::{self, Formatter},
    persistence::{HistoryDeleter, InMemoryStorage},
    pipeline::PipelineContext,
    remote::{
        ClusterRegistry, RemoteClientManager, RemoteReceiver, StaticClusterRegistry,
        TcpRemoteClientFactory,
    },
    telemetry::Telemetry,
    worker::WorkerInstances,
};

#[tokio::main]
pub async fn main() {
    let log_level = logger::level_from_env();

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).expect("could not parse log level in configuration"),
        )
        .event_format(Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on collector startup: {e:#}");
            return;
        }
    };

    if let Err(e) = run(config).await {
        error!("Collector stopped with error: {e:#}");
    }
}

async fn run(config: Arc<Config>) -> anyhow::Result<()> {
    let graphs = Arc::new(GraphManager::new());
    let workers = Arc::new(WorkerInstances::new());

    let remote = Arc::new(RemoteClientManager::new(
        config.self_address.clone(),
        config.hash_virtual_nodes,
        Arc::new(TcpRemoteClientFactory {
            buffer: config.remote_buffer,
            connect_timeout: config.remote_connect_timeout,
        }),
    ));
    let cluster = StaticClusterRegistry::new(config.cluster_peers.clone());
    cluster.subscribe(remote.clone());
    info!(
        "Running as {} with {} configured peers",
        config.self_address,
        cluster.healthy_peers().len()
    );

    let storage = Arc::new(InMemoryStorage::new());
    let mut deleter = HistoryDeleter::new(config.ttl);
    let pipelines = PipelineContext {
        graphs: Arc::clone(&graphs),
        workers: Arc::clone(&workers),
        remote: Arc::clone(&remote),
        storage: Arc::clone(&storage),
        settings: config.pipeline.clone(),
    };
    pipelines.build_all(&mut deleter)?;

    let cancel = CancellationToken::new();

    let receiver = Arc::new(RemoteReceiver::new(Arc::clone(&graphs)));
    let remote_listener = TcpListener::bind(&config.remote_listen).await?;
    tokio::spawn(receiver.serve(remote_listener, cancel.clone()));

    let registry = Arc::new(InMemoryIdRegistry::new());
    let collector = Arc::new(Collector::new(
        Arc::clone(&graphs),
        registry.clone(),
        config.exchange_max_attempts,
        config.exchange_pending_limit,
    ));
    tokio::spawn(Arc::clone(&collector).run_retry_loop(
        config.exchange_retry_interval,
        move || {
            let registered = registry.resolve_pending();
            if registered > 0 {
                debug!("Registered {registered} names");
            }
        },
        cancel.clone(),
    ));

    let ingest_listener = TcpListener::bind(&config.ingest_listen).await?;
    info!("Ingest listening on {}", config.ingest_listen);
    tokio::spawn(serve_ingest(ingest_listener, collector, cancel.clone()));

    tokio::spawn(deleter.run(config.ttl_check_interval, cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down collector");
    cancel.cancel();
    workers.shutdown().await;
    remote.close_all();
    info!("Stored tables: {}", storage.table_names().join(", "));
    Ok(())
}

/// Accepts connections carrying one JSON encoded [`Telemetry`] per line.
async fn serve_ingest(listener: TcpListener, collector: Arc<Collector>, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(peer = %peer, "Agent connected");
                let collector = Arc::clone(&collector);
                let cancel = cancel.clone();
                tokio::spawn(async move { read_lines(stream, collector, cancel).await });
            }
            Err(e) => error!("Failed to accept agent connection: {e}"),
        }
    }
}

async fn read_lines(stream: TcpStream, collector: Arc<Collector>, cancel: CancellationToken) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<Telemetry>(&line) {
                Ok(telemetry) => {
                    if let Err(e) = collector.submit(telemetry).await {
                        warn!("Failed to ingest telemetry: {e}");
                    }
                }
                Err(e) => warn!("Dropping malformed telemetry line: {e}"),
            },
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read from agent: {e}");
                break;
            }
        }
    }
}
