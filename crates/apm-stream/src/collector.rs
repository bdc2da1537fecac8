// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ingestion facade used by the transport layer.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::constants::INSTANCE_HEARTBEAT_GRAPH_ID;
use crate::errors::IngestError;
use crate::exchange::{IdRegistry, SegmentExchanger, Standardizer};
use crate::graph::GraphManager;
use crate::metrics::{instance_heartbeat, jvm_records, SegmentParser};
use crate::record::time_bucket;
use crate::telemetry::{InstanceHeartbeat, JvmMetric, Telemetry, TraceSegment};

/// Takes decoded telemetry and starts the resulting records in their graphs.
///
/// Segments first go through id exchange. A segment naming something not
/// registered yet is parked and parsed by a later [`Collector::retry_deferred`].
pub struct Collector {
    graphs: Arc<GraphManager>,
    standardizer: Standardizer<TraceSegment>,
    parser: SegmentParser,
}

impl Collector {
    #[must_use]
    pub fn new(
        graphs: Arc<GraphManager>,
        registry: Arc<dyn IdRegistry>,
        max_attempts: u32,
        pending_limit: usize,
    ) -> Self {
        let exchanger = Arc::new(SegmentExchanger::new(registry));
        Self {
            parser: SegmentParser::with_default_listeners(Arc::clone(&graphs)),
            standardizer: Standardizer::new(exchanger, max_attempts, pending_limit),
            graphs,
        }
    }

    /// Returns how many records were started.
    pub async fn submit(&self, telemetry: Telemetry) -> Result<usize, IngestError> {
        match telemetry {
            Telemetry::Segment(segment) => self.submit_segment(segment).await,
            Telemetry::Jvm {
                instance_id,
                metrics,
            } => self.submit_jvm_metrics(instance_id, &metrics).await,
            Telemetry::Heartbeat(heartbeat) => {
                self.submit_heartbeat(&heartbeat).await?;
                Ok(1)
            }
        }
    }

    /// Parses `segment` right away when every name it carries is known.
    /// Otherwise the segment is deferred and `Ok(0)` is returned.
    pub async fn submit_segment(&self, segment: TraceSegment) -> Result<usize, IngestError> {
        let segment_id = segment.segment_id.clone();
        match self.standardizer.offer(segment) {
            Some(segment) => self.parser.parse(&segment).await,
            None => {
                debug!(segment_id = %segment_id, "Deferred segment until its names are registered");
                Ok(0)
            }
        }
    }

    pub async fn submit_jvm_metrics(
        &self,
        instance_id: i32,
        metrics: &[JvmMetric],
    ) -> Result<usize, IngestError> {
        let mut started = 0;
        for metric in metrics {
            for (graph_id, record) in jvm_records(instance_id, metric)? {
                self.graphs.start(graph_id, record).await?;
                started += 1;
            }
        }
        Ok(started)
    }

    pub async fn submit_heartbeat(&self, heartbeat: &InstanceHeartbeat) -> Result<(), IngestError> {
        let record = instance_heartbeat(
            heartbeat.service_id,
            heartbeat.instance_id,
            heartbeat.heart_beat_time,
            time_bucket::minute_bucket(heartbeat.heart_beat_time)?,
        )?;
        self.graphs.start(INSTANCE_HEARTBEAT_GRAPH_ID, record).await?;
        Ok(())
    }

    /// Retries deferred segments once and parses those now resolved.
    /// Returns the number of segments parsed.
    pub async fn retry_deferred(&self) -> usize {
        let ready = self.standardizer.retry_pending();
        let mut parsed = 0;
        for segment in ready {
            match self.parser.parse(&segment).await {
                Ok(_) => parsed += 1,
                Err(e) => warn!(segment_id = %segment.segment_id, "Failed to parse deferred segment: {e}"),
            }
        }
        parsed
    }

    #[must_use]
    pub fn deferred(&self) -> usize {
        self.standardizer.pending_len()
    }

    /// Calls `before_retry` then [`Collector::retry_deferred`] every `every`
    /// until cancelled. `before_retry` is where a registry gets to complete
    /// outstanding registrations.
    pub async fn run_retry_loop<F>(
        self: Arc<Self>,
        every: Duration,
        before_retry: F,
        cancel: CancellationToken,
    ) where
        F: Fn() + Send + Sync,
    {
        info!("Retrying deferred segments every {}ms", every.as_millis());
        let mut ticker = interval(every);
        ticker.tick().await; // discard first tick, which is instantaneous
        let mut reported_drops = 0;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    before_retry();
                    let parsed = self.retry_deferred().await;
                    if parsed > 0 {
                        debug!("Parsed {parsed} deferred segments");
                    }
                    let dropped = self.standardizer.dropped();
                    if dropped > reported_drops {
                        error!("{} segments dropped with unresolved names", dropped - reported_drops);
                        reported_drops = dropped;
                    }
                }
            }
        }
    }
}
