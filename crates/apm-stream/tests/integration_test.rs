// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::sync::Arc;
use std::time::Duration;

use apm_stream::collector::Collector;
use apm_stream::constants::SERVICE_REFERENCE_GRAPH_ID;
use apm_stream::exchange::InMemoryIdRegistry;
use apm_stream::metrics::schemas::{
    INSTANCE_HEARTBEAT, JVM_CPU, SERVICE_HEARTBEAT, SERVICE_REFERENCE,
};
use apm_stream::record::{Granularity, Record};
use apm_stream::telemetry::{CpuMetric, JvmMetric, Telemetry};

use common::{entry_segment, eventually, fast_settings, TestNode, TS};

const WAIT: Duration = Duration::from_secs(5);

async fn single_node() -> TestNode {
    let mut node = TestNode::bind(&fast_settings()).await;
    node.start(&[]);
    node
}

#[tokio::test]
async fn test_segment_lands_in_every_table() {
    let node = single_node().await;
    let registry = Arc::new(InMemoryIdRegistry::new());
    let collector = Collector::new(Arc::clone(&node.graphs), registry.clone(), 5, 100);

    // Service first, then the names scoped by it.
    assert_eq!(collector.submit_segment(entry_segment("s1", "checkout", "checkout-1", 1500)).await.unwrap(), 0);
    registry.resolve_pending();
    collector.retry_deferred().await;
    registry.resolve_pending();
    assert_eq!(collector.retry_deferred().await, 1);

    let storage = Arc::clone(&node.storage);
    assert!(
        eventually(WAIT, || {
            Granularity::ALL.iter().all(|g| {
                storage
                    .table(&SERVICE_REFERENCE, Some(*g))
                    .is_some_and(|t| t.len() == 1)
            })
        })
        .await
    );

    let heartbeats = storage.table(&SERVICE_HEARTBEAT, None).unwrap();
    assert!(eventually(WAIT, || heartbeats.len() == 1).await);
    assert_eq!(heartbeats.rows()[0].get_long("heart_beat_time"), Some(TS + 1500));
    let instances = storage.table(&INSTANCE_HEARTBEAT, None).unwrap();
    assert!(eventually(WAIT, || instances.len() == 1).await);

    let hourly = storage.table(&SERVICE_REFERENCE, Some(Granularity::Hour)).unwrap();
    let row = &hourly.rows()[0];
    assert_eq!(row.time_bucket(), 2_024_011_510);
    assert_eq!(row.get_long("three_second_less"), Some(1));
    assert_eq!(row.get_long("duration_sum"), Some(1500));
    node.stop().await;
}

#[tokio::test]
async fn test_separate_flush_cycles_accumulate_in_storage() {
    let node = single_node().await;
    let reference = |summary: i64| {
        Record::builder(&SERVICE_REFERENCE, "1_2", 202_401_151_030)
            .set("front_service_id", 1)
            .set("behind_service_id", 2)
            .set("summary", summary)
            .build()
            .unwrap()
    };
    let minute = node
        .storage
        .dao(&SERVICE_REFERENCE, Some(Granularity::Minute));

    node.graphs.start(SERVICE_REFERENCE_GRAPH_ID, reference(5)).await.unwrap();
    assert!(eventually(WAIT, || minute.len() == 1).await);

    node.graphs.start(SERVICE_REFERENCE_GRAPH_ID, reference(3)).await.unwrap();
    assert!(
        eventually(WAIT, || {
            minute
                .row("1_2_202401151030")
                .and_then(|r| r.get_long("summary"))
                == Some(8)
        })
        .await
    );
    let row = minute.row("1_2_202401151030").unwrap();
    assert_eq!(row.get_int("front_service_id"), Some(1));
    node.stop().await;
}

#[tokio::test]
async fn test_jvm_samples_average_per_minute() {
    let node = single_node().await;
    let collector = Collector::new(
        Arc::clone(&node.graphs),
        Arc::new(InMemoryIdRegistry::new()),
        5,
        100,
    );
    let sample = |offset: i64, usage: f64| JvmMetric {
        time: TS + offset,
        cpu: CpuMetric {
            usage_percent: usage,
        },
        memory: Vec::new(),
        gc: Vec::new(),
    };
    let started = collector
        .submit(Telemetry::Jvm {
            instance_id: 7,
            metrics: vec![sample(0, 10.0), sample(5_000, 30.0)],
        })
        .await
        .unwrap();
    assert_eq!(started, 2);

    let cpu = node.storage.dao(&JVM_CPU, Some(Granularity::Minute));
    assert!(
        eventually(WAIT, || {
            cpu.row("7_202401151030")
                .and_then(|r| r.get_long("times"))
                == Some(2)
        })
        .await
    );
    let row = cpu.row("7_202401151030").unwrap();
    let average = row.get_double("usage_percent_sum").unwrap() / row.get_long("times").unwrap() as f64;
    assert!((average - 20.0).abs() < 1e-9);
    node.stop().await;
}

#[tokio::test]
async fn test_shutdown_flushes_pending_windows() {
    let settings = apm_stream::pipeline::PipelineSettings {
        aggregation_flush_interval: Duration::from_secs(3600),
        persistence_flush_interval: Duration::from_secs(3600),
        ..fast_settings()
    };
    let mut node = TestNode::bind(&settings).await;
    node.start(&[]);

    let heartbeat = Record::builder(&SERVICE_HEARTBEAT, "3", 0)
        .set("heart_beat_time", 200_i64)
        .build()
        .unwrap();
    node.graphs
        .start(apm_stream::constants::SERVICE_HEARTBEAT_GRAPH_ID, heartbeat)
        .await
        .unwrap();
    node.stop().await;

    let stored = node.storage.table(&SERVICE_HEARTBEAT, None).unwrap();
    assert_eq!(stored.row("3").unwrap().get_long("heart_beat_time"), Some(200));
}
