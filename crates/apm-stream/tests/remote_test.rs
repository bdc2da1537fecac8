// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::time::Duration;

use apm_stream::constants::SERVICE_REFERENCE_GRAPH_ID;
use apm_stream::metrics::schemas::SERVICE_REFERENCE;
use apm_stream::persistence::InMemoryDao;
use apm_stream::record::{Granularity, Record};
use apm_stream::remote::Route;

use common::{eventually, fast_settings, TestNode};

const WAIT: Duration = Duration::from_secs(10);
const BUCKET: i64 = 202_401_151_030;

fn reference(front: i32, behind: i32, summary: i64) -> Record {
    Record::builder(&SERVICE_REFERENCE, format!("{front}_{behind}"), BUCKET)
        .set("front_service_id", front)
        .set("behind_service_id", behind)
        .set("summary", summary)
        .build()
        .unwrap()
}

fn summary(dao: &InMemoryDao, id: &str) -> Option<i64> {
    dao.row(id).and_then(|r| r.get_long("summary"))
}

async fn cluster_of_two() -> (TestNode, TestNode) {
    let mut a = TestNode::bind(&fast_settings()).await;
    let mut b = TestNode::bind(&fast_settings()).await;
    let (addr_a, addr_b) = (a.address.clone(), b.address.clone());
    a.start(&[addr_b]);
    b.start(&[addr_a]);
    (a, b)
}

/// Whether `a` keeps `record` for itself.
fn owned_by_first(a: &TestNode, record: &Record) -> bool {
    matches!(a.remote.route(record.id()).unwrap(), Route::Local)
}

#[tokio::test]
async fn test_both_peers_agree_on_owners() {
    let (a, b) = cluster_of_two().await;
    for i in 0..200 {
        let id = format!("{i}_1_{BUCKET}");
        let local_on_a = matches!(a.remote.route(&id).unwrap(), Route::Local);
        let local_on_b = matches!(b.remote.route(&id).unwrap(), Route::Local);
        assert_ne!(local_on_a, local_on_b, "{id} must have exactly one owner");
    }
    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_records_are_aggregated_on_their_owner() {
    let (a, b) = cluster_of_two().await;

    // Same ids fed through both peers.
    for front in 1..=20 {
        a.graphs
            .start(SERVICE_REFERENCE_GRAPH_ID, reference(front, 99, 5))
            .await
            .unwrap();
        b.graphs
            .start(SERVICE_REFERENCE_GRAPH_ID, reference(front, 99, 3))
            .await
            .unwrap();
    }

    let minute_a = a.storage.dao(&SERVICE_REFERENCE, Some(Granularity::Minute));
    let minute_b = b.storage.dao(&SERVICE_REFERENCE, Some(Granularity::Minute));
    assert!(
        eventually(WAIT, || minute_a.len() + minute_b.len() == 20
            && minute_a.rows().iter().chain(minute_b.rows().iter())
                .all(|r| r.get_long("summary") == Some(8)))
        .await,
        "a: {:?}, b: {:?}",
        minute_a.rows(),
        minute_b.rows()
    );

    for front in 1..=20 {
        let record = reference(front, 99, 0);
        let (owner, other) = if owned_by_first(&a, &record) {
            (&minute_a, &minute_b)
        } else {
            (&minute_b, &minute_a)
        };
        assert_eq!(summary(owner, record.id()), Some(8));
        assert!(other.row(record.id()).is_none());
    }

    // Rollups happen after dispatch, so they follow the owner too.
    let month_a = a.storage.dao(&SERVICE_REFERENCE, Some(Granularity::Month));
    let month_b = b.storage.dao(&SERVICE_REFERENCE, Some(Granularity::Month));
    assert!(eventually(WAIT, || month_a.len() + month_b.len() == 20).await);
    assert_eq!(month_a.len(), minute_a.len());

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_peer_quit_moves_ownership_home() {
    let (a, b) = cluster_of_two().await;
    a.cluster.quit(&b.address);

    for front in 1..=10 {
        a.graphs
            .start(SERVICE_REFERENCE_GRAPH_ID, reference(front, 7, 1))
            .await
            .unwrap();
    }
    let minute_a = a.storage.dao(&SERVICE_REFERENCE, Some(Granularity::Minute));
    assert!(eventually(WAIT, || minute_a.len() == 10).await);
    assert_eq!(a.remote.connected_clients(), 0);

    a.stop().await;
    b.stop().await;
}
