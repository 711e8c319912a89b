use std::time::Duration;

use kadvault::{AddPeerResponse, Config, RoutingTable, TableImage};

mod common;
#[allow(unused_imports)]
use crate::common::{config, enable_tracing, local_id, peer, Answer, ScriptedRpc};

#[tokio::test]
async fn dead_peer_is_replaced() {
    // enable_tracing();

    let rpc = ScriptedRpc::new();
    let table = RoutingTable::spawn(config(2), rpc.clone());

    let (a, b, c) = (peer(0x01), peer(0x02), peer(0x03));

    let response = table.insert(a.clone()).await.unwrap();
    assert_eq!(
        response,
        AddPeerResponse {
            bucket: 0,
            slot: Some(0),
            ping: false,
            inserted: true
        }
    );

    let response = table.insert(b.clone()).await.unwrap();
    assert_eq!(response.committed(), Some((0, 1)));
    assert!(!response.ping);

    rpc.set(a.id, Answer::Dead).await;
    rpc.set(b.id, Answer::Alive).await;

    let response = table.insert(c.clone()).await.unwrap();
    assert_eq!(
        response,
        AddPeerResponse {
            bucket: 0,
            slot: Some(0),
            ping: true,
            inserted: true
        }
    );

    assert_eq!(table.bucket(0).await.unwrap(), vec![c, b]);
    // Both slots were stale, both were probed.
    assert_eq!(rpc.ping_count().await, 2);
}

#[tokio::test]
async fn fresh_full_bucket_rejects() {
    let rpc = ScriptedRpc::new();
    let config = Config {
        bucket_size: 2,
        cache_expiry: Duration::from_secs(3600),
        ..Config::new(local_id())
    };
    let table = RoutingTable::spawn(config, rpc.clone());

    table.insert(peer(0x01)).await.unwrap();
    table.insert(peer(0x02)).await.unwrap();

    let response = table.insert(peer(0x03)).await.unwrap();
    assert_eq!(
        response,
        AddPeerResponse {
            bucket: 0,
            slot: None,
            ping: true,
            inserted: false
        }
    );

    // Nothing was stale, nothing was probed.
    assert_eq!(rpc.ping_count().await, 0);
    assert_eq!(table.bucket(0).await.unwrap(), vec![peer(0x01), peer(0x02)]);
}

#[tokio::test]
async fn alive_full_bucket_rejects_after_probing() {
    let rpc = ScriptedRpc::new();
    let table = RoutingTable::spawn(config(2), rpc.clone());

    table.insert(peer(0x01)).await.unwrap();
    table.insert(peer(0x02)).await.unwrap();

    let response = table.insert(peer(0x03)).await.unwrap();
    assert!(!response.inserted);
    assert!(response.ping);
    assert_eq!(response.slot, None);
    assert_eq!(
        rpc.pinged().await,
        [peer(0x01).id, peer(0x02).id].into_iter().collect()
    );
}

#[tokio::test]
async fn duplicate_does_not_grow_bucket() {
    let rpc = ScriptedRpc::new();
    let table = RoutingTable::spawn(config(2), rpc);

    table.insert(peer(0x01)).await.unwrap();

    for _ in 0..3 {
        let response = table.insert(peer(0x01)).await.unwrap();
        assert!(!response.inserted);
        assert!(!response.ping);
        assert_eq!(response.slot, Some(0));
    }

    assert_eq!(table.bucket(0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_peer_counts_as_dead() {
    let rpc = ScriptedRpc::new();
    let table = RoutingTable::spawn(config(2), rpc.clone());

    table.insert(peer(0x01)).await.unwrap();
    table.insert(peer(0x02)).await.unwrap();
    rpc.set(peer(0x02).id, Answer::Unreachable).await;

    let response = table.insert(peer(0x03)).await.unwrap();
    assert_eq!(response.committed(), Some((0, 1)));
    assert_eq!(table.bucket(0).await.unwrap(), vec![peer(0x01), peer(0x03)]);
}

#[tokio::test(start_paused = true)]
async fn hanging_probe_counts_as_dead() {
    let rpc = ScriptedRpc::new();
    let config = Config {
        probe_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(30),
        ..config(2)
    };
    let table = RoutingTable::spawn(config, rpc.clone());

    table.insert(peer(0x01)).await.unwrap();
    table.insert(peer(0x02)).await.unwrap();
    rpc.set(peer(0x01).id, Answer::Hang).await;

    let response = table.insert(peer(0x03)).await.unwrap();
    assert_eq!(response.committed(), Some((0, 0)));
    assert!(response.ping);
}

#[tokio::test]
async fn concurrent_inserts_respect_capacity() {
    const K: usize = 5;
    const N: u8 = 40;

    let rpc = ScriptedRpc::new();
    let config = Config {
        bucket_size: K,
        cache_expiry: Duration::from_secs(3600),
        ..Config::new(local_id())
    };
    let table = RoutingTable::spawn(config, rpc);

    let handles: Vec<_> = (1..=N)
        .map(|i| {
            let table = table.clone();
            // All of 0x01..=0x28 have their first bit clear: bucket 0.
            tokio::spawn(async move { table.insert(peer(i)).await.unwrap() })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap().inserted {
            inserted += 1;
        }
    }

    assert_eq!(inserted, K);
    assert_eq!(table.bucket(0).await.unwrap().len(), K);
}

#[tokio::test]
async fn buckets_are_independent() {
    let rpc = ScriptedRpc::new();
    let table = RoutingTable::spawn(config(1), rpc);

    // 0xff ^ 0x01 -> bucket 0, 0xff ^ 0x80 -> bucket 1, 0xff ^ 0xc0 -> bucket 2.
    for (first, bucket) in [(0x01, 0), (0x80, 1), (0xc0, 2)] {
        let response = table.insert(peer(first)).await.unwrap();
        assert_eq!(response.committed(), Some((bucket, 0)));
    }

    let image = table.image().await.unwrap();
    assert_eq!(image.len(), 3);
}

/// A table seeded with two recovered (unchecked) peers, then filled with two fresh ones.
async fn half_stale_table(rpc: std::sync::Arc<ScriptedRpc>) -> RoutingTable {
    let mut image = TableImage::new();
    image.place(0, 0, peer(0x01));
    image.place(0, 1, peer(0x02));

    let config = Config {
        bucket_size: 4,
        cache_expiry: Duration::from_secs(3600),
        ..Config::new(local_id())
    };
    let table = RoutingTable::spawn_with_image(config, rpc, image);

    for first in [0x03, 0x04] {
        let response = table.insert(peer(first)).await.unwrap();
        assert!(response.inserted);
        assert!(!response.ping);
    }

    table
}

#[tokio::test]
async fn only_stale_slots_are_probed() {
    let rpc = ScriptedRpc::new();
    let table = half_stale_table(rpc.clone()).await;

    // Would be evicted if it were probed, but its entry is fresh.
    rpc.set(peer(0x03).id, Answer::Dead).await;

    let response = table.insert(peer(0x05)).await.unwrap();
    assert_eq!(
        response,
        AddPeerResponse {
            bucket: 0,
            slot: None,
            ping: true,
            inserted: false
        }
    );
    assert_eq!(
        rpc.pinged().await,
        [peer(0x01).id, peer(0x02).id].into_iter().collect()
    );
    assert_eq!(rpc.ping_count().await, 2);
}

#[tokio::test]
async fn stale_slot_results_decide_eviction() {
    let rpc = ScriptedRpc::new();
    let table = half_stale_table(rpc.clone()).await;

    rpc.set(peer(0x02).id, Answer::Dead).await;
    rpc.set(peer(0x04).id, Answer::Dead).await;

    let response = table.insert(peer(0x05)).await.unwrap();
    assert_eq!(response.committed(), Some((0, 1)));
    assert!(response.ping);
    assert_eq!(
        rpc.pinged().await,
        [peer(0x01).id, peer(0x02).id].into_iter().collect()
    );
    assert_eq!(
        table.bucket(0).await.unwrap(),
        vec![peer(0x01), peer(0x05), peer(0x03), peer(0x04)]
    );
}
