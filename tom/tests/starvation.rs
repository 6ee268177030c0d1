use std::time::Duration;
use tom::{
    outbox::RetryPolicy,
    test_utils::{address_of, collect_deliveries, spawn_cluster, LatencySimulator},
    GroupHealth, NodeOptions, ProcessId,
};

fn watchful_options() -> NodeOptions {
    NodeOptions {
        retry: RetryPolicy {
            max_attempts: 200,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
        },
        initial_clock: 0,
        stall_timeout: Duration::from_millis(200),
        health_interval: Duration::from_millis(25),
    }
}

#[tokio::test]
async fn test_missing_member_stalls_delivery_and_degrades_health() {
    let mut cluster = spawn_cluster(3, LatencySimulator::none(), watchful_options()).unwrap();
    cluster.network.isolate(&address_of(3));

    let id = cluster.nodes[0].multicast("needs everyone").await.unwrap();

    // Process 3 never acks, so nobody may deliver
    let early = collect_deliveries(&mut cluster.deliveries[0], 1, Duration::from_millis(300)).await;
    assert!(early.is_empty());
    let early = collect_deliveries(&mut cluster.deliveries[1], 1, Duration::from_millis(50)).await;
    assert!(early.is_empty());

    let mut health = cluster.nodes[0].health();
    let degraded = tokio::time::timeout(
        Duration::from_secs(2),
        health.wait_for(|h| matches!(h, GroupHealth::Degraded { .. })),
    )
    .await
    .expect("health never degraded")
    .unwrap()
    .clone();

    match degraded {
        GroupHealth::Degraded { head, waiting_for, .. } => {
            assert_eq!(head, id);
            assert_eq!(waiting_for, vec![ProcessId(3)]);
        }
        GroupHealth::Healthy => unreachable!(),
    }

    let status = cluster.nodes[0].status().await.unwrap();
    assert_eq!(status.pending, 1);
    assert_eq!(status.delivered, 0);
    assert!(matches!(status.health, GroupHealth::Degraded { .. }));

    // Retries are still running, so healing lets the stalled message through
    cluster.network.heal_partition(&address_of(1), &address_of(3));
    cluster.network.heal_partition(&address_of(2), &address_of(3));

    for deliveries in &mut cluster.deliveries {
        let delivered = collect_deliveries(deliveries, 1, Duration::from_secs(5)).await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, id);
    }

    tokio::time::timeout(Duration::from_secs(2), health.wait_for(|h| *h == GroupHealth::Healthy))
        .await
        .expect("health never recovered")
        .unwrap();
}

#[tokio::test]
async fn test_exhausted_retries_mark_peer_unreachable() {
    let options = NodeOptions {
        retry: RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
        ..watchful_options()
    };
    let mut cluster = spawn_cluster(2, LatencySimulator::none(), options).unwrap();
    cluster.network.isolate(&address_of(2));

    cluster.nodes[0].multicast("lost").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = cluster.nodes[0].status().await.unwrap();
    assert_eq!(status.unreachable_peers, vec![address_of(2)]);
    assert_eq!(status.pending, 1);

    // The envelope was dropped, so delivery stays starved
    let delivered = collect_deliveries(&mut cluster.deliveries[0], 1, Duration::from_millis(100)).await;
    assert!(delivered.is_empty());
}
