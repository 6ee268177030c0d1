use std::time::Duration;
use tom::{
    test_utils::{address_of, collect_deliveries, spawn_cluster, LatencySimulator},
    GroupHealth, NodeOptions,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Total-order multicast demo");
    println!("==========================\n");

    demo_concurrent_senders().await?;
    demo_partitioned_member().await?;

    Ok(())
}

async fn demo_concurrent_senders() -> Result<(), Box<dyn std::error::Error>> {
    println!("1. Four processes multicasting at once over a 1-20ms network");

    let latency = LatencySimulator {
        min: Duration::from_millis(1),
        max: Duration::from_millis(20),
    };
    let mut cluster = spawn_cluster(4, latency, NodeOptions::default())?;

    let mut sends = Vec::new();
    for node in &cluster.nodes {
        let node = node.clone();
        sends.push(tokio::spawn(async move {
            for i in 0..3 {
                node.multicast(format!("p{}#{i}", node.process_id())).await?;
            }
            Ok::<_, tom::Error>(())
        }));
    }
    for send in sends {
        send.await??;
    }

    let mut orders = Vec::new();
    for (i, deliveries) in cluster.deliveries.iter_mut().enumerate() {
        let delivered = collect_deliveries(deliveries, 12, Duration::from_secs(10)).await;
        let payloads: Vec<_> = delivered.iter().map(|msg| msg.payload.clone()).collect();
        println!("   process {} delivered {:?}", i + 1, payloads);
        orders.push(payloads);
    }

    let agreed = orders.windows(2).all(|pair| pair[0] == pair[1]);
    println!("   all processes agree on the order: {agreed}\n");
    Ok(())
}

async fn demo_partitioned_member() -> Result<(), Box<dyn std::error::Error>> {
    println!("2. One member cut off: delivery stalls until it comes back");

    let options = NodeOptions {
        stall_timeout: Duration::from_millis(300),
        health_interval: Duration::from_millis(50),
        ..NodeOptions::default()
    };
    let mut cluster = spawn_cluster(3, LatencySimulator::none(), options)?;
    cluster.network.isolate(&address_of(3));

    let id = cluster.nodes[0].multicast("waiting on process 3").await?;
    println!("   process 1 sent {id}");

    let mut health = cluster.nodes[0].health();
    let degraded = tokio::time::timeout(
        Duration::from_secs(2),
        health.wait_for(|h| matches!(h, GroupHealth::Degraded { .. })),
    )
    .await?
    .map(|state| state.clone());
    if let Ok(state) = degraded {
        println!("   health: {state:?}");
    }

    cluster.network.heal_partition(&address_of(1), &address_of(3));
    cluster.network.heal_partition(&address_of(2), &address_of(3));
    println!("   partition healed");

    let delivered = collect_deliveries(&mut cluster.deliveries[0], 1, Duration::from_secs(5)).await;
    println!("   process 1 delivered {} message(s)", delivered.len());
    let health = cluster.nodes[0].health().borrow().clone();
    println!("   health: {health:?}\n");
    Ok(())
}
