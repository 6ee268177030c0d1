// In-memory clusters for tests, benches and the demo.
//
// `SimNetwork` connects real node actors through a simulated transport with
// random latency and partitions. `EngineCluster` drives bare engines in
// lockstep so a test can pick the exact interleaving of link deliveries.

use crate::{
    clock::{LamportClock, Timestamp},
    engine::{DeliveryEngine, Step},
    membership::GroupConfig,
    message::{Envelope, Message, MessageId, ProcessId},
    node::{self, Deliveries, NodeHandle, NodeOptions},
    transport::{Peer, Transport},
    Error, Result,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rand::Rng;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::time::{sleep, Instant};

pub fn address_of(process: u32) -> String {
    format!("sim://{process}")
}

/// Random per-send delay
#[derive(Debug, Clone)]
pub struct LatencySimulator {
    pub min: Duration,
    pub max: Duration,
}

impl Default for LatencySimulator {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(1),
            max: Duration::from_millis(10),
        }
    }
}

impl LatencySimulator {
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = u64::try_from(self.min.as_micros()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max.as_micros()).unwrap_or(u64::MAX);
        Duration::from_micros(rand::rng().random_range(min..=max))
    }

    pub async fn simulate(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

#[derive(Debug, Default)]
pub struct SimNetwork {
    nodes: DashMap<String, NodeHandle>,
    partitions: DashSet<(String, String)>,
    latency: LatencySimulator,
}

impl SimNetwork {
    pub fn new(latency: LatencySimulator) -> Self {
        Self {
            nodes: DashMap::new(),
            partitions: DashSet::new(),
            latency,
        }
    }

    pub fn register(&self, address: &str, handle: NodeHandle) {
        self.nodes.insert(address.to_string(), handle);
    }

    pub fn partition(&self, a: &str, b: &str) {
        self.partitions.insert((a.to_string(), b.to_string()));
        self.partitions.insert((b.to_string(), a.to_string()));
    }

    pub fn heal_partition(&self, a: &str, b: &str) {
        self.partitions.remove(&(a.to_string(), b.to_string()));
        self.partitions.remove(&(b.to_string(), a.to_string()));
    }

    /// Cut `address` off from every registered node
    pub fn isolate(&self, address: &str) {
        let others: Vec<String> = self
            .nodes
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|other| other != address)
            .collect();
        for other in others {
            self.partition(address, &other);
        }
    }

    fn is_partitioned(&self, from: &str, to: &str) -> bool {
        self.partitions.contains(&(from.to_string(), to.to_string()))
    }

    pub async fn send(&self, from: &str, to: &str, envelope: &Envelope) -> Result<()> {
        self.latency.simulate().await;

        if self.is_partitioned(from, to) {
            return Err(Error::unreachable(to, "network partition"));
        }
        let handle = self
            .nodes
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::unreachable(to, "no such node"))?;

        handle
            .receive(envelope.clone())
            .map_err(|e| Error::unreachable(to, e))
    }
}

/// Transport for one node of a `SimNetwork`
#[derive(Debug, Clone)]
pub struct SimTransport {
    from: String,
    network: Arc<SimNetwork>,
}

impl SimTransport {
    pub fn new(from: impl Into<String>, network: Arc<SimNetwork>) -> Self {
        Self {
            from: from.into(),
            network,
        }
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn send(&self, peer: &Peer, envelope: &Envelope) -> Result<()> {
        self.network.send(&self.from, &peer.address, envelope).await
    }
}

/// A running group of nodes; index `i` holds process `i + 1`
#[derive(Debug)]
pub struct SimCluster {
    pub network: Arc<SimNetwork>,
    pub nodes: Vec<NodeHandle>,
    pub deliveries: Vec<Deliveries>,
}

pub fn spawn_cluster(size: u32, latency: LatencySimulator, options: NodeOptions) -> Result<SimCluster> {
    let network = Arc::new(SimNetwork::new(latency));
    let mut nodes = Vec::new();
    let mut deliveries = Vec::new();

    for process in 1..=size {
        let peers = (1..=size)
            .filter(|other| *other != process)
            .map(|other| Peer::new(address_of(other)))
            .collect();
        let group = GroupConfig::new(ProcessId(process), size, peers)?;
        let transport = Arc::new(SimTransport::new(address_of(process), network.clone()));

        let (handle, rx) = node::spawn(group, transport, options.clone());
        network.register(&address_of(process), handle.clone());
        nodes.push(handle);
        deliveries.push(rx);
    }

    Ok(SimCluster {
        network,
        nodes,
        deliveries,
    })
}

/// Wait for up to `count` deliveries, giving up after `wait`
pub async fn collect_deliveries(deliveries: &mut Deliveries, count: usize, wait: Duration) -> Vec<Message> {
    let deadline = Instant::now() + wait;
    let mut collected = Vec::with_capacity(count);

    while collected.len() < count {
        match tokio::time::timeout_at(deadline, deliveries.recv()).await {
            Ok(Some(msg)) => collected.push(msg),
            _ => break,
        }
    }
    collected
}

/// Engines wired by FIFO links and driven one link delivery at a time.
/// Index `i` holds process `i + 1`.
#[derive(Debug)]
pub struct EngineCluster {
    engines: Vec<DeliveryEngine>,
    links: BTreeMap<(usize, usize), VecDeque<Envelope>>,
    delivered: Vec<Vec<Message>>,
}

impl EngineCluster {
    pub fn new(size: u32) -> Self {
        Self::starting_at(size, 0)
    }

    /// Every engine's clock starts at `clock`
    pub fn starting_at(size: u32, clock: Timestamp) -> Self {
        let engines: Vec<_> = (1..=size)
            .map(|p| DeliveryEngine::new(ProcessId(p), size).with_clock(LamportClock::starting_at(clock)))
            .collect();
        let delivered = vec![Vec::new(); engines.len()];
        Self {
            engines,
            links: BTreeMap::new(),
            delivered,
        }
    }

    pub fn size(&self) -> usize {
        self.engines.len()
    }

    /// Panics if the engine refuses; this drives tests only
    pub fn multicast(&mut self, origin: usize, payload: impl Into<String>) -> MessageId {
        let step = self.engines[origin]
            .multicast_send(payload.into())
            .expect("engine refused to multicast");
        let id = step
            .broadcast
            .as_ref()
            .map(Envelope::message_id)
            .expect("multicast step without a broadcast");
        self.apply(origin, step);
        id
    }

    fn apply(&mut self, at: usize, step: Step) {
        if let Some(envelope) = step.broadcast {
            for to in (0..self.engines.len()).filter(|to| *to != at) {
                self.links.entry((at, to)).or_default().push_back(envelope.clone());
            }
        }
        self.delivered[at].extend(step.delivered);
    }

    /// Links with something in flight
    pub fn ready_links(&self) -> Vec<(usize, usize)> {
        self.links
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(link, _)| *link)
            .collect()
    }

    /// Deliver the oldest envelope on `from -> to`. Returns `false` if the
    /// link was empty.
    pub fn deliver_next(&mut self, from: usize, to: usize) -> bool {
        let Some(envelope) = self.links.get_mut(&(from, to)).and_then(VecDeque::pop_front) else {
            return false;
        };
        let step = match envelope {
            Envelope::Message(msg) => self.engines[to].on_message_received(msg),
            Envelope::Ack(ack) => self.engines[to].on_ack_received(ack),
        };
        self.apply(to, step);
        true
    }

    /// Drain every link. `pick(n)` chooses which of the `n` ready links goes next.
    pub fn run(&mut self, mut pick: impl FnMut(usize) -> usize) {
        loop {
            let ready = self.ready_links();
            if ready.is_empty() {
                break;
            }
            let (from, to) = ready[pick(ready.len()) % ready.len()];
            self.deliver_next(from, to);
        }
    }

    pub fn delivered(&self, index: usize) -> &[Message] {
        &self.delivered[index]
    }

    pub fn delivered_ids(&self, index: usize) -> Vec<MessageId> {
        self.delivered[index].iter().map(|msg| msg.id).collect()
    }

    pub fn engine(&self, index: usize) -> &DeliveryEngine {
        &self.engines[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_sample_within_bounds() {
        let latency = LatencySimulator {
            min: Duration::from_millis(2),
            max: Duration::from_millis(4),
        };
        for _ in 0..100 {
            let d = latency.sample();
            assert!(d >= latency.min && d <= latency.max);
        }
        assert_eq!(LatencySimulator::none().sample(), Duration::ZERO);
    }

    #[test]
    fn test_engine_cluster_round_robin() {
        let mut cluster = EngineCluster::new(3);
        let a = cluster.multicast(0, "a");
        let b = cluster.multicast(2, "b");

        cluster.run(|_| 0);

        for index in 0..cluster.size() {
            assert_eq!(cluster.delivered_ids(index), vec![a, b]);
            assert_eq!(cluster.engine(index).pending_len(), 0);
        }
    }

    #[test]
    #[should_panic(expected = "engine refused to multicast")]
    fn test_engine_cluster_multicast_fails_loudly() {
        let mut cluster = EngineCluster::starting_at(2, Timestamp::MAX);
        cluster.multicast(0, "no room");
    }

    #[test]
    fn test_engine_cluster_starting_clock() {
        let mut cluster = EngineCluster::starting_at(2, 41);
        assert_eq!(cluster.multicast(1, "x"), MessageId::new(42, ProcessId(2)));
    }

    #[tokio::test]
    async fn test_partitioned_send_fails() {
        let network = SimNetwork::new(LatencySimulator::none());
        network.partition("sim://1", "sim://2");

        let ack = Envelope::Ack(crate::message::Ack {
            message_id: MessageId::new(1, ProcessId(1)),
            from: ProcessId(1),
        });
        let result = network.send("sim://1", "sim://2", &ack).await;
        assert!(matches!(result, Err(Error::PeerUnreachable { .. })));

        network.heal_partition("sim://1", "sim://2");
        // Healed, but nobody is registered at the address
        let result = network.send("sim://1", "sim://2", &ack).await;
        assert!(matches!(result, Err(Error::PeerUnreachable { .. })));
    }
}
