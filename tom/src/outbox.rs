// Outbound fan-out, one FIFO worker per peer.
//
// Each worker sends its queue strictly in order and retries the envelope at
// the front before moving on. Per-peer FIFO matters for ordering: a message
// a process originated always reaches a peer before any ack that process
// sends afterwards.

use crate::{
    message::Envelope,
    transport::{Peer, Transport},
    Error, Result,
};
use rand::Rng;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per envelope, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `failed + 1`: exponential, plus up to 25% jitter,
    /// capped at `max_backoff`
    pub fn backoff(&self, failed: u32) -> Duration {
        let exponent = failed.saturating_sub(1).min(16);
        let base = self.initial_backoff.saturating_mul(1 << exponent);

        let jitter_ms = u64::try_from(base.as_millis() / 4).unwrap_or(u64::MAX);
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };

        base.saturating_add(jitter).min(self.max_backoff)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Result of pushing one envelope to one peer, reported back to the node
#[derive(Debug)]
pub enum SendReport {
    Sent { peer: Peer, envelope: Envelope },
    Unreachable { peer: Peer, envelope: Envelope, error: Error },
}

#[derive(Debug)]
struct PeerLink {
    peer: Peer,
    queue: mpsc::UnboundedSender<Envelope>,
    /// Envelopes queued or in flight, decremented once the worker is done
    /// with one
    backlog: Arc<AtomicUsize>,
}

#[derive(Debug)]
pub struct Outbox {
    links: Vec<PeerLink>,
}

impl Outbox {
    /// Spawn one worker per peer. Workers exit once the outbox is dropped
    /// and their queue has drained.
    pub fn start(
        peers: &[Peer],
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        reports: mpsc::UnboundedSender<SendReport>,
    ) -> Self {
        let links = peers
            .iter()
            .map(|peer| {
                let (queue, rx) = mpsc::unbounded_channel();
                let backlog = Arc::new(AtomicUsize::new(0));
                tokio::spawn(run_link(
                    peer.clone(),
                    rx,
                    backlog.clone(),
                    transport.clone(),
                    retry.clone(),
                    reports.clone(),
                ));
                PeerLink {
                    peer: peer.clone(),
                    queue,
                    backlog,
                }
            })
            .collect();

        Self { links }
    }

    /// Queue `envelope` for every peer. Never blocks on the network.
    pub fn broadcast(&self, envelope: &Envelope) {
        for link in &self.links {
            link.backlog.fetch_add(1, Ordering::SeqCst);
            if link.queue.send(envelope.clone()).is_err() {
                link.backlog.fetch_sub(1, Ordering::SeqCst);
                warn!(peer = %link.peer, "peer worker has exited, dropping {}", envelope.kind());
            }
        }
    }

    /// Envelopes not yet sent or given up on, per peer address
    pub fn backlog(&self) -> BTreeMap<String, usize> {
        self.links
            .iter()
            .map(|link| (link.peer.address.clone(), link.backlog.load(Ordering::SeqCst)))
            .collect()
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.links.iter().map(|link| &link.peer)
    }
}

async fn run_link(
    peer: Peer,
    mut queue: mpsc::UnboundedReceiver<Envelope>,
    backlog: Arc<AtomicUsize>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    reports: mpsc::UnboundedSender<SendReport>,
) {
    while let Some(envelope) = queue.recv().await {
        let outcome = send_with_retry(transport.as_ref(), &peer, &envelope, &retry).await;
        backlog.fetch_sub(1, Ordering::SeqCst);

        let report = match outcome {
            Ok(()) => SendReport::Sent {
                peer: peer.clone(),
                envelope,
            },
            Err(error) => {
                error!(
                    %peer,
                    id = %envelope.message_id(),
                    kind = envelope.kind(),
                    attempts = retry.attempts(),
                    "giving up on peer: {}",
                    error
                );
                SendReport::Unreachable {
                    peer: peer.clone(),
                    envelope,
                    error,
                }
            }
        };

        if reports.send(report).is_err() {
            debug!(%peer, "node stopped, closing peer link");
            break;
        }
    }
}

async fn send_with_retry(
    transport: &dyn Transport,
    peer: &Peer,
    envelope: &Envelope,
    retry: &RetryPolicy,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        match transport.send(peer, envelope).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < retry.attempts() => {
                let delay = retry.backoff(attempt);
                warn!(
                    %peer,
                    id = %envelope.message_id(),
                    attempt,
                    ?delay,
                    "send failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
