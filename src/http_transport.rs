// Sends envelopes to peers over HTTP, to the same `/multicast/*` routes
// this crate's server exposes.

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tom::{Envelope, Error, Peer, Transport};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    /// Extra random delay before each call, to exercise reordering
    latency: Option<(Duration, Duration)>,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration, latency: Option<(Duration, Duration)>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, latency })
    }

    pub fn endpoint(peer: &Peer, envelope: &Envelope) -> String {
        format!("{}/multicast/{}", peer.address.trim_end_matches('/'), envelope.kind())
    }

    async fn simulate_latency(&self) {
        let Some((min, max)) = self.latency else {
            return;
        };
        let delay = if max > min {
            let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
            let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
        } else {
            min
        };
        trace!(?delay, "simulated network delay");
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, peer: &Peer, envelope: &Envelope) -> tom::Result<()> {
        self.simulate_latency().await;

        let url = Self::endpoint(peer, envelope);
        let request = match envelope {
            Envelope::Message(msg) => self.client.post(&url).json(msg),
            Envelope::Ack(ack) => self.client.post(&url).json(ack),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::unreachable(peer.address.clone(), e))?;

        if response.status().is_success() {
            debug!(%peer, id = %envelope.message_id(), kind = envelope.kind(), "delivered to peer");
            Ok(())
        } else {
            Err(Error::unreachable(
                peer.address.clone(),
                format!("peer rejected {}: {}", envelope.kind(), response.status()),
            ))
        }
    }
}
