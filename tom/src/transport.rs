use crate::{message::Envelope, Result};
use async_trait::async_trait;

/// Address of another group member, as understood by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    pub address: String,
}

impl Peer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}

/// Point-to-point delivery of envelopes to one peer.
///
/// A call either hands the envelope to the peer or fails with
/// `Error::PeerUnreachable`. Implementations must not retry or swallow
/// failures; the outbox owns the retry policy.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(&self, peer: &Peer, envelope: &Envelope) -> Result<()>;
}
