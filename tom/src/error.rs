use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Invalid group membership: {0}")]
    InvalidMembership(String),

    #[error("Logical clock exhausted, cannot stamp another message")]
    ClockExhausted,

    #[error("Multicast node has stopped")]
    NodeStopped,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn unreachable(peer: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::PeerUnreachable {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
