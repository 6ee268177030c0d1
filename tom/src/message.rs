use crate::clock::Timestamp;
use serde::{Deserialize, Serialize};

/// Identifier of a group member, unique in `1..=group_size`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global ordering and dedup key for a multicast message
///
/// Ordered by timestamp first, then by originating process. Field order
/// matters: the derived `Ord` is lexicographic over the fields as declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub timestamp: Timestamp,
    #[serde(rename = "originProcessId")]
    pub origin: ProcessId,
}

impl MessageId {
    pub fn new(timestamp: Timestamp, origin: ProcessId) -> Self {
        Self { timestamp, origin }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.timestamp, self.origin)
    }
}

/// An application payload tagged with its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub payload: String,
}

/// Acknowledgment of `message_id` by process `from`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
    #[serde(rename = "fromProcessId")]
    pub from: ProcessId,
}

/// Local trigger asking a process to originate a multicast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub payload: String,
}

/// Everything a process sends to its peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Message(Message),
    Ack(Ack),
}

impl Envelope {
    pub fn message_id(&self) -> MessageId {
        match self {
            Envelope::Message(msg) => msg.id,
            Envelope::Ack(ack) => ack.message_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Message(_) => "message",
            Envelope::Ack(_) => "ack",
        }
    }
}

impl From<Message> for Envelope {
    fn from(msg: Message) -> Self {
        Envelope::Message(msg)
    }
}

impl From<Ack> for Envelope {
    fn from(ack: Ack) -> Self {
        Envelope::Ack(ack)
    }
}
