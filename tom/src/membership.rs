// Group membership: who we are, how big the group is, where the peers live.
// Membership is fixed for the lifetime of a process.

use crate::{
    clock::Timestamp,
    message::{Ack, Envelope, Message, ProcessId},
    transport::Peer,
    Error, Result,
};

#[derive(Debug, Clone)]
pub struct GroupConfig {
    process_id: ProcessId,
    group_size: u32,
    peers: Vec<Peer>,
}

impl GroupConfig {
    /// Build a validated membership.
    ///
    /// `peers` excludes this process; every other member must be listed so
    /// that acks from the whole group can be collected.
    pub fn new(process_id: ProcessId, group_size: u32, peers: Vec<Peer>) -> Result<Self> {
        if group_size == 0 {
            return Err(Error::InvalidMembership("group size must be at least 1".to_string()));
        }
        if process_id.0 == 0 || process_id.0 > group_size {
            return Err(Error::InvalidMembership(format!(
                "process id {process_id} outside 1..={group_size}"
            )));
        }
        let expected = (group_size - 1) as usize;
        if peers.len() != expected {
            return Err(Error::InvalidMembership(format!(
                "group of {group_size} needs {expected} peers, got {}",
                peers.len()
            )));
        }

        Ok(Self {
            process_id,
            group_size,
            peers,
        })
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn is_member(&self, id: ProcessId) -> bool {
        (1..=self.group_size).contains(&id.0)
    }

    /// Reject a message whose origin is not a member, or whose timestamp
    /// leaves no room on the clock
    pub fn check_message(&self, msg: &Message) -> Result<()> {
        if !self.is_member(msg.id.origin) {
            return Err(Error::Malformed(format!(
                "message {} from non-member {}",
                msg.id, msg.id.origin
            )));
        }
        if msg.id.timestamp == Timestamp::MAX {
            return Err(Error::Malformed(format!("message {} has an out-of-range timestamp", msg.id)));
        }
        Ok(())
    }

    /// Reject an ack from a non-member, for a non-member's message, or
    /// one claiming to come from this process
    pub fn check_ack(&self, ack: &Ack) -> Result<()> {
        if !self.is_member(ack.from) || !self.is_member(ack.message_id.origin) {
            return Err(Error::Malformed(format!(
                "ack for {} from {} references a non-member",
                ack.message_id, ack.from
            )));
        }
        if ack.from == self.process_id {
            return Err(Error::Malformed(format!(
                "ack for {} claims to come from this process",
                ack.message_id
            )));
        }
        Ok(())
    }

    pub fn check(&self, envelope: &Envelope) -> Result<()> {
        match envelope {
            Envelope::Message(msg) => self.check_message(msg),
            Envelope::Ack(ack) => self.check_ack(ack),
        }
    }
}
