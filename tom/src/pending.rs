use crate::message::{Message, MessageId};
use std::collections::BTreeMap;

/// Messages received or originated but not yet delivered, smallest id first
///
/// Keyed by `MessageId`, so a re-arrival of the same id replaces the entry
/// instead of adding a second one.
#[derive(Debug, Default)]
pub struct PendingSet {
    entries: BTreeMap<MessageId, Message>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `msg`, replacing any entry with the same id.
    /// Returns `true` if an entry was replaced.
    pub fn insert_or_replace(&mut self, msg: Message) -> bool {
        self.entries.insert(msg.id, msg).is_some()
    }

    pub fn peek_min(&self) -> Option<&Message> {
        self.entries.first_key_value().map(|(_, msg)| msg)
    }

    pub fn pop_min(&mut self) -> Option<Message> {
        self.entries.pop_first().map(|(_, msg)| msg)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &MessageId> {
        self.entries.keys()
    }
}
