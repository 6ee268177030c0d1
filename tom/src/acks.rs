use crate::message::{MessageId, ProcessId};
use std::collections::{BTreeMap, BTreeSet};

/// Which processes have acknowledged each outstanding message
///
/// An entry may exist before the message itself is known locally (the ack
/// overtook it); it is reconciled when the message arrives. Entries only
/// grow until they are removed on delivery.
#[derive(Debug, Default)]
pub struct AckTable {
    entries: BTreeMap<MessageId, BTreeSet<ProcessId>>,
}

impl AckTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` acknowledged `id`. Returns `false` if it already had.
    pub fn add_ack(&mut self, id: MessageId, from: ProcessId) -> bool {
        self.entries.entry(id).or_default().insert(from)
    }

    pub fn count(&self, id: &MessageId) -> usize {
        self.entries.get(id).map_or(0, BTreeSet::len)
    }

    pub fn acked_by(&self, id: &MessageId) -> Option<&BTreeSet<ProcessId>> {
        self.entries.get(id)
    }

    /// Smallest id with an entry, whether or not the message is known locally
    pub fn smallest_pending_key(&self) -> Option<MessageId> {
        self.entries.first_key_value().map(|(id, _)| *id)
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<BTreeSet<ProcessId>> {
        self.entries.remove(id)
    }

    /// Members of `1..=group_size` that have not acked `id`
    pub fn missing(&self, id: &MessageId, group_size: u32) -> Vec<ProcessId> {
        let acked = self.entries.get(id);
        (1..=group_size)
            .map(ProcessId)
            .filter(|p| acked.map_or(true, |set| !set.contains(p)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
