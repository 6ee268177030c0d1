// Delivery engine: the clock, the pending set and the ack table behind one
// owner. Every operation reads across all three, so they are never exposed
// separately. The engine does no I/O; each operation returns a `Step`
// describing what to broadcast and what became deliverable, and the caller
// (the node actor) performs the sends outside the engine.
//
// Per message id:
//   Unknown -> Pending -> Deliverable -> Delivered
// Delivered is terminal. The engine remembers the largest delivered id and
// absorbs anything at or below it, so a delivered id never re-enters.

use crate::{
    acks::AckTable,
    clock::{LamportClock, Timestamp},
    membership::GroupConfig,
    message::{Ack, Envelope, Message, MessageId, ProcessId},
    pending::PendingSet,
    Error, Result,
};
use serde::Serialize;
use tracing::{debug, trace, warn};

/// Outcome of one engine operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Step {
    /// Envelope to fan out to every peer, if any
    pub broadcast: Option<Envelope>,
    /// Messages delivered by this step, in global order
    pub delivered: Vec<Message>,
}

/// Why the head of the pending set is not deliverable yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadStatus {
    pub id: MessageId,
    pub acked_by: Vec<ProcessId>,
    pub waiting_for: Vec<ProcessId>,
    /// A smaller id known only through acks, if one is holding the head back
    pub blocked_by: Option<MessageId>,
}

#[derive(Debug)]
pub struct DeliveryEngine {
    process_id: ProcessId,
    group_size: u32,
    clock: LamportClock,
    pending: PendingSet,
    acks: AckTable,
    watermark: Option<MessageId>,
    delivered: u64,
}

impl DeliveryEngine {
    pub fn new(process_id: ProcessId, group_size: u32) -> Self {
        Self {
            process_id,
            group_size,
            clock: LamportClock::new(),
            pending: PendingSet::new(),
            acks: AckTable::new(),
            watermark: None,
            delivered: 0,
        }
    }

    pub fn for_group(group: &GroupConfig) -> Self {
        Self::new(group.process_id(), group.group_size())
    }

    pub fn with_clock(mut self, clock: LamportClock) -> Self {
        self.clock = clock;
        self
    }

    /// Originate a message: stamp it, hold it pending with our own ack, and
    /// hand it back for fan-out. Fails only once the clock is exhausted.
    pub fn multicast_send(&mut self, payload: String) -> Result<Step> {
        let timestamp = self.clock.tick().ok_or(Error::ClockExhausted)?;
        let id = MessageId::new(timestamp, self.process_id);
        let msg = Message { id, payload };

        self.pending.insert_or_replace(msg.clone());
        self.acks.add_ack(id, self.process_id);
        debug!(process = %self.process_id, %id, "originated message");

        Ok(Step {
            broadcast: Some(Envelope::Message(msg)),
            delivered: self.try_deliver(),
        })
    }

    /// A peer's message arrived. Safe to call repeatedly with the same message.
    pub fn on_message_received(&mut self, msg: Message) -> Step {
        let id = msg.id;
        if self.is_stale(&id) {
            debug!(process = %self.process_id, %id, "ignoring message at or below delivery watermark");
            return Step::default();
        }

        if self.clock.observe(id.timestamp).is_none() {
            warn!(process = %self.process_id, %id, "timestamp would overflow the clock, dropping message");
            return Step::default();
        }
        if self.pending.insert_or_replace(msg) {
            debug!(process = %self.process_id, %id, "duplicate message replaced");
        }
        // The originator implicitly acknowledges its own message
        self.acks.add_ack(id, self.process_id);
        self.acks.add_ack(id, id.origin);

        let ack = Ack {
            message_id: id,
            from: self.process_id,
        };

        Step {
            broadcast: Some(Envelope::Ack(ack)),
            delivered: self.try_deliver(),
        }
    }

    /// A peer acknowledged a message. The message itself may not be known yet.
    pub fn on_ack_received(&mut self, ack: Ack) -> Step {
        let id = ack.message_id;
        if self.is_stale(&id) {
            debug!(process = %self.process_id, %id, from = %ack.from, "ignoring ack at or below delivery watermark");
            return Step::default();
        }

        if !self.acks.add_ack(id, ack.from) {
            trace!(process = %self.process_id, %id, from = %ack.from, "duplicate ack");
        }

        Step {
            broadcast: None,
            delivered: self.try_deliver(),
        }
    }

    /// Deliver from the head of the pending set for as long as the head is
    /// fully acknowledged and is the smallest id in the ack table. Stops at
    /// the first head that is not; nothing behind it is skipped ahead.
    pub fn try_deliver(&mut self) -> Vec<Message> {
        let mut delivered = Vec::new();

        while let Some(head) = self.pending.peek_min() {
            let id = head.id;
            if !self.is_deliverable(&id) {
                break;
            }

            let Some(msg) = self.pending.pop_min() else {
                break;
            };
            self.acks.remove(&id);
            self.watermark = Some(id);
            self.delivered += 1;

            debug!(process = %self.process_id, %id, "delivered");
            delivered.push(msg);
        }

        delivered
    }

    fn is_deliverable(&self, id: &MessageId) -> bool {
        self.acks.count(id) == self.group_size as usize
            && self.acks.smallest_pending_key() == Some(*id)
    }

    fn is_stale(&self, id: &MessageId) -> bool {
        self.watermark.is_some_and(|watermark| *id <= watermark)
    }

    /// Diagnostics for the current head, `None` when nothing is pending
    pub fn head(&self) -> Option<HeadStatus> {
        let head = self.pending.peek_min()?;
        let id = head.id;

        let acked_by = self
            .acks
            .acked_by(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let blocked_by = self.acks.smallest_pending_key().filter(|smallest| *smallest != id);

        Some(HeadStatus {
            id,
            acked_by,
            waiting_for: self.acks.missing(&id, self.group_size),
            blocked_by,
        })
    }

    pub fn head_id(&self) -> Option<MessageId> {
        self.pending.peek_min().map(|head| head.id)
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    pub fn clock(&self) -> Timestamp {
        self.clock.current()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn ack_entries(&self) -> usize {
        self.acks.len()
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered
    }

    pub fn watermark(&self) -> Option<MessageId> {
        self.watermark
    }
}
