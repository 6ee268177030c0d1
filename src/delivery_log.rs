use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tom::{Deliveries, Message};
use tracing::debug;

/// The most recent deliveries, oldest first. Kept in memory only.
#[derive(Debug, Clone)]
pub struct DeliveryLog {
    entries: Arc<Mutex<VecDeque<Message>>>,
    capacity: usize,
}

impl DeliveryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(4096)))),
            capacity,
        }
    }

    pub fn push(&self, msg: Message) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(msg);
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Record everything the node delivers until it stops
    pub fn follow(&self, mut deliveries: Deliveries) -> tokio::task::JoinHandle<()> {
        let log = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = deliveries.recv().await {
                log.push(msg);
            }
            debug!("delivery stream closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tom::{MessageId, ProcessId};

    fn msg(ts: u64) -> Message {
        Message {
            id: MessageId::new(ts, ProcessId(1)),
            payload: format!("m{ts}"),
        }
    }

    #[test]
    fn test_drops_oldest_when_full() {
        let log = DeliveryLog::new(2);
        for ts in 1..=3 {
            log.push(msg(ts));
        }
        let kept: Vec<u64> = log.snapshot().iter().map(|m| m.id.timestamp).collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let log = DeliveryLog::new(0);
        log.push(msg(1));
        assert!(log.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_follow_records_in_order() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let log = DeliveryLog::new(8);
        let task = log.follow(rx);

        tx.send(msg(1)).unwrap();
        tx.send(msg(2)).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(log.snapshot(), vec![msg(1), msg(2)]);
    }
}
