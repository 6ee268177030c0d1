// Multicast node: a single task that owns the delivery engine.
//
// Inbound messages, acks and local sends are queued to the node's mailbox
// and processed one at a time, which is the only exclusion boundary the
// engine needs. Network sends leave through the outbox, so a slow or dead
// peer never holds up local bookkeeping.

use crate::{
    clock::{LamportClock, Timestamp},
    engine::{DeliveryEngine, HeadStatus, Step},
    membership::GroupConfig,
    message::{Ack, Envelope, Message, MessageId, ProcessId},
    outbox::{Outbox, RetryPolicy, SendReport},
    transport::Transport,
    Error, Result,
};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Delivered messages, in global order
pub type Deliveries = mpsc::UnboundedReceiver<Message>;

#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub retry: RetryPolicy,
    pub initial_clock: Timestamp,
    /// How long the same head may stay blocked before the group is degraded
    pub stall_timeout: Duration,
    pub health_interval: Duration,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            initial_clock: 0,
            stall_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(1),
        }
    }
}

/// Whether delivery is making progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum GroupHealth {
    Healthy,
    /// The head of the pending set has not moved for longer than the stall
    /// timeout. Delivery resumes by itself if the missing acks arrive.
    Degraded {
        head: MessageId,
        waiting_for: Vec<ProcessId>,
        blocked_by: Option<MessageId>,
        stalled_ms: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub process_id: ProcessId,
    pub group_size: u32,
    pub clock: Timestamp,
    pub pending: usize,
    pub ack_entries: usize,
    pub delivered: u64,
    pub watermark: Option<MessageId>,
    pub head: Option<HeadStatus>,
    pub unreachable_peers: Vec<String>,
    /// Envelopes each peer's worker has yet to send or give up on
    pub outbox_backlog: BTreeMap<String, usize>,
    pub health: GroupHealth,
}

#[derive(Debug)]
enum Command {
    Multicast {
        payload: String,
        reply: oneshot::Sender<Result<MessageId>>,
    },
    Message(Message),
    Ack(Ack),
    Status {
        reply: oneshot::Sender<NodeStatus>,
    },
}

/// Cloneable handle to a running node
#[derive(Debug, Clone)]
pub struct NodeHandle {
    group: Arc<GroupConfig>,
    commands: mpsc::UnboundedSender<Command>,
    health: watch::Receiver<GroupHealth>,
}

impl NodeHandle {
    pub fn process_id(&self) -> ProcessId {
        self.group.process_id()
    }

    pub fn group(&self) -> &GroupConfig {
        &self.group
    }

    /// Originate a multicast. Returns once the message is stamped and
    /// queued for every peer, not once it is delivered.
    pub async fn multicast(&self, payload: impl Into<String>) -> Result<MessageId> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Multicast {
            payload: payload.into(),
            reply,
        })?;
        rx.await.map_err(|_| Error::NodeStopped)?
    }

    /// Hand a peer's message to the node. Malformed input is rejected here.
    pub fn receive_message(&self, msg: Message) -> Result<()> {
        self.group.check_message(&msg)?;
        self.command(Command::Message(msg))
    }

    /// Hand a peer's ack to the node. Malformed input is rejected here.
    pub fn receive_ack(&self, ack: Ack) -> Result<()> {
        self.group.check_ack(&ack)?;
        self.command(Command::Ack(ack))
    }

    pub fn receive(&self, envelope: Envelope) -> Result<()> {
        match envelope {
            Envelope::Message(msg) => self.receive_message(msg),
            Envelope::Ack(ack) => self.receive_ack(ack),
        }
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Status { reply })?;
        rx.await.map_err(|_| Error::NodeStopped)
    }

    /// Watch for degraded-group transitions
    pub fn health(&self) -> watch::Receiver<GroupHealth> {
        self.health.clone()
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::NodeStopped)
    }
}

/// Start a node for `group`. Must be called from within a tokio runtime.
///
/// The node runs until every `NodeHandle` has been dropped.
pub fn spawn(
    group: GroupConfig,
    transport: Arc<dyn Transport>,
    options: NodeOptions,
) -> (NodeHandle, Deliveries) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (reports_tx, reports_rx) = mpsc::unbounded_channel();
    let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
    let (health_tx, health_rx) = watch::channel(GroupHealth::Healthy);

    let engine = DeliveryEngine::for_group(&group)
        .with_clock(LamportClock::starting_at(options.initial_clock));
    let outbox = Outbox::start(group.peers(), transport, options.retry.clone(), reports_tx);

    let actor = NodeActor {
        engine,
        outbox,
        deliveries: deliveries_tx,
        health: health_tx,
        unreachable: BTreeSet::new(),
        head_since: None,
        stall_timeout: options.stall_timeout,
    };

    info!(
        process = %group.process_id(),
        group_size = group.group_size(),
        peers = group.peers().len(),
        "starting multicast node"
    );
    let health_interval = options.health_interval.max(Duration::from_millis(1));
    tokio::spawn(actor.run(commands_rx, reports_rx, health_interval));

    let handle = NodeHandle {
        group: Arc::new(group),
        commands: commands_tx,
        health: health_rx,
    };
    (handle, deliveries_rx)
}

struct NodeActor {
    engine: DeliveryEngine,
    outbox: Outbox,
    deliveries: mpsc::UnboundedSender<Message>,
    health: watch::Sender<GroupHealth>,
    unreachable: BTreeSet<String>,
    head_since: Option<(MessageId, Instant)>,
    stall_timeout: Duration,
}

impl NodeActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut reports: mpsc::UnboundedReceiver<SendReport>,
        health_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(health_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(report) = reports.recv() => self.handle_report(report),
                _ = ticker.tick() => self.check_health(),
            }
        }

        info!(process = %self.engine.process_id(), "multicast node stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Multicast { payload, reply } => match self.engine.multicast_send(payload) {
                Ok(step) => {
                    let id = step.broadcast.as_ref().map(Envelope::message_id);
                    self.apply(step);
                    if let Some(id) = id {
                        let _ = reply.send(Ok(id));
                    }
                }
                Err(e) => {
                    warn!(process = %self.engine.process_id(), "multicast refused: {}", e);
                    let _ = reply.send(Err(e));
                }
            },
            Command::Message(msg) => {
                let step = self.engine.on_message_received(msg);
                self.apply(step);
            }
            Command::Ack(ack) => {
                let step = self.engine.on_ack_received(ack);
                self.apply(step);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn handle_report(&mut self, report: SendReport) {
        match report {
            SendReport::Sent { peer, envelope } => {
                debug!(%peer, id = %envelope.message_id(), kind = envelope.kind(), "sent");
                if self.unreachable.remove(&peer.address) {
                    info!(%peer, "peer reachable again");
                }
                let delivered = self.engine.try_deliver();
                self.apply(Step {
                    broadcast: None,
                    delivered,
                });
            }
            SendReport::Unreachable { peer, envelope, .. } => {
                warn!(
                    process = %self.engine.process_id(),
                    %peer,
                    id = %envelope.message_id(),
                    "peer marked unreachable, {} dropped",
                    envelope.kind()
                );
                self.unreachable.insert(peer.address);
            }
        }
    }

    fn apply(&mut self, step: Step) {
        if let Some(envelope) = step.broadcast {
            self.outbox.broadcast(&envelope);
        }

        for msg in step.delivered {
            info!(
                process = %self.engine.process_id(),
                id = %msg.id,
                payload = %msg.payload,
                "DELIVER"
            );
            if self.deliveries.send(msg).is_err() {
                debug!("delivery receiver dropped");
            }
        }

        self.track_head();
    }

    fn track_head(&mut self) {
        let head = self.engine.head_id();
        if head == self.head_since.map(|(id, _)| id) {
            return;
        }

        self.head_since = head.map(|id| (id, Instant::now()));
        // The head moved, so the group is making progress again
        self.set_health(GroupHealth::Healthy);
    }

    fn check_health(&mut self) {
        let Some((_, since)) = self.head_since else {
            self.set_health(GroupHealth::Healthy);
            return;
        };

        let stalled = since.elapsed();
        if stalled < self.stall_timeout {
            return;
        }
        if let Some(head) = self.engine.head() {
            self.set_health(GroupHealth::Degraded {
                head: head.id,
                waiting_for: head.waiting_for,
                blocked_by: head.blocked_by,
                stalled_ms: u64::try_from(stalled.as_millis()).unwrap_or(u64::MAX),
            });
        }
    }

    fn set_health(&mut self, next: GroupHealth) {
        let process = self.engine.process_id();
        self.health.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            match (&*current, &next) {
                (GroupHealth::Healthy, GroupHealth::Degraded { head, waiting_for, .. }) => {
                    warn!(%process, %head, ?waiting_for, "delivery stalled, group degraded");
                }
                (GroupHealth::Degraded { .. }, GroupHealth::Healthy) => {
                    info!(%process, "delivery resumed");
                }
                _ => {}
            }
            *current = next;
            true
        });
    }

    fn status(&self) -> NodeStatus {
        NodeStatus {
            process_id: self.engine.process_id(),
            group_size: self.engine.group_size(),
            clock: self.engine.clock(),
            pending: self.engine.pending_len(),
            ack_entries: self.engine.ack_entries(),
            delivered: self.engine.delivered_count(),
            watermark: self.engine.watermark(),
            head: self.engine.head(),
            unreachable_peers: self.unreachable.iter().cloned().collect(),
            outbox_backlog: self.outbox.backlog(),
            health: self.health.borrow().clone(),
        }
    }
}
