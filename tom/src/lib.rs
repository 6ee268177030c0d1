#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Total-order reliable multicast for a fixed group of processes.
//!
//! Every process tags the messages it originates with a Lamport timestamp.
//! A message is delivered once every member of the group has acknowledged it
//! and no smaller message id is still outstanding, so all processes deliver
//! the same messages in the same `(timestamp, origin)` order without a
//! sequencer.
//!
//! Delivery needs an ack from *every* member. A permanently unreachable
//! member stalls delivery everywhere; [`node`] surfaces that as
//! [`node::GroupHealth::Degraded`] instead of failing.

pub mod acks;
pub mod clock;
pub mod engine;
pub mod error;
pub mod membership;
pub mod message;
pub mod node;
pub mod outbox;
pub mod pending;
pub mod transport;

pub mod test_utils;

pub use engine::{DeliveryEngine, Step};
pub use error::{Error, Result};
pub use membership::GroupConfig;
pub use message::{Ack, Envelope, Message, MessageId, ProcessId, SendRequest};
pub use node::{Deliveries, GroupHealth, NodeHandle, NodeOptions, NodeStatus};
pub use transport::{Peer, Transport};
