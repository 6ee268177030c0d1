//! `lamportcast`: a total-order multicast group member served over HTTP.
//!
//! The ordering protocol lives in the `tom` crate. This crate wires it to
//! configuration, an axum server, and a reqwest transport.

pub mod cli;
pub mod client;
pub mod config;
pub mod delivery_log;
pub mod http_transport;
pub mod server;

pub use cli::{Cli, Commands, RunArgs};
pub use config::NodeConfig;
