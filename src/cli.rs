use std::{net::SocketAddr, path::PathBuf};

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::NodeConfig;

#[derive(Parser, Debug)]
#[command(name = "lamportcast", version, about, long_about = None)]
pub struct Cli {
    /// Verbose mode (-v, -vv)
    #[arg(short, action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs a group member until interrupted
    Run(RunArgs),
    /// Multicasts a payload through a running node
    Send {
        /// Base URL of the node
        #[arg(long, env = "LAMPORTCAST_NODE", default_value = "http://127.0.0.1:8080")]
        node: String,
        payload: String,
    },
    /// Prints the status of a running node
    Status {
        #[arg(long, env = "LAMPORTCAST_NODE", default_value = "http://127.0.0.1:8080")]
        node: String,
    },
}

/// Flags override the config file
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// TOML config file
    #[arg(short, long, env = "LAMPORTCAST_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "LAMPORTCAST_PROCESS_ID")]
    pub process_id: Option<u32>,

    #[arg(long, env = "LAMPORTCAST_GROUP_SIZE")]
    pub group_size: Option<u32>,

    #[arg(long, env = "LAMPORTCAST_BIND")]
    pub bind: Option<SocketAddr>,

    /// Base URL of a group member, repeated for each (our own entry is skipped)
    #[arg(long = "peer", env = "LAMPORTCAST_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    #[arg(long, env = "LAMPORTCAST_INITIAL_CLOCK")]
    pub initial_clock: Option<u64>,
}

impl RunArgs {
    pub fn resolve(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        if let Some(process_id) = self.process_id {
            config.process_id = process_id;
        }
        if let Some(group_size) = self.group_size {
            config.group_size = group_size;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if !self.peers.is_empty() {
            config.peers.clone_from(&self.peers);
        }
        if let Some(initial_clock) = self.initial_clock {
            config.initial_clock = initial_clock;
        }

        Ok(config)
    }
}
