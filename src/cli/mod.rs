use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::channel::{CommandChannel, HostChannel};
use crate::config::DeckhandConfig;
use crate::deploy::Deployer;
use crate::provision::Provisioner;
use crate::store::Store;

pub mod deploy;
pub mod host;
pub mod init;
pub mod logs;
pub mod ports;
pub mod project;
pub mod releases;
pub mod rollback;

#[derive(Parser)]
#[command(
    name = "deckhand",
    version,
    about = "Deploy git projects as routed containers on local or SSH hosts"
)]
pub struct Cli {
    /// Path to deckhand.toml
    #[arg(short, long, default_value = "deckhand.toml")]
    pub config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scaffold deckhand.toml in the current directory
    Init,

    /// Register and manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Build and deploy a project
    Deploy {
        /// Project name
        project: String,
        /// Tag, branch or commit to deploy (defaults to the configured branch)
        #[arg(long = "ref")]
        git_ref: Option<String>,
        /// Name recorded on the deployment (defaults to $USER)
        #[arg(long)]
        actor: Option<String>,
    },

    /// Swap back to the previous container, or redeploy a past commit
    Rollback {
        /// Project name
        project: String,
        /// Redeploy this commit through the full pipeline instead
        #[arg(long)]
        commit: Option<String>,
        /// Name recorded on the deployment (defaults to $USER)
        #[arg(long)]
        actor: Option<String>,
    },

    /// List a project's deployments
    Releases {
        /// Project name
        project: String,
    },

    /// Tail logs from a project's current container
    Logs {
        /// Project name
        project: String,
        /// Number of lines to tail
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },

    /// Register and provision hosts
    Host {
        #[command(subcommand)]
        action: HostAction,
    },

    /// Inspect port allocation
    Ports {
        #[command(subcommand)]
        action: PortsAction,
    },
}

#[derive(Subcommand)]
pub enum ProjectAction {
    /// Register a project from [projects.<name>] (re-run to apply config changes)
    Add {
        /// Project name
        name: String,
    },
    /// List registered projects
    List,
    /// Tear down a project's containers, images and checkout
    Remove {
        /// Project name
        name: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Stop the current container
    Stop {
        /// Project name
        name: String,
    },
    /// Start the current container
    Start {
        /// Project name
        name: String,
    },
    /// Remove containers that are neither current nor previous
    Prune {
        /// Project name
        name: String,
    },
    /// Check whether the branch has commits newer than the deployed one
    Check {
        /// Project name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum HostAction {
    /// Register a host from [hosts.<name>]
    Add {
        /// Host name
        name: String,
    },
    /// List registered hosts
    List,
    /// Bootstrap hosts (all non-ready hosts if none are named)
    Provision {
        /// Host names
        names: Vec<String>,
    },
    /// Return a host to pending so it can be provisioned again
    Reset {
        /// Host name
        name: String,
    },
    /// Forget a host
    Remove {
        /// Host name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum PortsAction {
    /// Show ports held by projects
    List,
    /// Suggest free ports
    Suggest {
        /// How many ports to suggest
        #[arg(default_value = "5")]
        count: usize,
    },
    /// Check whether a port is free
    Check { port: u16 },
}

/// Everything a command needs, built from the config file.
pub struct Engine {
    pub config: DeckhandConfig,
    pub store: Store,
    pub deployer: Deployer,
    pub provisioner: Provisioner,
}

impl Engine {
    pub async fn open(config_path: &Path) -> Result<Self> {
        let config = DeckhandConfig::load_or_default(config_path)?;
        let state_path = config.state_path();
        let store = Store::open(&state_path)
            .await
            .with_context(|| format!("Failed to open state file: {}", state_path.display()))?;

        let channel: Arc<dyn CommandChannel> = Arc::new(HostChannel::new());
        let deployer = Deployer::new(channel.clone(), store.clone(), config.deploy_settings());
        let provisioner = Provisioner::new(channel, store.clone(), config.provision_settings());

        Ok(Self {
            config,
            store,
            deployer,
            provisioner,
        })
    }
}

pub fn actor(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "deckhand".to_string())
}
