use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod config_cmd;
pub mod deploy;
pub mod init;
pub mod logs;
pub mod providers;
pub mod releases;
pub mod rollback;

#[derive(Parser)]
#[command(name = "liftoff", version, about = "Provision a VM, deploy an app over SSH, and roll back on failed health checks")]
pub struct Cli {
    /// Path to liftoff.toml
    #[arg(short, long, default_value = "liftoff.toml")]
    pub config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scaffold liftoff.toml in the current directory
    Init,

    /// Provision (if needed), configure, and deploy the application
    Deploy,

    /// Roll back to a previous release
    Rollback {
        /// Specific release timestamp to roll back to (defaults to the previous release)
        #[arg(long)]
        release: Option<String>,
    },

    /// List releases on the remote host
    Releases,

    /// Tail the application's service logs
    Logs {
        /// Number of lines to tail
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },

    /// Manage the remote environment file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Inspect cloud provider catalogs and credentials
    Providers {
        #[command(subcommand)]
        action: ProvidersAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set an environment variable
    Set {
        /// KEY=VALUE pair
        pair: String,
    },
    /// Unset an environment variable
    Unset {
        /// Variable name
        key: String,
    },
    /// List environment variables
    List,
}

#[derive(Subcommand)]
pub enum ProvidersAction {
    /// List registered providers
    List,
    /// Validate stored credentials for a provider
    Validate {
        /// Provider name (e.g. "digitalocean")
        name: String,
        /// API token to validate
        #[arg(long)]
        token: String,
    },
}
