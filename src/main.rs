mod backoff;
mod cli;
mod cloudinit;
mod config;
mod detect;
mod error;
mod orchestrator;
mod output;
mod provider;
mod release;
mod runtime;
mod ssh;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigAction, ProvidersAction};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .without_time()
        .init();

    let project_root = std::env::current_dir()?;

    match cli.command {
        Command::Init => {
            cli::init::run()?;
        }

        Command::Deploy => {
            let config = config::TargetConfig::load(&cli.config)?;
            cli::deploy::run(config, cli.config.clone(), project_root).await?;
        }

        Command::Rollback { release } => {
            let config = config::TargetConfig::load(&cli.config)?;
            cli::rollback::run(config, release.as_deref()).await?;
        }

        Command::Releases => {
            let config = config::TargetConfig::load(&cli.config)?;
            cli::releases::run(config).await?;
        }

        Command::Logs { lines, follow } => {
            let config = config::TargetConfig::load(&cli.config)?;
            cli::logs::run(config, lines, follow).await?;
        }

        Command::Config { action } => match action {
            ConfigAction::Set { pair } => {
                let config = config::TargetConfig::load(&cli.config)?;
                cli::config_cmd::set(config, &cli.config, &pair).await?;
            }
            ConfigAction::Unset { key } => {
                let config = config::TargetConfig::load(&cli.config)?;
                cli::config_cmd::unset(config, &cli.config, &key).await?;
            }
            ConfigAction::List => {
                let config = config::TargetConfig::load(&cli.config)?;
                cli::config_cmd::list(config).await?;
            }
        },

        Command::Providers { action } => match action {
            ProvidersAction::List => {
                cli::providers::list();
            }
            ProvidersAction::Validate { name, token } => {
                cli::providers::validate(&name, &token).await?;
            }
        },
    }

    Ok(())
}
