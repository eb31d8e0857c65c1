use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::TargetConfig;
use crate::orchestrator::Orchestrator;
use crate::output;
use crate::provider::ProviderRegistry;

pub async fn run(mut config: TargetConfig, config_path: PathBuf, project_root: PathBuf) -> Result<()> {
    let token = std::env::var(token_env_var(&config.provider.name))
        .with_context(|| format!("set {} in the environment", token_env_var(&config.provider.name)))?;

    let ssh_key_path = config
        .provider
        .ssh_key_path
        .clone()
        .unwrap_or_else(|| "~/.ssh/id_ed25519".to_string());
    let public_key = read_public_key(&ssh_key_path)?;

    output::header(&format!("Deploying {}", config.app.name));

    let registry = ProviderRegistry::with_defaults();
    let mut orchestrator = Orchestrator::new(
        &registry,
        Box::new(|step| {
            output::step(step.progress_percent as usize, 100, &step.description);
        }),
    );

    orchestrator
        .deploy(&mut config, &config_path, &project_root, &token, &public_key)
        .await?;

    config.save(&config_path)?;
    output::success("Deploy complete");
    Ok(())
}

fn token_env_var(provider: &str) -> String {
    format!("LIFTOFF_{}_TOKEN", provider.to_ascii_uppercase())
}

fn read_public_key(private_key_path: &str) -> Result<String> {
    let expanded = if let Some(rest) = private_key_path.strip_prefix("~/") {
        let home = std::env::var("HOME").context("HOME not set")?;
        format!("{}/{}", home, rest)
    } else {
        private_key_path.to_string()
    };
    let pub_path = format!("{}.pub", expanded);
    std::fs::read_to_string(&pub_path)
        .with_context(|| format!("failed to read public key at {}", pub_path))
        .map(|s| s.trim().to_string())
}
