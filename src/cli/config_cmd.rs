use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::TargetConfig;
use crate::output;
use crate::release::{env as release_env, RemoteLayout};
use crate::ssh::SshSession;

pub async fn set(mut config: TargetConfig, config_path: &Path, pair: &str) -> Result<()> {
    let (key, value) = pair.split_once('=').context("expected KEY=VALUE format")?;
    config.deploy.env.insert(key.to_string(), value.to_string());
    config.save(config_path)?;

    push_env(&config).await?;
    output::success(&format!("Set {}={}", key, value));
    Ok(())
}

pub async fn unset(mut config: TargetConfig, config_path: &Path, key: &str) -> Result<()> {
    config.deploy.env.remove(key);
    config.save(config_path)?;

    push_env(&config).await?;
    output::success(&format!("Unset {}", key));
    Ok(())
}

pub async fn list(config: TargetConfig) -> Result<()> {
    output::header(&format!("Environment for {}", config.app.name));
    let mut keys: Vec<&String> = config.deploy.env.keys().collect();
    keys.sort();
    for key in keys {
        println!("{}={}", key, config.deploy.env[key]);
    }
    Ok(())
}

async fn push_env(config: &TargetConfig) -> Result<()> {
    if !config.provider.is_provisioned() {
        return Ok(());
    }

    let layout = RemoteLayout {
        app_name: &config.app.name,
    };
    let key_path = PathBuf::from(config.provider.ssh_key_path.clone().unwrap_or_default());
    let session = SshSession::connect(
        &config.provider.username,
        &config.provider.ip,
        None,
        &key_path,
        5,
        Duration::from_secs(5),
    )
    .await
    .context("failed to connect to deployment target")?;

    release_env::write_environment_file(&session, &layout, &config.deploy.env).await?;
    session.close().await?;
    Ok(())
}
