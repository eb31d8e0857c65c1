use anyhow::{bail, Context, Result};
use dialoguer::{Input, Select};
use minijinja::Environment;
use std::path::Path;

use crate::provider::ProviderRegistry;

const TEMPLATE: &str = include_str!("../../templates/liftoff_init.toml.j2");

pub fn run() -> Result<()> {
    let config_path = Path::new("liftoff.toml");
    if config_path.exists() {
        bail!("liftoff.toml already exists in this directory");
    }

    let default_name = std::env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "myapp".to_string());

    let app_name: String = Input::new()
        .with_prompt("App name")
        .default(default_name)
        .interact_text()?;

    let registry = ProviderRegistry::with_defaults();
    let providers = registry.names();
    let provider_idx = Select::new()
        .with_prompt("Cloud provider")
        .items(&providers)
        .default(0)
        .interact()?;
    let provider = providers[provider_idx].clone();

    let region: String = Input::new()
        .with_prompt("Region")
        .default("nyc1".to_string())
        .interact_text()?;

    let size: String = Input::new()
        .with_prompt("Server size")
        .default("s-1vcpu-2gb".to_string())
        .interact_text()?;

    let default_key = default_ssh_key_path();
    let ssh_key_path: String = Input::new()
        .with_prompt("SSH private key path")
        .default(default_key)
        .interact_text()?;

    let mut env = Environment::new();
    env.add_template("liftoff.toml", TEMPLATE)?;
    let tmpl = env.get_template("liftoff.toml").unwrap();
    let content = tmpl.render(minijinja::context! {
        APP_NAME => app_name,
        PROVIDER => provider,
        REGION => region,
        SIZE => size,
        SSH_KEY_PATH => ssh_key_path,
    })?;

    std::fs::write(config_path, content).context("failed to write liftoff.toml")?;

    crate::output::success("Created liftoff.toml");
    crate::output::info("Set your provider token in the environment, then run `liftoff deploy`.");

    Ok(())
}

fn default_ssh_key_path() -> String {
    dirs_home()
        .map(|home| format!("{}/.ssh/id_ed25519", home))
        .unwrap_or_else(|| "~/.ssh/id_ed25519".to_string())
}

fn dirs_home() -> Option<String> {
    std::env::var("HOME").ok()
}
