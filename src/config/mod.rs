use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

mod validate;

/// The operator's intent for one deployment target (§3 `TargetConfig`).
/// Exactly one field of `provider` is populated; `server_id`/`ip` are both
/// empty (unprovisioned) or both non-empty — enforced by `validate`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TargetConfig {
    pub app: AppConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub builder: Option<String>,
    #[serde(default)]
    pub deploy: DeployOptions,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default)]
    pub framework_hint: Option<String>,
}

/// Exactly one of these sub-records is populated (the `validate` pass
/// enforces that, rather than modeling it as an untagged enum, so a
/// malformed config reports *which* rule it broke).
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub ssh_key_path: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub ip: String,
}

fn default_username() -> String {
    "deploy".to_string()
}

impl ProviderConfig {
    pub fn is_provisioned(&self) -> bool {
        !self.server_id.is_empty() && !self.ip.is_empty()
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct DeployOptions {
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub run_command: Option<String>,
    #[serde(default)]
    pub skip_build: bool,
    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,
    #[serde(default)]
    pub domain: Option<String>,
}

fn default_keep_releases() -> usize {
    5
}

impl TargetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        validate::validate(&config)?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, rendered)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Remote base path for this app: `B/<app_name>` (§3 "Remote layout").
    pub fn app_path(&self) -> String {
        format!("/srv/{}", self.app.name)
    }

    pub fn releases_path(&self) -> String {
        format!("{}/releases", self.app_path())
    }

    pub fn current_symlink(&self) -> String {
        format!("{}/current", self.app_path())
    }

    pub fn shared_path(&self) -> String {
        format!("{}/shared", self.app_path())
    }

    pub fn env_file_path(&self) -> String {
        format!("{}/env/.env", self.shared_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_path_layout_matches_remote_convention() {
        let cfg = TargetConfig {
            app: AppConfig {
                name: "widget".into(),
                framework_hint: None,
            },
            provider: ProviderConfig {
                name: "digitalocean".into(),
                ..Default::default()
            },
            builder: None,
            deploy: DeployOptions::default(),
        };

        assert_eq!(cfg.app_path(), "/srv/widget");
        assert_eq!(cfg.releases_path(), "/srv/widget/releases");
        assert_eq!(cfg.current_symlink(), "/srv/widget/current");
        assert_eq!(cfg.env_file_path(), "/srv/widget/shared/env/.env");
    }
}
