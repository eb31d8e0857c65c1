use anyhow::{bail, Result};

use super::TargetConfig;

pub fn validate(config: &TargetConfig) -> Result<()> {
    if config.app.name.is_empty() {
        bail!("app.name cannot be empty");
    }

    if config.provider.name.is_empty() {
        bail!("provider.name cannot be empty");
    }

    let server_id_set = !config.provider.server_id.is_empty();
    let ip_set = !config.provider.ip.is_empty();
    if server_id_set != ip_set {
        bail!("provider.server_id and provider.ip must be either both empty or both set");
    }

    if config.deploy.keep_releases == 0 {
        bail!("deploy.keep_releases must be at least 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DeployOptions, ProviderConfig};

    fn base_config() -> TargetConfig {
        TargetConfig {
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
        }
    }

    #[test]
    fn rejects_mismatched_server_id_and_ip() {
        let mut cfg = base_config();
        cfg.provider.server_id = "123".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn accepts_both_empty_or_both_set() {
        let cfg = base_config();
        assert!(validate(&cfg).is_ok());

        let mut provisioned = base_config();
        provisioned.provider.server_id = "123".into();
        provisioned.provider.ip = "1.2.3.4".into();
        assert!(validate(&provisioned).is_ok());
    }

    #[test]
    fn rejects_empty_app_name() {
        let mut cfg = base_config();
        cfg.app.name = String::new();
        assert!(validate(&cfg).is_err());
    }
}
