//! Deployment Orchestrator (C6): phase sequencer driving provision →
//! configure-once → deploy, emitting progress events and persisting server
//! identity (§4.6).

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::TargetConfig;
use crate::detect::{self, Detection};
use crate::error::{Error, Result};
use crate::provider::{ProviderRegistry, ProvisionRequest};
use crate::release::{build, env as release_env, prune, provision, proxy, service, switch, tarball, Release, RemoteLayout};
use crate::ssh::SshSession;

/// One phase transition, handed to the caller-provided progress callback.
#[derive(Debug, Clone)]
pub struct DeploymentStep {
    pub name: String,
    pub description: String,
    pub progress_percent: u8,
}

pub type ProgressCallback<'a> = Box<dyn FnMut(DeploymentStep) + 'a>;

pub struct Orchestrator<'a> {
    registry: &'a ProviderRegistry,
    on_progress: ProgressCallback<'a>,
}

/// Refuse to (re-)provision a target that already has a server recorded
/// (§4.6 step 1, §8 "Orchestrator guard"). `deploy` itself doesn't call
/// this — a target already provisioned simply skips straight to
/// configure+deploy — but a caller invoking provisioning directly (e.g. a
/// CLI `provision` verb) should run this first.
pub fn guard_not_provisioned(config: &TargetConfig) -> Result<()> {
    if config.provider.is_provisioned() {
        return Err(Error::ServerAlreadyProvisioned {
            server_id: config.provider.server_id.clone(),
            ip: config.provider.ip.clone(),
        });
    }
    Ok(())
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a ProviderRegistry, on_progress: ProgressCallback<'a>) -> Self {
        Self { registry, on_progress }
    }

    fn emit(&mut self, name: &str, description: &str, progress_percent: u8) {
        let step = DeploymentStep {
            name: name.to_string(),
            description: description.to_string(),
            progress_percent,
        };
        info!(step = %step.name, pct = step.progress_percent, "{}", step.description);
        (self.on_progress)(step);
    }

    /// Run the full provision → configure → deploy pipeline for one
    /// target. Mutates `config` in place (assigned server id/ip) and the
    /// caller is responsible for persisting it to disk after each phase
    /// that mutates it (§4.6 step 2, §5 "on-disk config: callers
    /// responsible for external serialization").
    pub async fn deploy(
        &mut self,
        config: &mut TargetConfig,
        config_path: &Path,
        project_root: &Path,
        token: &str,
        public_key: &str,
    ) -> Result<()> {
        self.emit("guard", "checking provisioning state", 0);
        let driver = self.registry.get(&config.provider.name, token)?;

        if !driver.supports_ssh() {
            return self.deploy_container_platform(config, driver.as_ref()).await;
        }

        if !config.provider.is_provisioned() {
            self.provision(config, driver.as_ref(), public_key).await?;
            config.save(config_path).ok();
        }

        let layout = RemoteLayout {
            app_name: &config.app.name,
        };

        self.emit("detect", "detecting project framework", 10);
        let detection = detect::detect(project_root);

        self.emit("connect", "opening SSH session", 15);
        let key_path = PathBuf::from(config.provider.ssh_key_path.clone().unwrap_or_default());
        let session = SshSession::connect(
            &config.provider.username,
            &config.provider.ip,
            None,
            &key_path,
            17,
            Duration::from_secs(10),
        )
        .await?;

        let already_configured = session.path_exists(layout.configured_sentinel()).await.unwrap_or(false);

        self.emit("apt-lock", "waiting for package manager lock", 20);
        provision::wait_for_apt_lock(&session, 30, Duration::from_secs(5)).await?;

        self.emit("base-packages", "installing base packages and runtime", 25);
        provision::install_base_packages(&session, &detection).await?;

        if !already_configured {
            self.emit("directories", "creating remote directory structure", 30);
            provision::setup_directory_structure(&session, &layout).await?;
        }

        self.emit("tarball", "packaging release", 35);
        let release = Release::new();
        let tarball_path = std::env::temp_dir().join(format!("liftoff-release-{}.tar.gz", release.timestamp));
        let digest = tarball::create_release_tarball(project_root, &tarball_path)?;

        self.emit("upload", "uploading release", 45);
        let release_path = build::upload_release(&session, &layout, &release, &tarball_path, &digest).await?;
        let _ = std::fs::remove_file(&tarball_path);

        self.emit("build", "building release", 55);
        if !config.deploy.skip_build {
            if let Some(builder) = &config.builder {
                return Err(Error::BuilderNotSupported(builder.clone()));
            }
            build::build_release_with_env(
                &session,
                &layout,
                project_root,
                &release_path,
                &detection,
                &config.deploy.env,
                config.deploy.build_command.as_deref(),
            )
            .await?;
        }

        self.emit("env", "writing environment file", 65);
        release_env::write_environment_file(&session, &layout, &config.deploy.env).await?;

        let is_static = detection.is_static();

        if !is_static {
            self.emit("service", "writing service unit", 70);
            let exec_start = service::choose_exec_start(&layout, &detection, config.deploy.run_command.as_deref());
            service::generate_systemd_unit(&session, &layout, &config.app.name, &exec_start).await?;
            service::enable_service(&session, &config.app.name).await?;
        }

        if let Some(domain) = &config.deploy.domain {
            if !domain.is_empty() {
                self.emit("proxy", "configuring reverse proxy", 75);
                let static_root = is_static.then(|| format!("{}/{}", release_path, detection.build_output()));
                proxy::generate_nginx_config(&session, &config.app.name, domain, 8000, static_root.as_deref()).await?;
                proxy::test_nginx_config(&session).await?;
                proxy::reload_nginx(&session).await?;
            }
        }

        self.emit("switch", "switching release and health-checking", 85);
        switch::deploy_with_health_check(
            &session,
            &layout,
            &detection,
            &release_path,
            &config.app.name,
            is_static,
            15,
            Duration::from_secs(2),
        )
        .await?;

        self.emit("prune", "pruning old releases", 95);
        if let Err(e) = prune::cleanup_old_releases(&session, &layout, config.deploy.keep_releases).await {
            warn!("release pruning failed (non-fatal): {}", e);
        }

        if !already_configured {
            session
                .sudo_exec(&format!(
                    "mkdir -p $(dirname {sentinel}) && touch {sentinel}",
                    sentinel = layout.configured_sentinel()
                ))
                .await?;
            let _ = session
                .execute_sudo("nohup bash -c 'apt-get upgrade -y && shutdown -r +5' >/dev/null 2>&1 &")
                .await;
        }

        self.emit("done", "deploy complete", 100);
        Ok(())
    }

    async fn provision(&mut self, config: &mut TargetConfig, driver: &dyn crate::provider::Provider, public_key: &str) -> Result<()> {
        self.emit("validate-credentials", "validating provider credentials", 2);
        driver.validate_credentials().await?;

        self.emit("ssh-key", "uploading SSH key", 4);
        let key_id = driver.upload_ssh_key(&format!("liftoff-{}", config.app.name), public_key).await?;

        self.emit("cloud-init", "generating cloud-init user data", 5);
        let user_data = crate::cloudinit::generate_user_data(&config.provider.username, public_key, &config.app.name);

        self.emit("provision", "provisioning server", 6);
        let req = ProvisionRequest {
            name: config.app.name.clone(),
            region: config.provider.region.clone().unwrap_or_default(),
            size: config.provider.size.clone().unwrap_or_default(),
            image: "ubuntu-22-04-x64".to_string(),
            user_data,
            ssh_key_id: key_id,
            tags: vec!["liftoff".to_string()],
        };
        let server = driver.provision(&req).await?;

        self.emit("wait-active", "waiting for server to become active", 8);
        let server = driver.wait_for_active(&server.id, Duration::from_secs(300)).await?;

        config.provider.server_id = server.id;
        config.provider.ip = server.public_ip;
        Ok(())
    }

    /// Container-platform branch: skip C1/C4/C5 entirely, delegate to the
    /// provider's native build+deploy RPC and poll its status endpoint
    /// (§4.6 "Container-platform branch").
    async fn deploy_container_platform(&mut self, config: &mut TargetConfig, driver: &dyn crate::provider::Provider) -> Result<()> {
        self.emit("validate-credentials", "validating provider credentials", 5);
        driver.validate_credentials().await?;

        if !config.provider.is_provisioned() {
            self.emit("provision", "allocating app shell", 20);
            let req = ProvisionRequest {
                name: config.app.name.clone(),
                region: config.provider.region.clone().unwrap_or_default(),
                size: config.provider.size.clone().unwrap_or_default(),
                image: String::new(),
                user_data: String::new(),
                ssh_key_id: String::new(),
                tags: vec![],
            };
            let server = driver.provision(&req).await?;
            config.provider.server_id = server.id;
            config.provider.ip = server.public_ip;
        }

        self.emit("deploy", "delegating to container-platform deployer", 60);
        driver.container_deploy(&config.app.name, "liftoff/placeholder:latest").await?;

        self.emit("health", "waiting for platform health", 80);
        driver.container_wait_healthy(&config.app.name, Duration::from_secs(300)).await?;

        self.emit("done", "deploy complete", 100);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DeployOptions, ProviderConfig};

    #[test]
    fn deployment_step_carries_progress_percent() {
        let step = DeploymentStep {
            name: "tarball".into(),
            description: "packaging release".into(),
            progress_percent: 35,
        };
        assert_eq!(step.progress_percent, 35);
    }

    fn config_with(server_id: &str, ip: &str) -> TargetConfig {
        TargetConfig {
            app: AppConfig {
                name: "widget".into(),
                framework_hint: None,
            },
            provider: ProviderConfig {
                name: "digitalocean".into(),
                server_id: server_id.into(),
                ip: ip.into(),
                ..Default::default()
            },
            builder: None,
            deploy: DeployOptions::default(),
        }
    }

    #[test]
    fn guard_refuses_already_provisioned_target() {
        let cfg = config_with("123", "1.2.3.4");
        let err = guard_not_provisioned(&cfg).unwrap_err();
        assert!(matches!(err, Error::ServerAlreadyProvisioned { .. }));
    }

    #[test]
    fn guard_allows_unprovisioned_target() {
        let cfg = config_with("", "");
        assert!(guard_not_provisioned(&cfg).is_ok());
    }
}
