//! Provider Registry + Drivers (C2): a uniform VM-lifecycle contract across
//! several IaaS APIs and one container-native platform (§4.2).

pub mod digitalocean;
pub mod flyio;
pub mod registry;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use registry::ProviderRegistry;

use crate::error::{Error, Result};

/// A provisioned host (§3 `Server`). `status` belongs to the driver's own
/// state vocabulary; `active`/`running` denotes readiness for SSH.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub public_ip: String,
    pub private_ip: Option<String>,
    pub status: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub user_data: String,
    pub ssh_key_id: String,
    pub tags: Vec<String>,
}

/// One driver per provider (§4.2). Container platforms report
/// `supports_ssh() == false`; the orchestrator routes around C1/C4/C5 for
/// them entirely.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn supports_provisioning(&self) -> bool;
    fn supports_byos(&self) -> bool;
    fn supports_ssh(&self) -> bool;

    /// One cheap API call (list regions or fetch account); fails with
    /// `InvalidCredentials` on rejection.
    async fn validate_credentials(&self) -> Result<()>;

    async fn get_regions(&self) -> Vec<String>;
    async fn get_sizes(&self) -> Vec<String>;
    async fn get_images(&self) -> Vec<String>;

    /// Idempotent: on a duplicate-name error, lists existing keys and
    /// returns the pre-existing one by name match.
    async fn upload_ssh_key(&self, name: &str, public_key: &str) -> Result<String>;

    async fn provision(&self, req: &ProvisionRequest) -> Result<Server>;
    async fn get_server(&self, id: &str) -> Result<Server>;

    /// Terminate, wait, then release any public IP and security group this
    /// driver created. Cleanup errors are logged, not surfaced.
    async fn destroy(&self, id: &str) -> Result<()>;

    /// Container-native platforms (§4.2 exception) override these to
    /// delegate to their native build+deploy RPC; SSH-capable providers
    /// never have them called.
    async fn container_deploy(&self, _app_name: &str, _image: &str) -> Result<()> {
        Err(Error::UnknownProvider(format!(
            "{} does not support container-native deploy",
            self.name()
        )))
    }

    async fn container_wait_healthy(&self, _app_name: &str, _timeout: std::time::Duration) -> Result<()> {
        Ok(())
    }

    async fn wait_for_active(&self, id: &str, timeout: std::time::Duration) -> Result<Server> {
        crate::backoff::poll_until(
            std::time::Duration::from_secs(5),
            timeout,
            format!("server {} to become active", id),
            || async {
                let server = self.get_server(id).await?;
                if is_active_status(&server.status) {
                    Ok(Some(server))
                } else {
                    Ok(None)
                }
            },
        )
        .await
    }
}

fn is_active_status(status: &str) -> bool {
    matches!(status.to_ascii_lowercase().as_str(), "active" | "running")
}

/// Classify a provider API failure into the shared retry discipline (§4.2).
pub fn classify_http_error(status: u16, body: &str) -> Error {
    match status {
        401 | 403 => Error::AuthFailed {
            message: format!("provider rejected credentials (HTTP {})", status),
            next_steps: "check your API token and its scopes".into(),
        },
        429 => Error::RateLimited {
            message: format!("provider throttled the request (HTTP {})", status),
            next_steps: "retry after a short delay".into(),
        },
        422 if body.to_ascii_lowercase().contains("limit") => Error::QuotaExceeded {
            message: format!("provider quota exceeded: {}", body),
            next_steps: "request a quota increase or choose a smaller size/region".into(),
        },
        500..=599 => Error::TransportError(format!("provider returned HTTP {}: {}", status, body)),
        other => Error::TransportError(format!("provider returned HTTP {}: {}", other, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_status_is_case_insensitive() {
        assert!(is_active_status("Active"));
        assert!(is_active_status("RUNNING"));
        assert!(!is_active_status("new"));
    }

    #[test]
    fn classifies_429_as_rate_limited() {
        let err = classify_http_error(429, "");
        assert!(matches!(err, Error::RateLimited { .. }));
        assert_eq!(err.classify(), crate::error::RetryClass::Retryable);
    }

    #[test]
    fn classifies_401_as_auth_failed() {
        let err = classify_http_error(401, "");
        assert_eq!(err.classify(), crate::error::RetryClass::Auth);
    }
}
