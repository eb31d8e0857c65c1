use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::{classify_http_error, Provider, ProvisionRequest, Server};

const API_BASE: &str = "https://api.machines.dev/v1";

const FALLBACK_REGIONS: &[&str] = &["iad", "lhr", "syd", "nrt"];
const FALLBACK_SIZES: &[&str] = &["shared-cpu-1x", "shared-cpu-2x", "performance-1x"];
const FALLBACK_IMAGES: &[&str] = &["flyio/app"];

#[derive(Deserialize)]
struct RegionEntry {
    code: String,
}

#[derive(Deserialize)]
struct SizeEntry {
    name: String,
}

/// Container-native platform (§4.2 "Container-platform driver exception").
/// `supports_ssh()` is false: `provision` only reserves a name + shared IP;
/// the actual machine is created at deploy time through this driver's
/// native build+deploy RPC, which the orchestrator calls directly instead
/// of routing through C1/C4/C5.
pub struct FlyIoProvider {
    token: String,
    client: reqwest::Client,
}

impl FlyIoProvider {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: reqwest::Client::new(),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.token)
    }

    /// Build + deploy an app's workload through the platform's native RPC.
    /// Called by the orchestrator in place of the tarball/systemd/nginx
    /// pipeline for providers that report `supports_ssh() == false`.
    pub async fn deploy_app(&self, app_name: &str, image: &str) -> Result<()> {
        let resp = crate::backoff::retry(|| async {
            self.authed(self.client.post(format!("{}/apps/{}/machines", API_BASE, app_name)))
                .json(&serde_json::json!({ "config": { "image": image } }))
                .send()
                .await
                .map_err(|e| Error::TransportError(e.to_string()))
        })
        .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &body));
        }
        Ok(())
    }

    /// Poll the platform's own status endpoint instead of SSH (§4.6
    /// "Health-readiness is polled via the provider's status endpoint with
    /// a 5-minute deadline").
    pub async fn wait_for_healthy(&self, app_name: &str, timeout: std::time::Duration) -> Result<()> {
        crate::backoff::poll_until(
            std::time::Duration::from_secs(5),
            timeout,
            format!("app {} to report healthy", app_name),
            || async {
                let resp = self
                    .authed(self.client.get(format!("{}/apps/{}", API_BASE, app_name)))
                    .send()
                    .await
                    .map_err(|e| Error::TransportError(e.to_string()))?;

                if resp.status().is_success() {
                    Ok(Some(()))
                } else {
                    Ok(None)
                }
            },
        )
        .await
    }
}

#[async_trait]
impl Provider for FlyIoProvider {
    fn name(&self) -> &'static str {
        "flyio"
    }

    fn display_name(&self) -> &'static str {
        "Fly.io"
    }

    fn supports_provisioning(&self) -> bool {
        true
    }

    fn supports_byos(&self) -> bool {
        false
    }

    fn supports_ssh(&self) -> bool {
        false
    }

    async fn validate_credentials(&self) -> Result<()> {
        let resp = self
            .authed(self.client.get(format!("{}/apps", API_BASE)))
            .send()
            .await
            .map_err(|e| Error::TransportError(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::InvalidCredentials {
                provider: self.name().to_string(),
            });
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &body));
        }
        Ok(())
    }

    async fn get_regions(&self) -> Vec<String> {
        let fetched = crate::backoff::retry(|| async {
            let resp = self
                .authed(self.client.get(format!("{}/platform/regions", API_BASE)))
                .send()
                .await
                .map_err(|e| Error::TransportError(e.to_string()))?;
            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_http_error(status, &body));
            }
            resp.json::<Vec<RegionEntry>>().await.map_err(|e| Error::TransportError(e.to_string()))
        })
        .await;

        match fetched {
            Ok(regions) if !regions.is_empty() => regions.into_iter().map(|r| r.code).collect(),
            Ok(_) => FALLBACK_REGIONS.iter().map(|s| s.to_string()).collect(),
            Err(e) => {
                tracing::warn!("falling back to hard-coded region list: {}", e);
                FALLBACK_REGIONS.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    async fn get_sizes(&self) -> Vec<String> {
        let fetched = crate::backoff::retry(|| async {
            let resp = self
                .authed(self.client.get(format!("{}/platform/vm_sizes", API_BASE)))
                .send()
                .await
                .map_err(|e| Error::TransportError(e.to_string()))?;
            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_http_error(status, &body));
            }
            resp.json::<Vec<SizeEntry>>().await.map_err(|e| Error::TransportError(e.to_string()))
        })
        .await;

        match fetched {
            Ok(sizes) if !sizes.is_empty() => sizes.into_iter().map(|s| s.name).collect(),
            Ok(_) => FALLBACK_SIZES.iter().map(|s| s.to_string()).collect(),
            Err(e) => {
                tracing::warn!("falling back to hard-coded size list: {}", e);
                FALLBACK_SIZES.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    async fn get_images(&self) -> Vec<String> {
        // Fly machines run arbitrary container images rather than a fixed
        // catalog; there's no platform endpoint to enumerate one. Probe it
        // anyway so an account-scoped registry mirror (if configured) wins,
        // and fall back to the placeholder otherwise.
        let fetched = crate::backoff::retry(|| async {
            let resp = self
                .authed(self.client.get(format!("{}/platform/images", API_BASE)))
                .send()
                .await
                .map_err(|e| Error::TransportError(e.to_string()))?;
            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_http_error(status, &body));
            }
            resp.json::<Vec<String>>().await.map_err(|e| Error::TransportError(e.to_string()))
        })
        .await;

        match fetched {
            Ok(images) if !images.is_empty() => images,
            Ok(_) => FALLBACK_IMAGES.iter().map(|s| s.to_string()).collect(),
            Err(e) => {
                tracing::warn!("falling back to hard-coded image list: {}", e);
                FALLBACK_IMAGES.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    async fn upload_ssh_key(&self, _name: &str, _public_key: &str) -> Result<String> {
        // Not meaningful for a provider with supports_ssh() == false; the
        // orchestrator never calls this for platforms like this one.
        Ok(String::new())
    }

    async fn container_deploy(&self, app_name: &str, image: &str) -> Result<()> {
        self.deploy_app(app_name, image).await
    }

    async fn container_wait_healthy(&self, app_name: &str, timeout: std::time::Duration) -> Result<()> {
        self.wait_for_healthy(app_name, timeout).await
    }

    async fn provision(&self, req: &ProvisionRequest) -> Result<Server> {
        let resp = crate::backoff::retry(|| async {
            self.authed(self.client.post(format!("{}/apps", API_BASE)))
                .json(&serde_json::json!({ "app_name": req.name, "org_slug": "personal" }))
                .send()
                .await
                .map_err(|e| Error::TransportError(e.to_string()))
        })
        .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &body));
        }

        // server_id encodes "app_name:pending" — the workload is deployed
        // later via deploy_app, not at provision time (§4.2).
        Ok(Server {
            id: format!("{}:pending", req.name),
            public_ip: format!("{}.fly.dev", req.name),
            private_ip: None,
            status: "allocated".into(),
            region: req.region.clone(),
            size: req.size.clone(),
            image: req.image.clone(),
            tags: req.tags.clone(),
            created_at: Utc::now(),
            metadata: Default::default(),
        })
    }

    async fn get_server(&self, id: &str) -> Result<Server> {
        let app_name = id.split(':').next().unwrap_or(id);
        let resp = self
            .authed(self.client.get(format!("{}/apps/{}", API_BASE, app_name)))
            .send()
            .await
            .map_err(|e| Error::TransportError(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::ServerNotFound(id.to_string()));
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &body));
        }

        Ok(Server {
            id: id.to_string(),
            public_ip: format!("{}.fly.dev", app_name),
            private_ip: None,
            status: "active".into(),
            region: String::new(),
            size: String::new(),
            image: String::new(),
            tags: vec![],
            created_at: Utc::now(),
            metadata: Default::default(),
        })
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let app_name = id.split(':').next().unwrap_or(id);
        let resp = self
            .authed(self.client.delete(format!("{}/apps/{}", API_BASE, app_name)))
            .send()
            .await
            .map_err(|e| Error::TransportError(e.to_string()))?;

        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!("destroy cleanup returned HTTP {}: {}", status, body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_no_ssh_support() {
        let provider = FlyIoProvider::new("token".into());
        assert!(!provider.supports_ssh());
        assert!(!provider.supports_byos());
        assert!(provider.supports_provisioning());
    }
}
