pub mod exec;
pub mod upload;

use std::path::Path;
use std::time::Duration;

use openssh::{KnownHosts, Session, SessionBuilder};
use tracing::debug;

use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A session bound to `(host, port, username, private_key_path)`. Not safe
/// for concurrent use — callers serialize operations (§4.1).
pub struct SshSession {
    session: Session,
    host: String,
}

impl SshSession {
    /// Connect with up to `retries + 1` attempts, a fixed `delay` between
    /// them. Host-key verification is skipped (trust-on-first-use; see the
    /// open question in §9 about pinning after provisioning).
    pub async fn connect(
        user: &str,
        host: &str,
        port: Option<u16>,
        key_path: &Path,
        retries: u32,
        delay: Duration,
    ) -> Result<Self> {
        let expanded_key = expand_tilde(key_path);
        let mut last_err = None;

        for attempt in 0..=retries {
            debug!(attempt, "connecting to {}@{}", user, host);

            let mut builder = SessionBuilder::default();
            builder.known_hosts_check(KnownHosts::Accept);
            builder.user(user.to_string());
            builder.keyfile(&expanded_key);
            builder.connect_timeout(CONNECT_TIMEOUT);

            if let Some(port) = port {
                builder.port(port);
            }

            match builder.connect(host).await {
                Ok(session) => {
                    return Ok(Self {
                        session,
                        host: host.to_string(),
                    })
                }
                Err(err) => {
                    debug!("connect attempt {} failed: {}", attempt, err);
                    last_err = Some(err.to_string());
                    if attempt < retries {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(Error::TransportError(format!(
            "failed to connect to {}@{} after {} attempt(s): {}",
            user,
            host,
            retries + 1,
            last_err.unwrap_or_default()
        )))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn close(self) -> Result<()> {
        self.session
            .close()
            .await
            .map_err(|e| Error::TransportError(format!("failed to close session to {}: {}", self.host, e)))?;
        Ok(())
    }
}

fn expand_tilde(path: &Path) -> std::path::PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return std::path::PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_rewrites_home_prefix() {
        std::env::set_var("HOME", "/home/deploy");
        assert_eq!(
            expand_tilde(Path::new("~/.ssh/id_ed25519")),
            std::path::PathBuf::from("/home/deploy/.ssh/id_ed25519")
        );
        assert_eq!(
            expand_tilde(Path::new("/abs/path")),
            std::path::PathBuf::from("/abs/path")
        );
    }
}
