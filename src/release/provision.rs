use std::time::Duration;

use crate::detect::Detection;
use crate::error::{Error, Result};
use crate::runtime;
use crate::ssh::SshSession;

use super::RemoteLayout;

/// Wait for the remote package manager's interactive lock to release
/// (cloud-init may still be running). First waits on `cloud-init
/// status --wait`, then polls the dpkg lock files (§4.5).
pub async fn wait_for_apt_lock(session: &SshSession, max_retries: u32, delay: Duration) -> Result<()> {
    let _ = session.execute("sudo cloud-init status --wait >/dev/null 2>&1 || true").await;

    for attempt in 0..=max_retries {
        let locked = session
            .exec_ok(
                "sudo fuser /var/lib/dpkg/lock-frontend /var/lib/apt/lists/lock >/dev/null 2>&1",
            )
            .await
            .unwrap_or(false);

        if !locked {
            return Ok(());
        }
        if attempt < max_retries {
            tokio::time::sleep(delay).await;
        }
    }

    Err(Error::Timeout {
        what: "apt lock to release".to_string(),
    })
}

/// Clean stale apt state, update, install the web proxy, then delegate to
/// C4 for the language runtime. Retried with attempt-proportional backoff.
pub async fn install_base_packages(session: &SshSession, detection: &Detection) -> Result<()> {
    let mut last_err = None;

    for attempt in 0..3u32 {
        let output = session
            .execute(
                "sudo rm -f /var/lib/dpkg/lock-frontend /var/lib/apt/lists/lock 2>/dev/null || true; \
                 sudo apt-get clean && sudo apt-get update -y && sudo apt-get install -y nginx",
            )
            .await?;

        if output.success() {
            return runtime::ensure_runtime_installed(session, detection).await;
        }

        last_err = Some(output.stderr_tail(15));
        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
    }

    Err(Error::RemoteCommandFailed {
        cmd: "apt-get install -y nginx".to_string(),
        exit_code: 1,
        stdout_tail: String::new(),
        stderr_tail: last_err.unwrap_or_default(),
    })
}

/// Idempotently create the remote layout from §3 and set ownership to
/// `deploy:deploy`.
pub async fn setup_directory_structure(session: &SshSession, layout: &RemoteLayout<'_>) -> Result<()> {
    let app_path = layout.app_path();
    session
        .sudo_exec(&format!(
            "mkdir -p {releases} {shared}/env {shared}/static {shared}/media {shared}/logs && \
             chown -R deploy:deploy {app}",
            releases = layout.releases_root(),
            shared = layout.shared_path(),
            app = app_path,
        ))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_used_by_setup_are_well_formed() {
        let layout = RemoteLayout { app_name: "widget" };
        assert_eq!(layout.releases_root(), "/srv/widget/releases");
        assert_eq!(layout.shared_path(), "/srv/widget/shared");
    }
}
