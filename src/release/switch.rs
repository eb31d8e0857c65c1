use std::time::Duration;

use crate::detect::Detection;
use crate::error::{Error, Result};
use crate::ssh::SshSession;

use super::{service, RemoteLayout};

/// Atomic cutover: `ln -sfn release current.tmp && mv -Tf current.tmp
/// current`. The rename is the linearization point — no caller ever
/// observes a half-switched symlink (§4.5, §9).
pub async fn switch_release(session: &SshSession, layout: &RemoteLayout<'_>, release_path: &str) -> Result<()> {
    session.atomic_symlink(release_path, &layout.current_symlink()).await
}

pub async fn current_release_path(session: &SshSession, layout: &RemoteLayout<'_>) -> Option<String> {
    session
        .exec(&format!("readlink -f {}", layout.current_symlink()))
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// If no health-check descriptor, succeeds immediately. Otherwise issues
/// `curl` through SSH against `http://127.0.0.1:8000<path>`, retrying up
/// to `max_retries` with `delay` between attempts.
pub async fn perform_health_check(
    session: &SshSession,
    detection: &Detection,
    max_retries: u32,
    delay: Duration,
) -> Result<bool> {
    let Some(health) = &detection.healthcheck else {
        return Ok(true);
    };

    let expected = health.expected_status.as_u64();
    let timeout = health.timeout_seconds.as_u64().max(1);
    let url = format!("http://127.0.0.1:8000{}", health.path);

    for attempt in 0..=max_retries {
        let cmd = format!(
            "curl -s -o /dev/null -w '%{{http_code}}' --max-time {} {}",
            timeout,
            crate::ssh::exec::shell_quote(&url)
        );
        if let Ok(output) = session.execute(&cmd).await {
            if output.stdout.trim() == expected.to_string() {
                return Ok(true);
            }
        }
        if attempt < max_retries {
            tokio::time::sleep(delay).await;
        }
    }

    Ok(false)
}

/// The composite atomic-deploy step (§4.5 `DeployWithHealthCheck`):
/// switch the symlink, (re)start the service, health-check, and roll back
/// to the prior release on failure.
pub async fn deploy_with_health_check(
    session: &SshSession,
    layout: &RemoteLayout<'_>,
    detection: &Detection,
    release_path: &str,
    app_name: &str,
    is_static: bool,
    retries: u32,
    delay: Duration,
) -> Result<()> {
    let previous = current_release_path(session, layout).await;

    switch_release(session, layout, release_path).await?;

    if is_static {
        super::proxy::reload_nginx(session).await?;
        return Ok(());
    }

    let first_deploy = previous.is_none();
    if first_deploy {
        service::start_service(session, app_name).await?;
    } else {
        let restarted = service::restart_service(session, app_name).await?;
        if !restarted {
            if let Some(prev) = &previous {
                let _ = switch_release(session, layout, prev).await;
                let _ = service::start_service(session, app_name).await;
            }
            return Err(Error::RemoteCommandFailed {
                cmd: format!("systemctl restart {}", app_name),
                exit_code: 1,
                stdout_tail: String::new(),
                stderr_tail: "service failed to restart on new release".into(),
            });
        }
    }

    let healthy = perform_health_check(session, detection, retries, delay).await?;
    if !healthy {
        match &previous {
            Some(prev) => {
                service::stop_service(session, app_name).await?;
                switch_release(session, layout, prev).await?;
                service::start_service(session, app_name).await?;
                return Err(Error::HealthCheckFailed { rolled_back: true });
            }
            None => {
                return Err(Error::HealthCheckFailed { rolled_back: false });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{HealthCheck, Number};

    #[test]
    fn health_check_descriptor_absent_means_success_path() {
        let detection = Detection {
            language: "Go".into(),
            framework: "".into(),
            meta: Default::default(),
            build_plan: vec![],
            run_plan: vec![],
            healthcheck: None,
        };
        assert!(detection.healthcheck.is_none());
    }

    #[test]
    fn healthcheck_numeric_fields_accept_ints() {
        let hc = HealthCheck {
            path: "/".into(),
            expected_status: Number(200.0),
            timeout_seconds: Number(30.0),
        };
        assert_eq!(hc.expected_status.as_u64(), 200);
        assert_eq!(hc.timeout_seconds.as_u64(), 30);
    }
}
