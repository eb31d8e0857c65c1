use crate::error::{Error, Result};
use crate::ssh::SshSession;

use super::{service, switch, RemoteLayout};

/// List releases newest-first (name sort equals chronological order,
/// §3/§8), via `ls` on the releases root.
pub async fn list_releases_newest_first(session: &SshSession, layout: &RemoteLayout<'_>) -> Result<Vec<String>> {
    let output = session
        .exec(&format!("ls -1 {} 2>/dev/null || true", layout.releases_root()))
        .await
        .unwrap_or_default();

    let mut releases: Vec<String> = output.lines().map(str::to_string).filter(|s| !s.is_empty()).collect();
    releases.sort_unstable_by(|a, b| b.cmp(a));
    Ok(releases)
}

/// Delete releases beyond the first `keep` (newest-first). Failures here
/// are warnings per the orchestrator's contract (§4.6 step 9), so this
/// returns `Ok` even when individual deletes fail — callers that need to
/// know should inspect the returned count against the pre-call listing.
pub async fn cleanup_old_releases(session: &SshSession, layout: &RemoteLayout<'_>, keep: usize) -> Result<usize> {
    let releases = list_releases_newest_first(session, layout).await?;
    let to_delete = releases.iter().skip(keep);

    let mut deleted = 0;
    for release in to_delete {
        let path = format!("{}/{}", layout.releases_root(), release);
        if session
            .sudo_exec(&format!("rm -rf {}", crate::ssh::exec::shell_quote(&path)))
            .await
            .is_ok()
        {
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Replay `StopService → SwitchRelease → StartService` against the
/// second-most-recent release.
pub async fn rollback_to_previous_release(session: &SshSession, layout: &RemoteLayout<'_>, app_name: &str) -> Result<String> {
    let releases = list_releases_newest_first(session, layout).await?;
    let previous = releases
        .get(1)
        .ok_or_else(|| Error::ServerNotFound("no previous release to roll back to".into()))?
        .clone();

    rollback_to_release(session, layout, app_name, &previous).await?;
    Ok(previous)
}

/// Verify `timestamp` exists among releases, then
/// `StopService → SwitchRelease → StartService`.
pub async fn rollback_to_release(session: &SshSession, layout: &RemoteLayout<'_>, app_name: &str, timestamp: &str) -> Result<()> {
    let releases = list_releases_newest_first(session, layout).await?;
    if !releases.iter().any(|r| r == timestamp) {
        return Err(Error::ServerNotFound(format!("release '{}' not found", timestamp)));
    }

    let release_path = format!("{}/{}", layout.releases_root(), timestamp);

    service::stop_service(session, app_name).await?;
    switch::switch_release(session, layout, &release_path).await?;
    service::start_service(session, app_name).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first_ordering_is_lexicographic_descending() {
        let mut releases = vec![
            "20260101000000".to_string(),
            "20260103000000".to_string(),
            "20260102000000".to_string(),
        ];
        releases.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(
            releases,
            vec!["20260103000000".to_string(), "20260102000000".to_string(), "20260101000000".to_string()]
        );
    }
}
