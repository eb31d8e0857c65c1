//! Release Executor (C5) — the innermost subsystem (§4.5). Each operation
//! below is independently callable and idempotent unless noted; the
//! orchestrator (C6) composes them into the full deploy pipeline.

pub mod build;
pub mod env;
pub mod provision;
pub mod prune;
pub mod proxy;
pub mod service;
pub mod switch;
pub mod tarball;

use chrono::Utc;

/// A single deployable artifact identified by a 14-digit UTC timestamp
/// (§3 `Release`). The timestamp is strictly monotonic per app and sorts
/// lexicographically in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Release {
    pub timestamp: String,
}

impl Release {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now().format("%Y%m%d%H%M%S").to_string(),
        }
    }

    pub fn from_timestamp(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
        }
    }
}

impl Default for Release {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote paths for one app under the fixed base directory (§3 "Remote
/// layout"). Mirrors `TargetConfig`'s path helpers but scoped to a
/// specific release.
pub struct RemoteLayout<'a> {
    pub app_name: &'a str,
}

impl<'a> RemoteLayout<'a> {
    pub fn app_path(&self) -> String {
        format!("/srv/{}", self.app_name)
    }

    pub fn release_path(&self, release: &Release) -> String {
        format!("{}/releases/{}", self.app_path(), release.timestamp)
    }

    pub fn releases_root(&self) -> String {
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

    pub fn venv_path(&self) -> String {
        format!("{}/venv", self.shared_path())
    }

    pub fn configured_sentinel(&self) -> &'static str {
        "/etc/liftoff/configured"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_fourteen_digits() {
        let release = Release::new();
        assert_eq!(release.timestamp.len(), 14);
        assert!(release.timestamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn layout_paths_match_remote_convention() {
        let layout = RemoteLayout { app_name: "widget" };
        let release = Release::from_timestamp("20260101120000");

        assert_eq!(layout.app_path(), "/srv/widget");
        assert_eq!(layout.release_path(&release), "/srv/widget/releases/20260101120000");
        assert_eq!(layout.current_symlink(), "/srv/widget/current");
        assert_eq!(layout.env_file_path(), "/srv/widget/shared/env/.env");
    }

    #[test]
    fn ordering_is_lexicographic_and_chronological() {
        let a = Release::from_timestamp("20260101000000");
        let b = Release::from_timestamp("20260102000000");
        assert!(a < b);
    }
}
