use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::TargetConfig;
use crate::output;
use crate::release::{prune, RemoteLayout};
use crate::ssh::SshSession;

pub async fn run(config: TargetConfig) -> Result<()> {
    let layout = RemoteLayout {
        app_name: &config.app.name,
    };

    let key_path = PathBuf::from(config.provider.ssh_key_path.clone().unwrap_or_default());
    let session = SshSession::connect(
        &config.provider.username,
        &config.provider.ip,
        None,
        &key_path,
        5,
        Duration::from_secs(5),
    )
    .await
    .context("failed to connect to deployment target")?;

    output::header(&format!("Releases for {}", config.app.name));

    let releases = prune::list_releases_newest_first(&session, &layout).await?;
    let current = session
        .exec(&format!("readlink -f {} 2>/dev/null || true", layout.current_symlink()))
        .await
        .unwrap_or_default();
    let current = current.trim().rsplit('/').next().unwrap_or("").to_string();

    if releases.is_empty() {
        output::warning("No releases found");
    } else {
        for release in &releases {
            if *release == current {
                println!("  {} ← current", release);
            } else {
                println!("  {}", release);
            }
        }
    }

    session.close().await?;
    Ok(())
}
