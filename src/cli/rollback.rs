use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::TargetConfig;
use crate::output;
use crate::release::{prune, RemoteLayout};
use crate::ssh::SshSession;

pub async fn run(config: TargetConfig, release: Option<&str>) -> Result<()> {
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

    output::header(&format!("Rolling back {}", config.app.name));

    match release {
        Some(timestamp) => {
            prune::rollback_to_release(&session, &layout, &config.app.name, timestamp).await?;
            output::success(&format!("Rolled back to {}", timestamp));
        }
        None => {
            let target = prune::rollback_to_previous_release(&session, &layout, &config.app.name).await?;
            output::success(&format!("Rolled back to {}", target));
        }
    }

    session.close().await?;
    Ok(())
}
