use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::TargetConfig;
use crate::ssh::SshSession;

pub async fn run(config: TargetConfig, lines: usize, follow: bool) -> Result<()> {
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

    let mut cmd = format!(
        "journalctl -u {} -n {} --no-pager",
        crate::ssh::exec::shell_quote(&config.app.name),
        lines
    );
    if follow {
        cmd.push_str(" -f");
    }

    let output = session.sudo_exec(&cmd).await.context("failed to read service logs")?;
    print!("{}", output);

    session.close().await?;
    Ok(())
}
