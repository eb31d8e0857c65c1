use std::collections::HashMap;
use std::path::Path;

use crate::detect::Detection;
use crate::error::{Error, Result};
use crate::ssh::SshSession;

use super::{env, Release, RemoteLayout};

/// Upload a tarball built by `create_release_tarball`, verify its content
/// digest survived the trip, extract it with sudo into a fresh release
/// directory, then chown to `deploy:deploy`. Returns the absolute release
/// path (§4.5 `UploadRelease`, content-addressed integrity check per §1/§4.5
/// "content-addressed tarball creation").
pub async fn upload_release(
    session: &SshSession,
    layout: &RemoteLayout<'_>,
    release: &Release,
    tarball_path: &Path,
    expected_digest: &str,
) -> Result<String> {
    let release_path = layout.release_path(release);
    let remote_tmp = format!("/tmp/release-{}.tar.gz", release.timestamp);

    let bytes = std::fs::read(tarball_path)
        .map_err(|e| Error::TransportError(format!("failed to read tarball {}: {}", tarball_path.display(), e)))?;

    session
        .sudo_exec(&format!("mkdir -p {}", crate::ssh::exec::shell_quote(&release_path)))
        .await?;

    session.upload_bytes(&bytes, &remote_tmp, 0o644).await?;

    let digest_output = session
        .exec(&format!("sha256sum {} | awk '{{print $1}}'", crate::ssh::exec::shell_quote(&remote_tmp)))
        .await?;
    let remote_digest = digest_output.trim();
    if remote_digest != expected_digest {
        return Err(Error::TransportError(format!(
            "release tarball digest mismatch after upload: expected {}, remote reports {}",
            expected_digest, remote_digest
        )));
    }

    session
        .sudo_exec(&format!(
            "tar -xzf {} -C {} && rm -f {} && chown -R deploy:deploy {}",
            crate::ssh::exec::shell_quote(&remote_tmp),
            crate::ssh::exec::shell_quote(&release_path),
            crate::ssh::exec::shell_quote(&remote_tmp),
            crate::ssh::exec::shell_quote(&release_path),
        ))
        .await?;

    Ok(release_path)
}

/// Path prefix for the package-manager bootstrap rule: a command substring
/// match triggers a one-shot installer prefix (§9 "Package-manager
/// bootstrap injection").
fn adjust_build_command(cmd: &str, venv_path: &str) -> String {
    if cmd.contains("bun") && !cmd.starts_with("curl") {
        return format!("command -v bun >/dev/null 2>&1 || curl -fsSL https://bun.sh/install | bash; {}", cmd);
    }
    if cmd.contains("pnpm") {
        return format!("command -v pnpm >/dev/null 2>&1 || npm install -g pnpm; {}", cmd);
    }
    if cmd.contains("poetry") {
        return format!(
            "command -v poetry >/dev/null 2>&1 || curl -sSL https://install.python-poetry.org | python3 -; {}",
            cmd
        );
    }
    if cmd.contains("uv ") || cmd == "uv" {
        return format!("command -v uv >/dev/null 2>&1 || curl -LsSf https://astral.sh/uv/install.sh | sh; {}", cmd);
    }
    if cmd.contains("pipenv") {
        return format!("command -v pipenv >/dev/null 2>&1 || pip3 install --user pipenv; {}", cmd);
    }
    if let Some(rest) = cmd.strip_prefix("pip install") {
        return format!("{}/bin/pip install{}", venv_path, rest);
    }
    if let Some(rest) = cmd.strip_prefix("pip3 install") {
        return format!("{}/bin/pip install{}", venv_path, rest);
    }
    cmd.to_string()
}

/// Loads local env, merges, writes the release-scoped `.env` before
/// building, creates a Python venv if applicable, runs the build plan with
/// a computed `PATH`, and chowns the tree afterward (§4.5
/// `BuildReleaseWithEnv`). `build_command`, when set, replaces the detected
/// build plan entirely — the same override-beats-detection priority
/// `service::choose_exec_start` applies to the run command.
pub async fn build_release_with_env(
    session: &SshSession,
    layout: &RemoteLayout<'_>,
    project_root: &Path,
    release_path: &str,
    detection: &Detection,
    env_vars: &HashMap<String, String>,
    build_command: Option<&str>,
) -> Result<()> {
    let build_plan: Vec<String> = match build_command {
        Some(cmd) if !cmd.trim().is_empty() => vec![cmd.to_string()],
        _ => detection.build_plan.clone(),
    };

    if build_plan.is_empty() {
        return Ok(());
    }

    let local_env = env::load_local_env(project_root);
    let merged = env::merge_env(env_vars, local_env);

    let rendered = env::render_env_file(&merged);
    let release_env_path = format!("{}/.env", release_path);
    session.sudo_write_file(&release_env_path, &rendered).await?;
    session
        .sudo_exec(&format!("chmod 600 {}", crate::ssh::exec::shell_quote(&release_env_path)))
        .await?;

    let venv_path = layout.venv_path();
    if detection.language == "Python" {
        session
            .sudo_exec(&format!("python3 -m venv {}", crate::ssh::exec::shell_quote(&venv_path)))
            .await?;
    }

    for raw_cmd in &build_plan {
        let trimmed = raw_cmd.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let adjusted = adjust_build_command(trimmed, &venv_path);
        let full_cmd = format!(
            "cd {} && export PATH=\"/home/deploy/.bun/bin:/home/deploy/.local/share/pnpm:/usr/local/bin:$PATH\" && {}",
            crate::ssh::exec::shell_quote(release_path),
            adjusted
        );

        let output = session
            .execute_streaming_sudo(&full_cmd, std::io::stdout(), std::io::stderr())
            .await?;
        if !output.success() {
            return Err(Error::build_failed(
                trimmed,
                output.exit_code,
                format!("{}\n{}", output.stdout_tail(15), output.stderr_tail(15)),
            ));
        }
    }

    session
        .sudo_exec(&format!("chown -R deploy:deploy {}", crate::ssh::exec::shell_quote(release_path)))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_bun_bootstrap_prefix() {
        let adjusted = adjust_build_command("bun install", "/srv/app/shared/venv");
        assert!(adjusted.contains("bun.sh/install"));
        assert!(adjusted.ends_with("bun install"));
    }

    #[test]
    fn rewrites_pip_install_to_venv_scoped_pip() {
        let adjusted = adjust_build_command("pip install -r requirements.txt", "/srv/app/shared/venv");
        assert_eq!(adjusted, "/srv/app/shared/venv/bin/pip install -r requirements.txt");
    }

    #[test]
    fn leaves_unrelated_commands_untouched() {
        let adjusted = adjust_build_command("npm run build", "/srv/app/shared/venv");
        assert_eq!(adjusted, "npm run build");
    }
}
