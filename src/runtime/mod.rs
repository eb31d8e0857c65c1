//! Runtime Installer (C4): idempotent install of a language runtime +
//! secondary package manager on the remote host, keyed on the detected
//! language (§4.4).

use crate::detect::Detection;
use crate::error::{Error, Result};
use crate::ssh::SshSession;

const NODE_VERSION: &str = "20.11.1";
const GO_VERSION: &str = "1.22.0";

/// Minimum acceptable runtime version per language, used to decide whether
/// the distro-packaged runtime is good enough or needs replacing.
fn minimum_version(language: &str) -> &'static str {
    match language {
        "JavaScript/TypeScript" => "18.0.0",
        "Python" => "3.9.0",
        "Go" => "1.20.0",
        _ => "0.0.0",
    }
}

pub async fn ensure_runtime_installed(session: &SshSession, detection: &Detection) -> Result<()> {
    match detection.language.as_str() {
        "JavaScript/TypeScript" => ensure_node(session).await?,
        "Python" => ensure_python(session).await?,
        "Go" => ensure_go(session).await?,
        "Ruby" => ensure_ruby(session).await?,
        _ => {}
    }

    match detection.package_manager() {
        "bun" => install_bun(session).await?,
        "pnpm" => install_pnpm(session).await?,
        "yarn" => install_yarn(session).await?,
        "poetry" => install_poetry(session).await?,
        "pipenv" => install_pipenv(session).await?,
        "uv" => install_uv(session).await?,
        _ => {}
    }

    Ok(())
}

async fn current_version(session: &SshSession, probe: &str) -> Option<String> {
    session.exec(probe).await.ok().map(|s| s.trim().to_string())
}

fn version_satisfies(current: &str, minimum: &str) -> bool {
    let parse = |s: &str| -> Vec<u32> {
        s.trim_start_matches(|c: char| !c.is_ascii_digit())
            .split('.')
            .filter_map(|p| p.chars().take_while(|c| c.is_ascii_digit()).collect::<String>().parse().ok())
            .collect()
    };
    parse(current) >= parse(minimum)
}

async fn ensure_node(session: &SshSession) -> Result<()> {
    let min = minimum_version("JavaScript/TypeScript");
    if let Some(v) = current_version(session, "node --version 2>/dev/null").await {
        if version_satisfies(&v, min) {
            let _ = session.sudo_exec("ln -sf $(which node) /usr/bin/node || true").await;
            let _ = session.sudo_exec("ln -sf $(which npm) /usr/bin/npm || true").await;
            return Ok(());
        }
    }

    let cmd = format!(
        "sudo apt-get remove -y nodejs npm >/dev/null 2>&1 || true; \
         curl -fsSL https://nodejs.org/dist/v{v}/node-v{v}-linux-x64.tar.xz -o /tmp/node.tar.xz && \
         sudo tar -xJf /tmp/node.tar.xz -C /usr/local --strip-components=1 && \
         sudo ln -sf /usr/local/bin/node /usr/bin/node && \
         sudo ln -sf /usr/local/bin/npm /usr/bin/npm",
        v = NODE_VERSION
    );

    let output = session.execute(&cmd).await?;
    if !output.success() {
        return Err(Error::RuntimeInstallFailed {
            language: "JavaScript/TypeScript".into(),
            stage: "install".into(),
            command_result: output.stderr_tail(15),
        });
    }
    Ok(())
}

async fn ensure_python(session: &SshSession) -> Result<()> {
    let output = session
        .execute(
            "sudo apt-get update -y >/dev/null 2>&1 || true; \
             sudo apt-get install -y python3 python3-venv python3-pip >/dev/null 2>&1",
        )
        .await?;
    if !output.success() {
        return Err(Error::RuntimeInstallFailed {
            language: "Python".into(),
            stage: "install".into(),
            command_result: output.stderr_tail(15),
        });
    }
    Ok(())
}

async fn ensure_go(session: &SshSession) -> Result<()> {
    let min = minimum_version("Go");
    if let Some(v) = current_version(session, "go version 2>/dev/null | awk '{print $3}' | tr -d 'go'").await {
        if version_satisfies(&v, min) {
            return Ok(());
        }
    }

    let cmd = format!(
        "sudo rm -rf /usr/local/go && \
         curl -fsSL https://go.dev/dl/go{v}.linux-amd64.tar.gz -o /tmp/go.tar.gz && \
         sudo tar -C /usr/local -xzf /tmp/go.tar.gz && \
         sudo ln -sf /usr/local/go/bin/go /usr/bin/go",
        v = GO_VERSION
    );

    let output = session.execute(&cmd).await?;
    if !output.success() {
        return Err(Error::RuntimeInstallFailed {
            language: "Go".into(),
            stage: "install".into(),
            command_result: output.stderr_tail(15),
        });
    }
    Ok(())
}

async fn ensure_ruby(session: &SshSession) -> Result<()> {
    let output = session
        .execute("sudo apt-get install -y ruby-full build-essential >/dev/null 2>&1")
        .await?;
    if !output.success() {
        return Err(Error::RuntimeInstallFailed {
            language: "Ruby".into(),
            stage: "install".into(),
            command_result: output.stderr_tail(15),
        });
    }
    Ok(())
}

async fn install_bun(session: &SshSession) -> Result<()> {
    let _ = session
        .execute("command -v bun >/dev/null 2>&1 || curl -fsSL https://bun.sh/install | bash || true")
        .await?;
    Ok(())
}

async fn install_pnpm(session: &SshSession) -> Result<()> {
    let _ = session
        .execute("command -v pnpm >/dev/null 2>&1 || npm install -g pnpm || true")
        .await?;
    Ok(())
}

async fn install_yarn(session: &SshSession) -> Result<()> {
    let _ = session
        .execute("command -v yarn >/dev/null 2>&1 || npm install -g yarn || true")
        .await?;
    Ok(())
}

async fn install_poetry(session: &SshSession) -> Result<()> {
    let _ = session
        .execute("command -v poetry >/dev/null 2>&1 || curl -sSL https://install.python-poetry.org | python3 - || true")
        .await?;
    Ok(())
}

async fn install_pipenv(session: &SshSession) -> Result<()> {
    let _ = session
        .execute("command -v pipenv >/dev/null 2>&1 || pip3 install --user pipenv || true")
        .await?;
    Ok(())
}

async fn install_uv(session: &SshSession) -> Result<()> {
    let _ = session
        .execute("command -v uv >/dev/null 2>&1 || curl -LsSf https://astral.sh/uv/install.sh | sh || true")
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_satisfies_handles_simple_semver() {
        assert!(version_satisfies("20.11.1", "18.0.0"));
        assert!(!version_satisfies("16.2.0", "18.0.0"));
        assert!(version_satisfies("v20.11.1", "18.0.0"));
    }

    #[test]
    fn minimum_version_table_has_entries_for_known_languages() {
        assert_eq!(minimum_version("Python"), "3.9.0");
        assert_eq!(minimum_version("Go"), "1.20.0");
        assert_eq!(minimum_version("COBOL"), "0.0.0");
    }
}
