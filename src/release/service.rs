use std::collections::HashMap;

use crate::detect::Detection;
use crate::error::Result;
use crate::ssh::SshSession;

use super::RemoteLayout;

const SYSTEMD_UNIT_TEMPLATE: &str = include_str!("../../templates/systemd_unit.service.j2");

/// Known package-manager commands whose absolute install path must be
/// substituted in, since systemd doesn't inherit the deploy user's shell
/// PATH (§4.5 "package-manager path rewriting").
fn package_manager_absolute_path(name: &str) -> Option<&'static str> {
    match name {
        "bun" => Some("/home/deploy/.bun/bin/bun"),
        "pnpm" => Some("/home/deploy/.local/share/pnpm/pnpm"),
        "npm" => Some("/usr/bin/npm"),
        "yarn" => Some("/usr/bin/yarn"),
        _ => None,
    }
}

/// Fallback `ExecStart` when the run plan is empty, keyed by
/// `(language, framework)` (§4.5 framework-default table).
fn default_exec_start(layout: &RemoteLayout<'_>, language: &str, framework: &str) -> String {
    let venv = layout.venv_path();
    let app = layout.app_path();
    match (language, framework) {
        ("Python", "Django") => format!("{}/bin/gunicorn --bind 127.0.0.1:8000 --workers 2 wsgi:application", venv),
        ("Python", "FastAPI") => format!("{}/bin/uvicorn main:app --host 127.0.0.1 --port 8000 --workers 2", venv),
        ("Python", "Flask") => format!("{}/bin/gunicorn --bind 127.0.0.1:8000 --workers 2 app:app", venv),
        ("JavaScript/TypeScript", "Next.js") => format!("/usr/bin/node {}/current/.next/standalone/server.js", app),
        ("JavaScript/TypeScript", "Express.js") => format!("/usr/bin/node {}/current/server.js", app),
        ("JavaScript/TypeScript", "NestJS") => format!("/usr/bin/node {}/current/dist/main.js", app),
        ("Go", _) => format!("{}/current/app --port 8000", app),
        ("Ruby", "Rails") => format!("{}/shared/bundle/bin/puma -C {}/current/config/puma.rb", app, app),
        _ => "/usr/bin/true".to_string(),
    }
}

/// Rewrite the first token of a run-plan command to the package manager's
/// absolute path when it names a known manager.
fn rewrite_run_command(cmd: &str) -> String {
    let mut parts = cmd.splitn(2, ' ');
    let Some(first) = parts.next() else {
        return cmd.to_string();
    };
    let rest = parts.next().unwrap_or("");

    match package_manager_absolute_path(first) {
        Some(abs) if rest.is_empty() => abs.to_string(),
        Some(abs) => format!("{} {}", abs, rest),
        None => cmd.to_string(),
    }
}

/// Choose `EXEC_START`: explicit `start_command` (from a builder plugin) >
/// first run-plan entry > framework default table.
pub fn choose_exec_start(
    layout: &RemoteLayout<'_>,
    detection: &Detection,
    start_command: Option<&str>,
) -> String {
    if let Some(cmd) = start_command {
        return rewrite_run_command(cmd);
    }
    if let Some(first) = detection.run_plan.first() {
        return rewrite_run_command(first);
    }
    default_exec_start(layout, &detection.language, &detection.framework)
}

/// Render and install the systemd unit, then `daemon-reload`. Skipped
/// entirely for static-site deployments by the caller.
pub async fn generate_systemd_unit(
    session: &SshSession,
    layout: &RemoteLayout<'_>,
    app_name: &str,
    exec_start: &str,
) -> Result<()> {
    let mut substitutions = HashMap::new();
    substitutions.insert("APP_NAME".to_string(), app_name.to_string());
    substitutions.insert("EXEC_START".to_string(), exec_start.to_string());
    substitutions.insert("WORKING_DIRECTORY".to_string(), layout.current_symlink());
    substitutions.insert("ENVIRONMENT_FILE".to_string(), layout.env_file_path());

    let tmp = format!("/tmp/{}.service", app_name);
    session
        .render_and_write_template(SYSTEMD_UNIT_TEMPLATE, &substitutions, &tmp, 0o644)
        .await?;

    let dest = format!("/etc/systemd/system/{}.service", app_name);
    session
        .sudo_exec(&format!(
            "mv {} {} && chown root:root {} && systemctl daemon-reload",
            crate::ssh::exec::shell_quote(&tmp),
            crate::ssh::exec::shell_quote(&dest),
            crate::ssh::exec::shell_quote(&dest),
        ))
        .await?;

    Ok(())
}

pub async fn enable_service(session: &SshSession, app_name: &str) -> Result<()> {
    session.sudo_exec(&format!("systemctl enable {}", app_name)).await?;
    Ok(())
}

pub async fn start_service(session: &SshSession, app_name: &str) -> Result<()> {
    session.sudo_exec(&format!("systemctl start {}", app_name)).await?;
    Ok(())
}

pub async fn restart_service(session: &SshSession, app_name: &str) -> Result<bool> {
    Ok(session.execute_sudo(&format!("systemctl restart {}", app_name)).await?.success())
}

pub async fn stop_service(session: &SshSession, app_name: &str) -> Result<()> {
    let _ = session.sudo_exec(&format!("systemctl stop {} || true", app_name)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RemoteLayout<'static> {
        RemoteLayout { app_name: "widget" }
    }

    fn detection_with_run_plan(plan: Vec<&str>) -> Detection {
        Detection {
            language: "JavaScript/TypeScript".into(),
            framework: "".into(),
            meta: Default::default(),
            build_plan: vec![],
            run_plan: plan.into_iter().map(String::from).collect(),
            healthcheck: None,
        }
    }

    #[test]
    fn rewrites_bun_run_plan_to_absolute_path() {
        let detection = detection_with_run_plan(vec!["bun run start"]);
        let exec_start = choose_exec_start(&layout(), &detection, None);
        assert_eq!(exec_start, "/home/deploy/.bun/bin/bun run start");
    }

    #[test]
    fn explicit_start_command_wins_over_run_plan() {
        let detection = detection_with_run_plan(vec!["node server.js"]);
        let exec_start = choose_exec_start(&layout(), &detection, Some("pnpm start"));
        assert!(exec_start.starts_with("/home/deploy/.local/share/pnpm/pnpm"));
    }

    #[test]
    fn falls_back_to_framework_default_table() {
        let detection = Detection {
            language: "Python".into(),
            framework: "FastAPI".into(),
            meta: Default::default(),
            build_plan: vec![],
            run_plan: vec![],
            healthcheck: None,
        };
        let exec_start = choose_exec_start(&layout(), &detection, None);
        assert!(exec_start.contains("uvicorn main:app"));
    }

    #[test]
    fn unknown_language_falls_back_to_true() {
        let detection = Detection {
            language: "COBOL".into(),
            framework: "".into(),
            meta: Default::default(),
            build_plan: vec![],
            run_plan: vec![],
            healthcheck: None,
        };
        assert_eq!(choose_exec_start(&layout(), &detection, None), "/usr/bin/true");
    }
}
