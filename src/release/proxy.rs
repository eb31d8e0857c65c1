use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ssh::SshSession;

const NGINX_SSR_TEMPLATE: &str = include_str!("../../templates/nginx_ssr.conf.j2");
const NGINX_STATIC_TEMPLATE: &str = include_str!("../../templates/nginx_static.conf.j2");

/// Install the proxy config for `app_name`. If `domain` is empty the
/// entire stage is a no-op (§4.5). `static_root` is `Some(path)` for
/// static-site deployments, `None` for SSR (proxied to `port`).
pub async fn generate_nginx_config(
    session: &SshSession,
    app_name: &str,
    domain: &str,
    port: u16,
    static_root: Option<&str>,
) -> Result<()> {
    if domain.is_empty() {
        return Ok(());
    }

    let mut substitutions = HashMap::new();
    substitutions.insert("DOMAIN".to_string(), domain.to_string());

    let rendered = if let Some(root) = static_root {
        substitutions.insert("ROOT".to_string(), root.to_string());
        NGINX_STATIC_TEMPLATE
    } else {
        substitutions.insert("PORT".to_string(), port.to_string());
        NGINX_SSR_TEMPLATE
    };

    let tmp = format!("/tmp/{}.nginx.conf", app_name);
    session.render_and_write_template(rendered, &substitutions, &tmp, 0o644).await?;

    let available = format!("/etc/nginx/sites-available/{}", app_name);
    let enabled = format!("/etc/nginx/sites-enabled/{}", app_name);

    session
        .sudo_exec(&format!(
            "mv {} {} && ln -sfn {} {} && rm -f /etc/nginx/sites-enabled/default",
            crate::ssh::exec::shell_quote(&tmp),
            crate::ssh::exec::shell_quote(&available),
            crate::ssh::exec::shell_quote(&available),
            crate::ssh::exec::shell_quote(&enabled),
        ))
        .await?;

    Ok(())
}

pub async fn test_nginx_config(session: &SshSession) -> Result<()> {
    let output = session.execute_sudo("nginx -t").await?;
    if !output.success() {
        return Err(Error::RemoteCommandFailed {
            cmd: "nginx -t".to_string(),
            exit_code: output.exit_code,
            stdout_tail: output.stdout_tail(15),
            stderr_tail: output.stderr_tail(15),
        });
    }
    Ok(())
}

pub async fn reload_nginx(session: &SshSession) -> Result<()> {
    session.sudo_exec("systemctl reload nginx").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssr_template_references_proxy_pass() {
        assert!(NGINX_SSR_TEMPLATE.contains("proxy_pass"));
        assert!(NGINX_SSR_TEMPLATE.contains("{{PORT}}"));
    }

    #[test]
    fn static_template_references_try_files() {
        assert!(NGINX_STATIC_TEMPLATE.contains("try_files"));
        assert!(NGINX_STATIC_TEMPLATE.contains("{{ROOT}}"));
    }
}
