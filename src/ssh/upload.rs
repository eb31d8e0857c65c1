use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ssh::exec::shell_quote;

use super::SshSession;

impl SshSession {
    /// Stream `content` to `remote_path` via the classic `scp` sub-protocol:
    /// ensure the parent directory exists, spawn `scp -qt <dir>` as the
    /// remote command, and speak the wire format directly (`C<mode> <size>
    /// <basename>\n`, raw bytes, a single NUL, waiting for a zero-byte ack
    /// after each stage).
    pub async fn upload_bytes(&self, content: &[u8], remote_path: &str, mode: u32) -> Result<()> {
        let remote_path = remote_path.to_string();
        let parent = parent_dir(&remote_path);
        if !parent.is_empty() {
            self.exec(&format!("mkdir -p {}", shell_quote(&parent))).await?;
        }

        let basename = Path::new(&remote_path)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&remote_path)
            .to_string();

        debug!("[{}] upload {} bytes -> {}", self.host(), content.len(), remote_path);

        let dest_dir = if parent.is_empty() { "." } else { &parent };

        let mut child = self
            .session
            .command("scp")
            .arg("-qt")
            .raw_arg(&shell_quote(dest_dir))
            .stdin(openssh::Stdio::piped())
            .stdout(openssh::Stdio::piped())
            .spawn()
            .await
            .map_err(|e| Error::TransportError(format!("failed to spawn scp sink on {}: {}", self.host(), e)))?;

        let mut stdin = child
            .stdin()
            .take()
            .ok_or_else(|| Error::TransportError("scp sink has no stdin".into()))?;
        let mut stdout = child
            .stdout()
            .take()
            .ok_or_else(|| Error::TransportError("scp sink has no stdout".into()))?;

        let header = format!("C{:04o} {} {}\n", mode & 0o7777, content.len(), basename);

        let write_result: Result<()> = async {
            stdin
                .write_all(header.as_bytes())
                .await
                .map_err(|e| Error::TransportError(format!("scp header write failed: {}", e)))?;
            read_ack(&mut stdout).await?;

            stdin
                .write_all(content)
                .await
                .map_err(|e| Error::TransportError(format!("scp body write failed: {}", e)))?;
            stdin
                .write_all(&[0u8])
                .await
                .map_err(|e| Error::TransportError(format!("scp terminator write failed: {}", e)))?;
            read_ack(&mut stdout).await?;

            Ok(())
        }
        .await;

        drop(stdin);

        let status = child
            .wait()
            .await
            .map_err(|e| Error::TransportError(format!("scp sink wait failed: {}", e)))?;

        write_result?;

        if !status.success() {
            return Err(Error::TransportError(format!(
                "scp sink on {} exited with {:?}",
                self.host(),
                status.code()
            )));
        }

        Ok(())
    }

    /// Mustache-lite: replace every literal `{{KEY}}` in `template` with its
    /// substitution, then `upload_bytes` the result.
    pub async fn render_and_write_template(
        &self,
        template: &str,
        substitutions: &HashMap<String, String>,
        remote_path: &str,
        mode: u32,
    ) -> Result<()> {
        let rendered = render_mustache_lite(template, substitutions);
        self.upload_bytes(rendered.as_bytes(), remote_path, mode).await
    }
}

/// Replace every `{{KEY}}` occurrence with its value. Unknown keys are left
/// untouched rather than erroring — callers pass a superset context freely.
pub fn render_mustache_lite(template: &str, substitutions: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        match rest.find("{{") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + 2..];
                match after_open.find("}}") {
                    None => {
                        out.push_str(&rest[start..]);
                        break;
                    }
                    Some(end) => {
                        let key = after_open[..end].trim();
                        if let Some(value) = substitutions.get(key) {
                            out.push_str(value);
                        } else {
                            out.push_str(&rest[start..start + 2 + end + 2]);
                        }
                        rest = &after_open[end + 2..];
                    }
                }
            }
        }
    }

    out
}

fn parent_dir(remote_path: &str) -> String {
    match remote_path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => remote_path[..idx].to_string(),
        None => String::new(),
    }
}

/// Read a single SCP protocol ack byte: `0` success, `1`/`2` error (followed
/// by a human-readable line we surface in the error message).
async fn read_ack<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<()> {
    let mut byte = [0u8; 1];
    reader
        .read_exact(&mut byte)
        .await
        .map_err(|e| Error::TransportError(format!("scp ack read failed: {}", e)))?;

    match byte[0] {
        0 => Ok(()),
        1 | 2 => {
            let mut msg = Vec::new();
            let mut b = [0u8; 1];
            while reader.read_exact(&mut b).await.is_ok() {
                if b[0] == b'\n' {
                    break;
                }
                msg.push(b[0]);
            }
            Err(Error::TransportError(format!(
                "scp error: {}",
                String::from_utf8_lossy(&msg)
            )))
        }
        other => Err(Error::TransportError(format!("unexpected scp ack byte {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_keys() {
        let mut subs = HashMap::new();
        subs.insert("APP_NAME".to_string(), "widget".to_string());
        subs.insert("PORT".to_string(), "3000".to_string());

        let rendered = render_mustache_lite("app={{APP_NAME}} port={{PORT}}", &subs);
        assert_eq!(rendered, "app=widget port=3000");
    }

    #[test]
    fn leaves_unknown_keys_untouched() {
        let subs = HashMap::new();
        let rendered = render_mustache_lite("hello {{WHO}}", &subs);
        assert_eq!(rendered, "hello {{WHO}}");
    }

    #[test]
    fn tolerates_unterminated_braces() {
        let subs = HashMap::new();
        let rendered = render_mustache_lite("a {{ dangling", &subs);
        assert_eq!(rendered, "a {{ dangling");
    }

    #[test]
    fn parent_dir_handles_nested_and_root() {
        assert_eq!(parent_dir("/srv/app/current/env"), "/srv/app/current");
        assert_eq!(parent_dir("/top"), "/");
        assert_eq!(parent_dir("relative"), "");
    }
}
