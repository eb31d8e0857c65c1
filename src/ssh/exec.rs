use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::error::{Error, Result};

use super::SshSession;

/// Result of a remote command: `{stdout, stderr, exit_code}`. A non-zero
/// exit is not a transport error (§4.1) — it's handed back as data for the
/// caller to interpret.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_tail(&self, lines: usize) -> String {
        tail_lines(&self.stdout, lines)
    }

    pub fn stderr_tail(&self, lines: usize) -> String {
        tail_lines(&self.stderr, lines)
    }
}

fn tail_lines(s: &str, n: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

impl SshSession {
    /// Open a fresh channel and run `cmd`, capturing stdout/stderr/exit
    /// code. Transport failures (channel open / io) surface as
    /// `Error::TransportError`; a non-zero exit does not.
    pub async fn execute(&self, cmd: &str) -> Result<CommandOutput> {
        debug!("[{}] exec: {}", self.host(), cmd);

        let output = self
            .session
            .command("bash")
            .arg("-c")
            .arg(cmd)
            .output()
            .await
            .map_err(|e| Error::TransportError(format!("exec failed on {}: {}", self.host(), e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// `execute` with `sudo -n` prepended — fails rather than prompting if
    /// the deploy user lacks passwordless sudo.
    pub async fn execute_sudo(&self, cmd: &str) -> Result<CommandOutput> {
        self.execute(&format!("sudo -n bash -c {}", shell_quote(cmd))).await
    }

    /// Like `execute`, but duplicates stdout/stderr to caller-supplied
    /// sinks line-by-line as output arrives, instead of buffering the whole
    /// command before replaying it (§4.1, §9 "streaming command output").
    /// Used by the build loop, where commands may emit megabytes.
    pub async fn execute_streaming<W1, W2>(
        &self,
        cmd: &str,
        mut stdout_sink: W1,
        mut stderr_sink: W2,
    ) -> Result<CommandOutput>
    where
        W1: std::io::Write,
        W2: std::io::Write,
    {
        debug!("[{}] exec (streaming): {}", self.host(), cmd);

        let mut child = self
            .session
            .command("bash")
            .arg("-c")
            .arg(cmd)
            .stdout(openssh::Stdio::piped())
            .stderr(openssh::Stdio::piped())
            .spawn()
            .await
            .map_err(|e| Error::TransportError(format!("exec (streaming) failed on {}: {}", self.host(), e)))?;

        let child_stdout = child
            .stdout()
            .take()
            .ok_or_else(|| Error::TransportError("streaming command has no stdout".into()))?;
        let child_stderr = child
            .stderr()
            .take()
            .ok_or_else(|| Error::TransportError("streaming command has no stderr".into()))?;

        // Two pipes must be drained concurrently, not sequentially — if the
        // remote command fills stderr while we're blocked reading stdout (or
        // vice versa), it deadlocks once the unread pipe's buffer is full.
        let stdout_task = async {
            let mut reader = BufReader::new(child_stdout);
            let mut collected = String::new();
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let _ = writeln!(stdout_sink, "{}", line.trim_end_matches('\n'));
                        collected.push_str(&line);
                    }
                }
            }
            collected
        };

        let stderr_task = async {
            let mut reader = BufReader::new(child_stderr);
            let mut collected = String::new();
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let _ = writeln!(stderr_sink, "{}", line.trim_end_matches('\n'));
                        collected.push_str(&line);
                    }
                }
            }
            collected
        };

        let (stdout, stderr) = tokio::join!(stdout_task, stderr_task);

        let status = child
            .wait()
            .await
            .map_err(|e| Error::TransportError(format!("streaming command wait failed on {}: {}", self.host(), e)))?;

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        })
    }

    /// `execute_streaming` with `sudo -n` prepended.
    pub async fn execute_streaming_sudo<W1, W2>(
        &self,
        cmd: &str,
        stdout_sink: W1,
        stderr_sink: W2,
    ) -> Result<CommandOutput>
    where
        W1: std::io::Write,
        W2: std::io::Write,
    {
        self.execute_streaming(&format!("sudo -n bash -c {}", shell_quote(cmd)), stdout_sink, stderr_sink)
            .await
    }

    /// Run `cmd`, returning stdout on success or `Error::RemoteCommandFailed`
    /// on non-zero exit. Most call sites want this rather than the raw
    /// `CommandOutput`.
    pub async fn exec(&self, cmd: &str) -> Result<String> {
        let result = self.execute(cmd).await?;
        if !result.success() {
            return Err(Error::RemoteCommandFailed {
                cmd: cmd.to_string(),
                exit_code: result.exit_code,
                stdout_tail: result.stdout_tail(15),
                stderr_tail: result.stderr_tail(15),
            });
        }
        Ok(result.stdout)
    }

    /// `exec` with `sudo -n` prepended.
    pub async fn sudo_exec(&self, cmd: &str) -> Result<String> {
        let result = self.execute_sudo(cmd).await?;
        if !result.success() {
            return Err(Error::RemoteCommandFailed {
                cmd: cmd.to_string(),
                exit_code: result.exit_code,
                stdout_tail: result.stdout_tail(15),
                stderr_tail: result.stderr_tail(15),
            });
        }
        Ok(result.stdout)
    }

    /// Run `cmd`, returning `Ok(true)` on exit 0, `Ok(false)` otherwise.
    pub async fn exec_ok(&self, cmd: &str) -> Result<bool> {
        Ok(self.execute(cmd).await?.success())
    }

    pub async fn path_exists(&self, path: &str) -> Result<bool> {
        self.exec_ok(&format!("test -e {}", shell_quote(path))).await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.upload_bytes(content.as_bytes(), path, 0o644).await
    }

    pub async fn sudo_write_file(&self, path: &str, content: &str) -> Result<()> {
        let tmp = format!("/tmp/.liftoff-upload-{}", uuid::Uuid::new_v4());
        self.upload_bytes(content.as_bytes(), &tmp, 0o644).await?;
        self.sudo_exec(&format!("mv {} {}", shell_quote(&tmp), shell_quote(path))).await?;
        Ok(())
    }

    /// Atomic cutover: `ln -sfn target link.tmp && mv -Tf link.tmp link`.
    /// The rename is the linearization point — readers never observe a
    /// half-switched symlink (§4.5).
    pub async fn atomic_symlink(&self, target: &str, link: &str) -> Result<()> {
        let tmp = format!("{}.tmp", link);
        self.exec(&format!(
            "ln -sfn {} {} && mv -Tf {} {}",
            shell_quote(target),
            shell_quote(&tmp),
            shell_quote(&tmp),
            shell_quote(link)
        ))
        .await?;
        Ok(())
    }
}

/// Single-quote a shell argument, escaping embedded single quotes.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_lines_keeps_only_last_n() {
        let s = (1..=20).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&s, 15);
        assert_eq!(tail.lines().count(), 15);
        assert_eq!(tail.lines().next(), Some("6"));
        assert_eq!(tail.lines().last(), Some("20"));
    }

    #[test]
    fn tail_lines_shorter_than_n_returns_all() {
        let s = "a\nb\nc";
        assert_eq!(tail_lines(s, 15), "a\nb\nc");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("plain"), "'plain'");
    }
}
