//! Typed error surface for the core (§7 of the spec this crate implements).
//!
//! Library code returns `Error` so callers can match on kind; CLI code
//! wraps everything in `anyhow` for display, same split the teacher draws
//! between its module errors and `main.rs`.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid credentials for provider '{provider}'")]
    InvalidCredentials { provider: String },

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("server already provisioned (id={server_id}, ip={ip})")]
    ServerAlreadyProvisioned { server_id: String, ip: String },

    #[error("server '{0}' not found")]
    ServerNotFound(String),

    #[error("timed out waiting for {what}")]
    Timeout { what: String },

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("command failed (exit {exit_code}): {cmd}\nstdout: {stdout_tail}\nstderr: {stderr_tail}")]
    RemoteCommandFailed {
        cmd: String,
        exit_code: i32,
        stdout_tail: String,
        stderr_tail: String,
    },

    #[error("{message}")]
    BuildFailed {
        cmd: String,
        exit_code: i32,
        output: String,
        oom_suspected: bool,
        message: String,
    },

    #[error("could not reconcile runtime for {language} at stage '{stage}': {command_result}")]
    RuntimeInstallFailed {
        language: String,
        stage: String,
        command_result: String,
    },

    #[error("health check never observed expected status (rolled back: {rolled_back})")]
    HealthCheckFailed { rolled_back: bool },

    #[error("quota exceeded: {message}. {next_steps}")]
    QuotaExceeded { message: String, next_steps: String },

    #[error("rate limited: {message}. {next_steps}")]
    RateLimited { message: String, next_steps: String },

    #[error("authentication failed: {message}. {next_steps}")]
    AuthFailed { message: String, next_steps: String },

    #[error("permission denied: {message}. {next_steps}")]
    PermissionDenied { message: String, next_steps: String },

    #[error("builder '{0}' is not supported by this build")]
    BuilderNotSupported(String),
}

impl Error {
    /// Build a `BuildFailed` error, classifying OOM kills by exit code
    /// (137/143, signal-kill convention) or a "Killed" substring in output.
    pub fn build_failed(cmd: impl Into<String>, exit_code: i32, output: impl Into<String>) -> Self {
        let cmd = cmd.into();
        let output = output.into();
        let oom_suspected =
            matches!(exit_code, 137 | 143) || output.contains("Killed");

        let message = if oom_suspected {
            format!(
                "build command '{cmd}' failed (exit {exit_code}): insufficient memory (OOM). \
                 Increase server memory or reduce parallel build workers.\n{output}"
            )
        } else {
            format!("build command '{cmd}' failed (exit {exit_code}):\n{output}")
        };

        Error::BuildFailed {
            cmd,
            exit_code,
            output,
            oom_suspected,
            message,
        }
    }

    /// Classification used by the shared backoff utility (§2 C2 retry discipline).
    pub fn classify(&self) -> RetryClass {
        match self {
            Error::RateLimited { .. } => RetryClass::Retryable,
            Error::TransportError(_) => RetryClass::Retryable,
            Error::QuotaExceeded { .. } => RetryClass::Quota,
            Error::AuthFailed { .. } | Error::InvalidCredentials { .. } => RetryClass::Auth,
            _ => RetryClass::Fatal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Quota,
    Auth,
    Fatal,
}

impl fmt::Display for RetryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetryClass::Retryable => "retryable",
            RetryClass::Quota => "quota",
            RetryClass::Auth => "auth",
            RetryClass::Fatal => "fatal",
        };
        write!(f, "{}", s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
