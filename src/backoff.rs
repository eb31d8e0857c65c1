//! Shared exponential-backoff utility (§2 C2, §9 "factor the
//! exponential-backoff loop into one utility consumed by both driver API
//! calls and delete-security-group retry; keep it side-effect-free except
//! for sleeping").

use std::time::Duration;

use crate::error::{Error, RetryClass};

const BASE: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 5;

/// Run `f` under a bounded exponential backoff. Retries only on
/// `RetryClass::Retryable` errors; `Quota`/`Auth`/`Fatal` errors return
/// immediately so callers don't burn attempts on errors retrying can't fix.
pub async fn retry<F, Fut, T>(mut f: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_RETRIES && err.classify() == RetryClass::Retryable => {
                let delay = delay_for_attempt(attempt);
                tracing::debug!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying after retryable error: {}",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn delay_for_attempt(attempt: u32) -> Duration {
    let scaled = BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    scaled.min(CAP)
}

/// Poll `f` every `interval` until it returns `Some(_)` or `deadline` elapses.
pub async fn poll_until<F, Fut, T>(
    interval: Duration,
    deadline: Duration,
    what: impl Into<String>,
    mut f: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, Error>>,
{
    let what = what.into();
    let start = tokio::time::Instant::now();
    loop {
        if let Some(value) = f().await? {
            return Ok(value);
        }
        if start.elapsed() >= deadline {
            return Err(Error::Timeout { what });
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_then_caps() {
        assert_eq!(delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(delay_for_attempt(5), Duration::from_secs(30));
        assert_eq!(delay_for_attempt(20), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn retry_stops_on_non_retryable() {
        let mut calls = 0;
        let result = retry(|| {
            calls += 1;
            async {
                Err::<(), Error>(Error::AuthFailed {
                    message: "nope".into(),
                    next_steps: "check token".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_exhausts_after_max_attempts() {
        let mut calls = 0;
        let result = retry(|| {
            calls += 1;
            async { Err::<(), Error>(Error::TransportError("reset".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, (MAX_RETRIES + 1) as usize);
    }
}
