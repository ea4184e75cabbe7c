use std::time::Duration;

use crate::services::oracle::OracleError;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(1000),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryConfig {
    pub fn with_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Single try, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }
}

/// Retries only idempotent learning API calls, and only while the failure is
/// transient.
pub async fn retry_transient<F, Fut, T>(config: RetryConfig, f: F) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, OracleError>>,
{
    retry_async_when(config, OracleError::is_transient, f).await
}

pub async fn retry_async_when<F, Fut, T, E, P>(
    config: RetryConfig,
    should_retry: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = config.max_attempts;
    let mut backoff = config.base_backoff;

    loop {
        let res = f().await;
        match res {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 || !should_retry(&e) {
                    return Err(e);
                }

                // apply jitter
                if let Some(jitter_max) = config.jitter_max {
                    let jitter_ms = jitter_max.as_millis() as u64;
                    let extra = if jitter_ms == 0 {
                        0
                    } else {
                        rand::random::<u64>() % (jitter_ms + 1)
                    };
                    tokio::time::sleep(backoff + Duration::from_millis(extra)).await;
                } else {
                    tokio::time::sleep(backoff).await;
                }

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}
