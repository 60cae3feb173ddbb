//! Retry with exponential backoff for transient collaborator errors.

use crate::error::{ControllerError, ControllerResult};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            multiplier: 2.0,
        }
    }
}

pub trait RetryPolicy {
    fn should_retry(&self, error: &ControllerError) -> bool;
}

/// Retries only errors that originate outside the controller's own
/// invariants: external-system and transient-capacity failures.
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, error: &ControllerError) -> bool {
        matches!(error, ControllerError::ExternalSystem(_)) || error.is_transient_capacity()
    }
}

pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    policy: &dyn RetryPolicy,
    mut f: F,
) -> ControllerResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ControllerResult<T>>,
{
    let mut delay = Duration::from_millis(config.initial_delay_ms);
    let mut last_error: Option<ControllerError> = None;

    for attempt in 0..=config.max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let retry = attempt < config.max_retries && policy.should_retry(&e);
                last_error = Some(e);
                if retry {
                    sleep(delay).await;
                    delay = Duration::from_millis(
                        ((delay.as_millis() as f64 * config.multiplier) as u64)
                            .min(config.max_delay_ms),
                    );
                } else {
                    break;
                }
            }
        }
    }

    Err(last_error.unwrap_or(ControllerError::Unexpected))
}
