//! Circuit breaker for calls into external collaborators (accounting,
//! topology plugins) so a stuck dependency never blocks the scheduling
//! pipeline.

use crate::error::{ControllerError, ControllerResult};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: RwLock<u32>,
    success_count: RwLock<u32>,
    last_failure: RwLock<Option<Instant>>,
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: RwLock::new(0),
            success_count: RwLock::new(0),
            last_failure: RwLock::new(None),
            failure_threshold,
            success_threshold: 3,
            timeout,
        }
    }

    pub async fn execute<F, Fut, T>(&self, operation: F) -> ControllerResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ControllerResult<T>>,
    {
        let state = *self.state.read().await;
        match state {
            CircuitState::Open => {
                let last_failure = *self.last_failure.read().await;
                match last_failure {
                    Some(last) if last.elapsed() >= self.timeout => {
                        *self.state.write().await = CircuitState::HalfOpen;
                        *self.success_count.write().await = 0;
                    }
                    _ => {
                        return Err(ControllerError::ExternalSystem(
                            "circuit breaker open".to_string(),
                        ))
                    }
                }
            }
            CircuitState::HalfOpen | CircuitState::Closed => {}
        }

        match operation().await {
            Ok(result) => {
                *self.failure_count.write().await = 0;
                if *self.state.read().await == CircuitState::HalfOpen {
                    let mut success_count = self.success_count.write().await;
                    *success_count += 1;
                    if *success_count >= self.success_threshold {
                        *self.state.write().await = CircuitState::Closed;
                        *success_count = 0;
                    }
                }
                Ok(result)
            }
            Err(e) => {
                let mut failure_count = self.failure_count.write().await;
                *failure_count += 1;
                *self.last_failure.write().await = Some(Instant::now());
                if *failure_count >= self.failure_threshold {
                    *self.state.write().await = CircuitState::Open;
                }
                Err(e)
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(50));
        for _ in 0..2 {
            let _ = breaker
                .execute(|| async { Err::<(), _>(ControllerError::ExternalSystem("boom".to_string())) })
                .await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn half_opens_after_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        let _ = breaker
            .execute(|| async { Err::<(), _>(ControllerError::ExternalSystem("boom".to_string())) })
            .await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = breaker.execute(|| async { Ok::<_, ControllerError>(1) }).await;
        assert!(result.is_ok());
    }
}
