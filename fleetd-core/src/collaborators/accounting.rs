//! Best-effort accounting sink wrapped in a circuit breaker: a stuck or
//! failing accounting backend must never stall job admission.

use super::AccountingSink;
use crate::error::ControllerResult;
use crate::model::Job;
use crate::resilience::CircuitBreaker;
use async_trait::async_trait;
use std::time::Duration;

/// No-op accounting sink: logs and returns success, used when no external
/// accounting backend is configured.
pub struct NullAccountingSink;

#[async_trait]
impl AccountingSink for NullAccountingSink {
    async fn record_job_start(&self, job: &Job) -> ControllerResult<()> {
        tracing::debug!(job_id = job.id, "accounting: job start (no-op sink)");
        Ok(())
    }

    async fn record_job_end(&self, job: &Job) -> ControllerResult<()> {
        tracing::debug!(job_id = job.id, "accounting: job end (no-op sink)");
        Ok(())
    }
}

/// Wraps any [`AccountingSink`] with a circuit breaker so repeated failures
/// against a down accounting backend degrade to logged drops instead of
/// error propagation into the scheduling pipeline.
pub struct GuardedAccountingSink<S: AccountingSink> {
    inner: S,
    breaker: CircuitBreaker,
}

impl<S: AccountingSink> GuardedAccountingSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(5, Duration::from_secs(30)),
        }
    }
}

#[async_trait]
impl<S: AccountingSink> AccountingSink for GuardedAccountingSink<S> {
    async fn record_job_start(&self, job: &Job) -> ControllerResult<()> {
        if self.breaker.execute(|| self.inner.record_job_start(job)).await.is_err() {
            tracing::warn!(job_id = job.id, "accounting record dropped: circuit open or sink failed");
        }
        Ok(())
    }

    async fn record_job_end(&self, job: &Job) -> ControllerResult<()> {
        if self.breaker.execute(|| self.inner.record_job_end(job)).await.is_err() {
            tracing::warn!(job_id = job.id, "accounting record dropped: circuit open or sink failed");
        }
        Ok(())
    }
}
