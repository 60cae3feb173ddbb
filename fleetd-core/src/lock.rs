//! Lock Domain (C2).
//!
//! Four independent rwlocks guard the four entity families. Any handler
//! touching more than one of them must acquire in the fixed order
//! **config, job, node, partition** and release in reverse, the same
//! deadlock-avoidance discipline the teacher's allocator uses for its
//! resource/cluster locks. Writer-heavy handlers additionally pass through
//! a throttle gate limiting them to one in flight at a time.

use tokio::sync::{Semaphore, SemaphorePermit, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquisition order is enforced structurally: callers obtain guards through
/// these helpers rather than holding raw `RwLock` handles, and the fields
/// below are declared (and therefore dropped) in the same config/job/node/
/// partition order everywhere they appear together.
pub struct LockDomain<C, J, N, P> {
    config: RwLock<C>,
    job: RwLock<J>,
    node: RwLock<N>,
    partition: RwLock<P>,
    throttle: Semaphore,
}

impl<C, J, N, P> LockDomain<C, J, N, P> {
    pub fn new(config: C, job: J, node: N, partition: P) -> Self {
        Self {
            config: RwLock::new(config),
            job: RwLock::new(job),
            node: RwLock::new(node),
            partition: RwLock::new(partition),
            // One permit: writer-heavy handlers (submit/allocate, job
            // complete, step complete, batch complete) run one at a time.
            throttle: Semaphore::new(1),
        }
    }

    pub async fn config_read(&self) -> RwLockReadGuard<'_, C> {
        self.config.read().await
    }

    pub async fn config_write(&self) -> RwLockWriteGuard<'_, C> {
        self.config.write().await
    }

    pub async fn job_read(&self) -> RwLockReadGuard<'_, J> {
        self.job.read().await
    }

    pub async fn job_write(&self) -> RwLockWriteGuard<'_, J> {
        self.job.write().await
    }

    pub async fn node_read(&self) -> RwLockReadGuard<'_, N> {
        self.node.read().await
    }

    pub async fn node_write(&self) -> RwLockWriteGuard<'_, N> {
        self.node.write().await
    }

    pub async fn partition_read(&self) -> RwLockReadGuard<'_, P> {
        self.partition.read().await
    }

    pub async fn partition_write(&self) -> RwLockWriteGuard<'_, P> {
        self.partition.write().await
    }

    /// Acquire the throttle gate. Held by the caller for the duration of a
    /// writer-heavy handler; dropping the permit releases the slot.
    pub async fn throttle(&self) -> SemaphorePermit<'_> {
        self.throttle
            .acquire()
            .await
            .expect("throttle semaphore is never closed")
    }
}
