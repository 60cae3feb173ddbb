//! Top-level controller: wires the entity store, scheduling pipeline, step
//! manager, completion reconciler, health monitor, reservation manager,
//! failover state, and RPC telemetry into one handle shared across
//! dispatcher tasks.

use crate::collaborators::{
    AccountingSink, AgentQueue, CredentialSigner, Ed25519CredentialSigner, NullAccountingSink,
};
use crate::completion::CompletionReconciler;
use crate::failover::{ControllerRole, FailoverState};
use crate::health::HealthMonitor;
use crate::reservation_manager::ReservationManager;
use crate::scheduler::SchedulerPipeline;
use crate::step_manager::StepManager;
use crate::store::{new_store, Store};
use crate::telemetry::RpcTelemetry;
use crate::time::{JobIdAllocator, StepIdAllocator};
use fleetd_config::ControllerConfig;
use std::sync::Arc;
use std::time::Duration;

pub struct Controller<A: AccountingSink = NullAccountingSink, S: CredentialSigner = Ed25519CredentialSigner> {
    pub store: Arc<Store>,
    pub scheduler: SchedulerPipeline,
    pub steps: StepManager<S>,
    pub completion: CompletionReconciler<A>,
    pub health: HealthMonitor,
    pub reservations: ReservationManager,
    pub failover: FailoverState,
    pub telemetry: RpcTelemetry,
    pub agent_queue: AgentQueue,
}

impl<A: AccountingSink, S: CredentialSigner> Controller<A, S> {
    pub fn new(config: ControllerConfig, accounting: Arc<A>, signer: Arc<S>, starts_as: ControllerRole) -> Self {
        let node_name = config.node_name.clone().unwrap_or_else(|| "unknown".to_string());
        let agent_timeout = Duration::from_secs(config.scheduler.agent_timeout_secs);
        let down_grace = Duration::from_secs(config.scheduler.node_down_grace_secs);
        let max_job_id = config.scheduler.max_job_id;
        let type_cap = config.telemetry.type_table_capacity;
        let user_cap = config.telemetry.user_table_capacity;

        let store = Arc::new(new_store(config));
        let job_ids = Arc::new(JobIdAllocator::new(max_job_id));
        let step_ids = Arc::new(StepIdAllocator::new());

        Self {
            store: store.clone(),
            scheduler: SchedulerPipeline::new(store.clone(), job_ids),
            steps: StepManager::new(store.clone(), step_ids, signer, 3600),
            completion: CompletionReconciler::new(store.clone(), accounting),
            health: HealthMonitor::new(store.clone(), agent_timeout, down_grace),
            reservations: ReservationManager::new(store.clone()),
            failover: FailoverState::new(node_name, starts_as),
            telemetry: RpcTelemetry::new(type_cap, user_cap),
            agent_queue: AgentQueue::new(256),
        }
    }

    /// Run one scheduling pass if this controller is currently primary.
    /// Backups observe state but never mutate it (spec.md failover
    /// non-goal: no split-brain admission).
    pub async fn kick_if_primary(&self) -> crate::error::ControllerResult<Vec<u32>> {
        if !self.failover.is_primary() {
            return Ok(Vec::new());
        }
        self.scheduler.kick().await
    }
}
