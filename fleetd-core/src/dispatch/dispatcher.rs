//! RPC Dispatcher (C5): decodes a request body for a declared
//! [`MsgType`](super::MsgType), authorizes the caller against the tier
//! and ownership rules of spec.md §4.5, calls through to the relevant
//! controller subsystem, and records telemetry — the single place every
//! wire RPC passes through, mirroring the layered concerns of the
//! teacher's `api/middleware.rs` (auth, then handler, then telemetry).

use super::auth::{AuthTier, Identity};
use super::message::MsgType;
use super::requests::*;
use crate::admin::AdminOps;
use crate::completion::CompletionOutcome;
use crate::controller::Controller;
use crate::collaborators::{AccountingSink, CredentialSigner};
use crate::error::{ControllerError, ControllerResult};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Instant;

pub struct Dispatcher<A: AccountingSink, S: CredentialSigner> {
    controller: Arc<Controller<A, S>>,
}

/// Writer-heavy message types that must additionally pass through the
/// lock domain's throttle gate (spec.md §4.2). `JobSubmit`/`JobAllocate`
/// already acquire it inside [`crate::scheduler::SchedulerPipeline`]; the
/// completion family does not own a throttle handle of its own, so the
/// dispatcher acquires it here instead.
fn needs_dispatcher_throttle(msg_type: MsgType) -> bool {
    matches!(
        msg_type,
        MsgType::StepComplete | MsgType::BatchComplete | MsgType::EpilogComplete | MsgType::JobComplete
    )
}

impl<A: AccountingSink, S: CredentialSigner> Dispatcher<A, S> {
    pub fn new(controller: Arc<Controller<A, S>>) -> Self {
        Self { controller }
    }

    /// Entry point: decode, authorize, dispatch, and record telemetry for
    /// one RPC. Returns the encoded response body on success; the error
    /// variant is the wire return code the dispatcher sends instead.
    pub async fn dispatch(&self, msg_type: MsgType, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let start = Instant::now();
        let _throttle_permit = if needs_dispatcher_throttle(msg_type) {
            Some(self.controller.store.throttle().await)
        } else {
            None
        };

        let result = self.route(msg_type, identity, payload).await;
        if let Err(ref e) = result {
            tracing::warn!(?msg_type, uid = identity.uid, error = %e, "rpc handler returned an error");
        }
        self.controller.telemetry.record(msg_type, identity.uid, start.elapsed());
        result
    }

    async fn route(&self, msg_type: MsgType, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        match msg_type {
            MsgType::JobSubmit => self.handle_job_submit(identity, payload).await,
            MsgType::JobWillRun => self.handle_job_will_run(identity, payload).await,
            MsgType::JobAllocate => self.handle_job_allocate(identity, payload).await,
            MsgType::JobCancel => self.handle_job_cancel(identity, payload).await,
            MsgType::JobRequeue => self.handle_job_requeue(identity, payload).await,
            MsgType::JobInfoRequest => self.handle_job_info(identity, payload).await,
            MsgType::JobUpdate => self.handle_job_update(identity, payload).await,

            MsgType::StepCreate => self.handle_step_create(identity, payload).await,
            MsgType::StepComplete => self.handle_step_complete(identity, payload).await,
            MsgType::StepCredential => self.handle_step_credential(identity, payload).await,
            MsgType::StepLayout => Err(ControllerError::Unexpected),

            MsgType::NodeRegister => self.handle_node_register(identity, payload).await,
            MsgType::NodeReboot => self.handle_node_reboot(identity, payload).await,
            MsgType::NodeConfigure => Err(ControllerError::Unexpected),
            MsgType::PingRequest => self.handle_ping(identity).await,

            MsgType::EpilogComplete => self.handle_epilog_complete(identity, payload).await,
            MsgType::BatchComplete => self.handle_batch_complete(identity, payload).await,
            MsgType::PrologComplete => self.handle_prolog_complete(identity, payload).await,
            MsgType::JobComplete => self.handle_job_complete(identity, payload).await,

            MsgType::ReservationCreate => self.handle_reservation_create(identity, payload).await,
            MsgType::ReservationUpdate => self.handle_reservation_update(identity, payload).await,
            MsgType::ReservationDelete => self.handle_reservation_delete(identity, payload).await,
            MsgType::ReservationInfoRequest => self.handle_reservation_info(identity, payload).await,

            MsgType::ReconfigureRequest => self.require_super_user(identity, || self.controller.reconfigure()).await,
            MsgType::ShutdownRequest => self.require_super_user(identity, || self.controller.shutdown()).await,
            MsgType::TakeoverRequest => self.require_super_user(identity, || self.controller.takeover()).await,
            MsgType::SetDebugFlags => self.handle_set_debug_flags(identity, payload).await,
            MsgType::SetDebugLevel => self.handle_set_debug_level(identity, payload).await,
            MsgType::SetSchedlogLevel => self.handle_set_schedlog_level(identity, payload).await,

            MsgType::ReservedFuture => Err(ControllerError::Unexpected),
        }
    }

    fn require_node_agent(&self, identity: &Identity) -> ControllerResult<()> {
        if !identity.is_node_agent {
            return Err(ControllerError::AccessDenied);
        }
        Ok(())
    }

    fn require_tier(&self, identity: &Identity, tier: AuthTier) -> ControllerResult<()> {
        if !identity.is_at_least(tier) {
            return Err(ControllerError::AccessDenied);
        }
        Ok(())
    }

    async fn require_super_user<F, Fut>(&self, identity: &Identity, op: F) -> ControllerResult<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ControllerResult<()>>,
    {
        self.require_tier(identity, AuthTier::SuperUser)?;
        op().await?;
        encode(&Ack)
    }

    async fn job_is_owned_or_operator(&self, identity: &Identity, job_id: u32) -> ControllerResult<()> {
        let job_table = self.controller.store.job_read().await;
        let job = job_table.get(job_id)?;
        if identity.owns(job) || identity.is_at_least(AuthTier::Operator) {
            Ok(())
        } else {
            Err(ControllerError::AccessDenied)
        }
    }

    // --- job family ---

    async fn handle_job_submit(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: JobSubmitRequest = decode(payload)?;
        let job_id = self
            .controller
            .scheduler
            .submit_batch(identity.uid, identity.gid, req.request, req.batch_script, req.immediate)
            .await?;
        let reason = {
            let job_table = self.controller.store.job_read().await;
            job_table.get(job_id)?.reason
        };
        encode(&JobSubmitResponse { job_id, reason })
    }

    async fn handle_job_will_run(&self, _identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: JobWillRunRequest = decode(payload)?;
        let result = self.controller.scheduler.will_run(&req.request).await?;
        encode(&JobWillRunResponse {
            can_run_now: result.can_run_now,
            candidate_nodes: result.candidate_nodes,
        })
    }

    async fn handle_job_allocate(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: JobAllocateRequest = decode(payload)?;
        self.job_is_owned_or_operator(identity, req.job_id).await?;
        let started = self.controller.scheduler.allocate(req.job_id).await?;
        encode(&JobAllocateResponse { started })
    }

    async fn handle_job_cancel(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: JobCancelRequest = decode(payload)?;
        self.job_is_owned_or_operator(identity, req.job_id).await?;

        let nodes = self.controller.completion.cancel_job(req.job_id).await?;
        let kill = encode(&NodeKillRequest { job_id: req.job_id })?;
        for node in nodes {
            self.controller.agent_queue.send(&node, kill.clone());
        }
        encode(&JobCancelResponse { cancelled: true })
    }

    async fn handle_job_requeue(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: JobRequeueRequest = decode(payload)?;
        self.job_is_owned_or_operator(identity, req.job_id).await?;
        // Admin requeue does not consume the restart budget (spec.md §9);
        // an operator or super-user issuing this RPC counts as admin.
        let admin = identity.is_at_least(AuthTier::Operator);
        self.controller.scheduler.requeue(req.job_id, admin).await?;
        encode(&JobRequeueResponse { ok: true })
    }

    async fn handle_job_info(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: JobInfoRequest = decode(payload)?;
        let job_table = self.controller.store.job_read().await;
        let job = job_table.get(req.job_id)?;
        let mask = {
            let config = self.controller.store.config_read().await;
            config.controller.security.privacy_mask
        };
        if !identity.may_view(job, &mask) {
            return Err(ControllerError::AccessDenied);
        }
        encode(&JobInfoResponse {
            job_id: job.id,
            state: job.state,
            reason: job.reason,
            node_bitmap: job.node_bitmap.iter().cloned().collect(),
        })
    }

    async fn handle_job_update(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: JobUpdateRequest = decode(payload)?;
        self.job_is_owned_or_operator(identity, req.job_id).await?;
        self.controller.scheduler.update(req.job_id, req.hold, req.time_limit_secs).await?;
        encode(&JobUpdateResponse { ok: true })
    }

    // --- step family ---

    async fn handle_step_create(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: StepCreateRequest = decode(payload)?;
        self.job_is_owned_or_operator(identity, req.job_id).await?;
        let (step_id, credential) = self
            .controller
            .steps
            .create_step(req.job_id, req.node_subset, req.cores_per_node, req.mem_limit_mb)
            .await?;
        encode(&StepCreateResponse { step_id, credential })
    }

    async fn handle_step_credential(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: StepCredentialRequest = decode(payload)?;
        self.job_is_owned_or_operator(identity, req.job_id).await?;
        let credential = self.controller.steps.batch_step_credential(req.job_id).await?;
        encode(&StepCredentialResponse { credential })
    }

    async fn handle_step_complete(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_node_agent(identity)?;
        let req: StepCompleteRequest = decode(payload)?;
        let step_finalized = self
            .controller
            .completion
            .step_complete(req.job_id, req.step_id, &req.nodes)
            .await?;
        if step_finalized {
            self.controller.kick_if_primary().await.ok();
        }
        encode(&StepCompleteResponse { step_finalized })
    }

    // --- node family ---

    async fn handle_node_register(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_node_agent(identity)?;
        let req: NodeRegisterRequest = decode(payload)?;
        let node_name = req.report.name.clone();
        let outcome = self.controller.health.register_node(req.report).await;
        for job_id in &outcome.abort_job_ids {
            if let Ok(body) = encode(&NodeAbortJobRequest { job_id: *job_id }) {
                self.controller.agent_queue.send(&node_name, body);
            }
        }
        if outcome.newly_up {
            self.controller.kick_if_primary().await.ok();
        }
        encode(&NodeRegisterResponse { accepted: true })
    }

    async fn handle_node_reboot(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_tier(identity, AuthTier::SuperUser)?;
        let req: NodeRebootRequest = decode(payload)?;
        self.controller.health.reboot_nodes(&req.names).await;
        encode(&Ack)
    }

    async fn handle_ping(&self, identity: &Identity) -> ControllerResult<Vec<u8>> {
        let _ = identity;
        encode(&PingResponse {
            alive: true,
            role_is_primary: self.controller.failover.is_primary(),
        })
    }

    // --- completion family (node-origin only) ---

    async fn handle_epilog_complete(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_node_agent(identity)?;
        let req: EpilogCompleteRequest = decode(payload)?;
        self.controller.completion.epilog_complete(req.job_id, &req.node, req.rc).await?;
        self.controller.kick_if_primary().await.ok();
        encode(&Ack)
    }

    async fn handle_batch_complete(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_node_agent(identity)?;
        let req: BatchCompleteRequest = decode(payload)?;
        let outcome = self.controller.completion.batch_complete(req.job_id, req.exit_code).await?;
        if outcome != CompletionOutcome::Success {
            self.controller.kick_if_primary().await.ok();
        }
        encode(&BatchCompleteResponse { outcome })
    }

    async fn handle_prolog_complete(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_node_agent(identity)?;
        let req: PrologCompleteRequest = decode(payload)?;
        self.controller.completion.complete_prolog(req.job_id, &req.node).await?;
        encode(&Ack)
    }

    async fn handle_job_complete(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_node_agent(identity)?;
        let req: JobCompleteRequest = decode(payload)?;
        let outcome = self.controller.completion.job_complete(req.job_id, req.rc).await?;
        if outcome != CompletionOutcome::Success {
            self.controller.kick_if_primary().await.ok();
        }
        encode(&JobCompleteResponse { outcome })
    }

    // --- reservation family (super-user only) ---

    async fn handle_reservation_create(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_tier(identity, AuthTier::SuperUser)?;
        let req: ReservationCreateRequest = decode(payload)?;
        self.controller.reservations.create(req.reservation).await?;
        encode(&Ack)
    }

    async fn handle_reservation_update(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_tier(identity, AuthTier::SuperUser)?;
        let req: ReservationCreateRequest = decode(payload)?;
        self.controller.reservations.update(req.reservation).await?;
        encode(&Ack)
    }

    async fn handle_reservation_delete(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_tier(identity, AuthTier::SuperUser)?;
        let req: ReservationDeleteRequest = decode(payload)?;
        self.controller.reservations.delete(&req.name).await?;
        encode(&Ack)
    }

    async fn handle_reservation_info(&self, _identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        let req: ReservationInfoRequest = decode(payload)?;
        let reservations = match req.name {
            Some(name) => self.controller.reservations.get(&name).await.into_iter().collect(),
            None => self.controller.reservations.list().await,
        };
        encode(&ReservationInfoResponse { reservations })
    }

    // --- admin family (super-user, string payloads delegate to AdminOps) ---

    async fn handle_set_debug_flags(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_tier(identity, AuthTier::SuperUser)?;
        let flags: String = decode(payload)?;
        self.controller.set_debug_flags(&flags).await?;
        encode(&Ack)
    }

    async fn handle_set_debug_level(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_tier(identity, AuthTier::SuperUser)?;
        let level: String = decode(payload)?;
        self.controller.set_debug_level(&level).await?;
        encode(&Ack)
    }

    async fn handle_set_schedlog_level(&self, identity: &Identity, payload: &[u8]) -> ControllerResult<Vec<u8>> {
        self.require_tier(identity, AuthTier::SuperUser)?;
        let level: String = decode(payload)?;
        self.controller.set_schedlog_level(&level).await?;
        encode(&Ack)
    }
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> ControllerResult<T> {
    serde_json::from_slice(payload).map_err(|e| ControllerError::Internal(format!("malformed request body: {e}")))
}

fn encode<T: Serialize>(value: &T) -> ControllerResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(ControllerError::from)
}
