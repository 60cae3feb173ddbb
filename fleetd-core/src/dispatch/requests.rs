//! Request/response payload shapes for the RPC families in
//! [`MsgType`](crate::dispatch::message::MsgType). These are the bodies that
//! follow a [`MessageHeader`](crate::dispatch::message::MessageHeader) on the
//! wire once the external codec (spec.md §6, out of scope here) has framed
//! and decoded them into bytes; the dispatcher only ever sees the bytes of
//! one of these structs.

use crate::completion::CompletionOutcome;
use crate::model::{JobReason, JobRequest, JobState, Node, SignedCredential};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmitRequest {
    pub request: JobRequest,
    pub batch_script: Option<String>,
    pub immediate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmitResponse {
    pub job_id: u32,
    pub reason: JobReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWillRunRequest {
    pub request: JobRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWillRunResponse {
    pub can_run_now: bool,
    pub candidate_nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAllocateRequest {
    pub job_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAllocateResponse {
    pub started: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCancelRequest {
    pub job_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCancelResponse {
    pub cancelled: bool,
}

/// Outbound kill signal pushed onto a node's agent queue when a job is
/// cancelled; distinct from the `JobCancelRequest`/`Response` pair above,
/// which is the inbound RPC a user or operator issues to the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeKillRequest {
    pub job_id: u32,
}

/// Outbound instruction pushed onto a node's agent queue telling it to
/// abort a job it reported running that the controller has no record of
/// (spec.md §4.9 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAbortJobRequest {
    pub job_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequeueRequest {
    pub job_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequeueResponse {
    pub ok: bool,
}

/// Partial update of a pending/running job: `None` fields are left alone.
/// At least one field must actually change the stored value or the
/// handler rejects the request with `NoChangeInData`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUpdateRequest {
    pub job_id: u32,
    pub hold: Option<bool>,
    pub time_limit_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUpdateResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfoRequest {
    pub job_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfoResponse {
    pub job_id: u32,
    pub state: JobState,
    pub reason: JobReason,
    pub node_bitmap: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCreateRequest {
    pub job_id: u32,
    pub node_subset: Vec<String>,
    pub cores_per_node: u32,
    pub mem_limit_mb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCreateResponse {
    pub step_id: u32,
    pub credential: SignedCredential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCredentialRequest {
    pub job_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCredentialResponse {
    pub credential: SignedCredential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompleteRequest {
    pub job_id: u32,
    pub step_id: u32,
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompleteResponse {
    pub step_finalized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRegisterRequest {
    pub report: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRegisterResponse {
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRebootRequest {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub alive: bool,
    pub role_is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpilogCompleteRequest {
    pub job_id: u32,
    pub node: String,
    pub rc: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCompleteRequest {
    pub job_id: u32,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCompleteResponse {
    pub outcome: CompletionOutcome,
}

/// Generic job-driver completion report, distinct from `BatchCompleteRequest`
/// (the batch script launcher's script_rc/slurmd_rc pair).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompleteRequest {
    pub job_id: u32,
    pub rc: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompleteResponse {
    pub outcome: CompletionOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrologCompleteRequest {
    pub job_id: u32,
    pub node: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationCreateRequest {
    pub reservation: crate::model::Reservation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationDeleteRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationInfoRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationInfoResponse {
    pub reservations: Vec<crate::model::Reservation>,
}

/// Shared envelope for the small set of RPCs with no meaningful reply
/// payload beyond success/failure (the error channel already carries the
/// wire return code, per spec.md §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack;
