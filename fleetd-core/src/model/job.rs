//! Job entity and its state machine (C3/C4).

use crate::error::{ControllerError, ControllerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Base state of a job. Exactly one applies at a time (spec.md §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Suspended,
    Complete,
    Cancelled,
    Failed,
    Timeout,
    NodeFail,
}

impl JobState {
    /// Ordinal used only to implement the `Started`/`Finished` predicates
    /// from spec.md §4.4 ("base > Pending", "base > Suspended"); it is not
    /// meant to imply any other ordering.
    fn ordinal(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Running => 1,
            JobState::Suspended => 2,
            JobState::Complete => 3,
            JobState::Cancelled => 4,
            JobState::Failed => 5,
            JobState::Timeout => 6,
            JobState::NodeFail => 7,
        }
    }

    pub fn is_started(self) -> bool {
        self.ordinal() > JobState::Pending.ordinal()
    }

    pub fn is_finished(self) -> bool {
        self.ordinal() > JobState::Suspended.ordinal()
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Complete
                | JobState::Cancelled
                | JobState::Failed
                | JobState::Timeout
                | JobState::NodeFail
        )
    }

    /// Allowed base-state transitions from spec.md §4.4. `requeue` controls
    /// whether a terminal -> Pending transition is permitted (it is only
    /// ever reached through the explicit requeue path, never generic
    /// `transition_to`).
    fn can_transition_to(self, target: JobState, requeue: bool) -> bool {
        use JobState::*;
        match (self, target) {
            (Pending, Running | Cancelled | Failed | Timeout) => true,
            (Running, Suspended | Complete | Cancelled | Failed | Timeout | NodeFail) => true,
            (Suspended, Running | Cancelled | Failed | Timeout) => true,
            (Complete | Cancelled | Failed | Timeout | NodeFail, Pending) => requeue,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

bitflags::bitflags! {
    /// Modifier flags, OR-ed with the base state (spec.md §4.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct JobFlags: u8 {
        const COMPLETING  = 0b0001;
        const CONFIGURING = 0b0010;
        const RESIZING    = 0b0100;
        const REQUEUE     = 0b1000;
    }
}

impl Default for JobFlags {
    fn default() -> Self {
        JobFlags::empty()
    }
}

/// Allocation request accompanying a job (min/max nodes, resources, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub cpus_per_task: u32,
    pub mem_per_cpu_mb: Option<u64>,
    pub mem_per_node_mb: Option<u64>,
    pub features: Vec<String>,
    pub gres: Vec<String>,
    pub partition: String,
    pub reservation: Option<String>,
    pub time_limit_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResources {
    /// Node name -> cpu share granted on that node.
    pub cpus_by_node: std::collections::BTreeMap<String, u32>,
}

impl JobResources {
    pub fn node_count(&self) -> u32 {
        self.cpus_by_node.len() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u32,
    pub user_id: u32,
    pub group_id: u32,
    pub request: JobRequest,
    pub spank_env: Vec<String>,
    pub array_master_id: Option<u32>,
    pub array_task_id: Option<u32>,
    pub state: JobState,
    pub flags: JobFlags,
    pub reason: JobReason,
    pub node_bitmap: HashSet<String>,
    pub job_resources: Option<JobResources>,
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_active: DateTime<Utc>,
    pub restart_cnt: u32,
    pub restart_budget: u32,
    pub step_ids: Vec<u32>,
    pub batch_script: Option<String>,
    /// Number of nodes whose prolog has not yet reported done.
    pub prolog_pending: u32,
    /// Number of nodes whose epilog has not yet reported done.
    pub epilog_pending: u32,
    /// Administrative hold: a held job is skipped by `kick`'s scheduling
    /// sweep and rejects an explicit `allocate` until released.
    pub held: bool,
}

/// Reason the job sits in its current state (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobReason {
    None,
    Priority,
    Resources,
    NodeDown,
    Held,
    ReservationBusy,
    PartConfigUnavailable,
    QosThreshold,
}

impl Job {
    pub fn new(id: u32, user_id: u32, group_id: u32, request: JobRequest, submit_time: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            group_id,
            request,
            spank_env: Vec::new(),
            array_master_id: None,
            array_task_id: None,
            state: JobState::Pending,
            flags: JobFlags::empty(),
            reason: JobReason::Priority,
            node_bitmap: HashSet::new(),
            job_resources: None,
            submit_time,
            start_time: None,
            end_time: None,
            last_active: submit_time,
            restart_cnt: 0,
            restart_budget: 1,
            step_ids: Vec::new(),
            batch_script: None,
            prolog_pending: 0,
            epilog_pending: 0,
            held: false,
        }
    }

    pub fn is_completing(&self) -> bool {
        self.flags.contains(JobFlags::COMPLETING)
    }

    pub fn is_configuring(&self) -> bool {
        self.flags.contains(JobFlags::CONFIGURING)
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// *Completed* = Finished ∧ ¬Completing (spec.md §4.4).
    pub fn is_completed(&self) -> bool {
        self.state.is_finished() && !self.is_completing()
    }

    /// Invariant check: a running job's bitmap cardinality must equal its
    /// granted node count (spec.md §3 / testable property 2).
    pub fn check_bitmap_integrity(&self) -> ControllerResult<()> {
        if self.state == JobState::Running {
            let granted = self
                .job_resources
                .as_ref()
                .map(|r| r.node_count())
                .unwrap_or(0);
            if self.node_bitmap.len() as u32 != granted {
                return Err(ControllerError::Internal(format!(
                    "job {} bitmap cardinality {} != granted node count {}",
                    self.id,
                    self.node_bitmap.len(),
                    granted
                )));
            }
        }
        Ok(())
    }

    /// Generic base-state transition guarded by the allowed-transition
    /// table. Requeue transitions must go through [`Job::requeue_to_pending`]
    /// instead.
    pub fn transition_to(&mut self, target: JobState) -> ControllerResult<()> {
        if !self.state.can_transition_to(target, false) {
            return Err(ControllerError::Internal(format!(
                "illegal job transition {:?} -> {:?}",
                self.state, target
            )));
        }
        tracing::info!(job_id = self.id, from = ?self.state, to = ?target, "job state transition");
        self.state = target;
        Ok(())
    }

    pub fn requeue_to_pending(&mut self) -> ControllerResult<()> {
        if !self.state.can_transition_to(JobState::Pending, true) {
            return Err(ControllerError::Internal(format!(
                "job {} in state {:?} cannot be requeued",
                self.id, self.state
            )));
        }
        tracing::info!(job_id = self.id, from = ?self.state, "job requeued to pending");
        self.state = JobState::Pending;
        self.flags = JobFlags::empty();
        self.node_bitmap.clear();
        self.job_resources = None;
        self.start_time = None;
        self.end_time = None;
        Ok(())
    }
}
