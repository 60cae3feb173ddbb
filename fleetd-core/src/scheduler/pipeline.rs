//! Scheduling pipeline (C6): admission, node selection, and the
//! submit/allocate/will-run/requeue/kick entry points the dispatcher calls
//! into.

use super::selection::{apply_reservation_gate, eligible_nodes, select_minimal_weight_subset};
use crate::error::{ControllerError, ControllerResult};
use crate::model::{Job, JobFlags, JobReason, JobRequest, JobResources, JobState};
use crate::store::Store;
use crate::time::JobIdAllocator;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct SchedulerPipeline {
    store: Arc<Store>,
    job_ids: Arc<JobIdAllocator>,
}

#[derive(Debug, Clone)]
pub struct WillRunResult {
    pub can_run_now: bool,
    pub candidate_nodes: Vec<String>,
}

/// Outcome of a single node-selection attempt, distinguishing a request that
/// can never be satisfied by this cluster from one that is merely waiting
/// on load to free up (spec.md §7 transient capacity errors).
enum SelectOutcome {
    Runnable(Vec<String>),
    NoEligibleNodes(JobReason),
    Busy,
}

/// Map a pending job's waiting reason to the wire error an immediate submit
/// or allocate fails with (spec.md §7's transient capacity errors).
fn immediate_capacity_error(reason: JobReason) -> ControllerError {
    match reason {
        JobReason::ReservationBusy => ControllerError::ReservationBusy,
        JobReason::PartConfigUnavailable => ControllerError::PartConfigUnavailable,
        _ => ControllerError::NodeNotAvail,
    }
}

impl SchedulerPipeline {
    pub fn new(store: Arc<Store>, job_ids: Arc<JobIdAllocator>) -> Self {
        Self { store, job_ids }
    }

    /// Admit a new job. If `immediate` is set and the job cannot start right
    /// away, submission fails outright rather than queuing (spec.md §4.3
    /// `CanNotStartImmediately`).
    pub async fn submit_batch(
        &self,
        user_id: u32,
        group_id: u32,
        request: JobRequest,
        batch_script: Option<String>,
        immediate: bool,
    ) -> ControllerResult<u32> {
        let _permit = self.store.throttle().await;

        let job_id = {
            let job_table = self.store.job_read().await;
            self.job_ids
                .alloc(&|id| job_table.is_live(id))
                .ok_or(ControllerError::ResourceBusy)?
        };

        let submit_time = crate::time::now();
        let mut job = Job::new(job_id, user_id, group_id, request, submit_time);
        job.batch_script = batch_script;

        let outcome = self.try_select(&job).await?;
        if immediate {
            if let SelectOutcome::NoEligibleNodes(reason) = outcome {
                return Err(immediate_capacity_error(reason));
            }
        }

        let plan = match outcome {
            SelectOutcome::Runnable(nodes) => Some(nodes),
            SelectOutcome::NoEligibleNodes(reason) => {
                job.reason = reason;
                None
            }
            SelectOutcome::Busy => {
                job.reason = JobReason::Resources;
                None
            }
        };

        if immediate && plan.is_none() {
            return Err(ControllerError::CanNotStartImmediately);
        }

        if let Some(nodes) = &plan {
            self.grant(&mut job, nodes).await?;
        }

        {
            let mut job_table = self.store.job_write().await;
            job_table.insert(job)?;
        }

        if plan.is_some() {
            self.commit_allocation(job_id).await?;
        }

        Ok(job_id)
    }

    /// Dry-run: would this request be able to start right now, and on which
    /// nodes, without actually admitting it (spec.md C6 `will_run`).
    pub async fn will_run(&self, request: &JobRequest) -> ControllerResult<WillRunResult> {
        let probe = Job::new(0, 0, 0, request.clone(), crate::time::now());
        match self.try_select(&probe).await? {
            SelectOutcome::Runnable(nodes) => Ok(WillRunResult {
                can_run_now: true,
                candidate_nodes: nodes,
            }),
            SelectOutcome::NoEligibleNodes(_) | SelectOutcome::Busy => Ok(WillRunResult {
                can_run_now: false,
                candidate_nodes: Vec::new(),
            }),
        }
    }

    /// Attempt to move a specific pending job to Running.
    pub async fn allocate(&self, job_id: u32) -> ControllerResult<bool> {
        let _permit = self.store.throttle().await;
        let request = {
            let job_table = self.store.job_read().await;
            let job = job_table.get(job_id)?;
            if job.state != JobState::Pending {
                return Err(ControllerError::InProgress);
            }
            if job.is_held() {
                return Err(ControllerError::JobHeld);
            }
            job.request.clone()
        };
        let probe = Job::new(job_id, 0, 0, request, crate::time::now());
        let outcome = self.try_select(&probe).await?;
        let nodes = match outcome {
            SelectOutcome::Runnable(nodes) => nodes,
            SelectOutcome::NoEligibleNodes(_) | SelectOutcome::Busy => return Ok(false),
        };

        {
            let mut job_table = self.store.job_write().await;
            let job = job_table.get_mut(job_id)?;
            self.grant_locked(job, &nodes);
        }
        self.commit_allocation(job_id).await?;
        Ok(true)
    }

    /// Sweep all Pending jobs attempting to start them, lowest id first
    /// (FIFO within priority tier). Driven either immediately after a
    /// state-changing RPC or, in defer mode, by a periodic timer
    /// (spec.md §4.6).
    pub async fn kick(&self) -> ControllerResult<Vec<u32>> {
        let pending_ids: Vec<u32> = {
            let job_table = self.store.job_read().await;
            let mut ids: Vec<u32> = job_table
                .iter()
                .filter(|j| j.state == JobState::Pending && !j.is_held())
                .map(|j| j.id)
                .collect();
            ids.sort_unstable();
            ids
        };

        let mut started = Vec::new();
        for id in pending_ids {
            if self.allocate(id).await? {
                started.push(id);
            }
        }
        Ok(started)
    }

    /// Requeue a running/finished job back to Pending, consuming one unit
    /// of restart budget unless the caller is an administrative requeue
    /// (spec.md §9).
    pub async fn requeue(&self, job_id: u32, admin: bool) -> ControllerResult<()> {
        let mut job_table = self.store.job_write().await;
        let job = job_table.get_mut(job_id)?;
        if !admin {
            if job.restart_cnt >= job.restart_budget {
                return Err(ControllerError::Disabled("restart budget exhausted".to_string()));
            }
            job.restart_cnt += 1;
        }
        match job.state {
            JobState::Pending => Ok(()),
            state if state.is_terminal() => job.requeue_to_pending(),
            // Running/Suspended has no direct edge to Pending (spec.md §4.4's
            // transition table); an admin requeue forces it through a
            // terminal state first.
            _ => {
                job.transition_to(JobState::Cancelled)?;
                job.requeue_to_pending()
            }
        }
    }

    /// Apply a partial update (hold/release, time limit) to a job. `None`
    /// fields are left untouched; if nothing in the request actually
    /// changes the stored job, rejects with `NoChangeInData` rather than
    /// silently succeeding.
    pub async fn update(&self, job_id: u32, hold: Option<bool>, time_limit_secs: Option<u64>) -> ControllerResult<()> {
        let mut job_table = self.store.job_write().await;
        let job = job_table.get_mut(job_id)?;

        let mut changed = false;
        if let Some(h) = hold {
            if job.state != JobState::Pending {
                return Err(ControllerError::Disabled("only a pending job can be held or released".to_string()));
            }
            if job.held != h {
                job.held = h;
                job.reason = if h { JobReason::Held } else { JobReason::Priority };
                changed = true;
            }
        }
        if let Some(t) = time_limit_secs {
            if job.request.time_limit_secs != Some(t) {
                job.request.time_limit_secs = Some(t);
                changed = true;
            }
        }

        if changed {
            Ok(())
        } else {
            Err(ControllerError::NoChangeInData)
        }
    }

    async fn try_select(&self, job: &Job) -> ControllerResult<SelectOutcome> {
        let node_table = self.store.node_read().await;
        let partition_table = self.store.partition_read().await;

        let partition = partition_table.get(&job.request.partition)?;
        if !partition.accepts_submissions() {
            return Ok(SelectOutcome::NoEligibleNodes(JobReason::PartConfigUnavailable));
        }

        let candidates = eligible_nodes(job, node_table.iter());
        if candidates.is_empty() {
            return Ok(SelectOutcome::NoEligibleNodes(JobReason::NodeDown));
        }
        let gated = apply_reservation_gate(
            job,
            candidates,
            partition_table.reservations(),
            crate::time::now(),
        );
        if gated.is_empty() {
            return Ok(SelectOutcome::NoEligibleNodes(JobReason::ReservationBusy));
        }
        let candidates = gated;

        Ok(match select_minimal_weight_subset(job, candidates, partition.max_nodes_per_job) {
            Some(nodes) => SelectOutcome::Runnable(nodes.into_iter().map(|n| n.name.clone()).collect()),
            None => SelectOutcome::Busy,
        })
    }

    async fn grant(&self, job: &mut Job, node_names: &[String]) -> ControllerResult<()> {
        let mut node_table = self.store.node_write().await;
        for name in node_names {
            let node = node_table.get_mut(name)?;
            node.cpus_alloc += job.request.cpus_per_task;
            node.jobs_running.insert(job.id);
            node.check_allocation_integrity()?;
            node.recompute_derived_state();
        }
        self.populate_grant(job, node_names);
        Ok(())
    }

    fn grant_locked(&self, job: &mut Job, node_names: &[String]) {
        self.populate_grant(job, node_names);
    }

    fn populate_grant(&self, job: &mut Job, node_names: &[String]) {
        let mut cpus_by_node = BTreeMap::new();
        for name in node_names {
            cpus_by_node.insert(name.clone(), job.request.cpus_per_task);
            job.node_bitmap.insert(name.clone());
        }
        job.job_resources = Some(JobResources { cpus_by_node });
        job.start_time = Some(crate::time::now());
    }

    async fn commit_allocation(&self, job_id: u32) -> ControllerResult<()> {
        if self.allocate_nodes_if_needed(job_id).await? {
            let mut job_table = self.store.job_write().await;
            let job = job_table.get_mut(job_id)?;
            job.transition_to(JobState::Running)?;
            job.flags.insert(JobFlags::CONFIGURING);
            job.prolog_pending = job.node_bitmap.len() as u32;
            job.check_bitmap_integrity()?;
        }
        Ok(())
    }

    /// Node-side counters were already updated in `grant`/`grant_locked`; this
    /// just confirms the job actually has resources before flipping state,
    /// guarding against a caller invoking `commit_allocation` without a
    /// preceding grant.
    async fn allocate_nodes_if_needed(&self, job_id: u32) -> ControllerResult<bool> {
        let job_table = self.store.job_read().await;
        let job = job_table.get(job_id)?;
        Ok(job.job_resources.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, NodeState, Partition};
    use crate::store::new_store;

    async fn fixture() -> (Arc<Store>, Arc<JobIdAllocator>) {
        let store = Arc::new(new_store(fleetd_config::ControllerConfig::default()));
        {
            let mut nodes = store.node_write().await;
            let mut n = Node::new("n1".to_string(), 4, 4096, 1);
            n.partitions.push("debug".to_string());
            n.state = NodeState::Idle;
            n.last_response = Some(crate::time::now());
            nodes.insert(n);
        }
        {
            let mut partitions = store.partition_write().await;
            partitions.insert(Partition::new("debug".to_string(), vec!["n1".to_string()]));
        }
        (store, Arc::new(JobIdAllocator::new(1000)))
    }

    fn request() -> JobRequest {
        JobRequest {
            min_nodes: 1,
            max_nodes: 1,
            cpus_per_task: 2,
            mem_per_cpu_mb: None,
            mem_per_node_mb: None,
            features: vec![],
            gres: vec![],
            partition: "debug".to_string(),
            reservation: None,
            time_limit_secs: Some(600),
        }
    }

    #[tokio::test]
    async fn submit_batch_starts_job_when_resources_free() {
        let (store, job_ids) = fixture().await;
        let pipeline = SchedulerPipeline::new(store.clone(), job_ids);
        let id = pipeline
            .submit_batch(100, 100, request(), None, false)
            .await
            .unwrap();

        let job_table = store.job_read().await;
        let job = job_table.get(id).unwrap();
        assert_eq!(job.state, JobState::Running);
    }

    #[tokio::test]
    async fn immediate_submit_fails_when_no_capacity() {
        let (store, job_ids) = fixture().await;
        let pipeline = SchedulerPipeline::new(store.clone(), job_ids);
        let mut oversized = request();
        oversized.cpus_per_task = 100;
        let result = pipeline.submit_batch(100, 100, oversized, None, true).await;
        assert!(matches!(result, Err(ControllerError::CanNotStartImmediately)));
    }

    #[tokio::test]
    async fn immediate_submit_against_unmatched_partition_is_node_not_avail() {
        let (store, job_ids) = fixture().await;
        let pipeline = SchedulerPipeline::new(store.clone(), job_ids);
        let mut mismatched = request();
        mismatched.features = vec!["gpu".to_string()];
        let result = pipeline.submit_batch(100, 100, mismatched, None, true).await;
        assert!(matches!(result, Err(ControllerError::NodeNotAvail)));
    }

    #[tokio::test]
    async fn disabled_partition_queues_on_batch_submit_but_rejects_immediate() {
        let (store, job_ids) = fixture().await;
        {
            let mut partitions = store.partition_write().await;
            let mut down = Partition::new("debug".to_string(), vec!["n1".to_string()]);
            down.state = crate::model::PartitionState::Down;
            partitions.insert(down);
        }
        let pipeline = SchedulerPipeline::new(store.clone(), job_ids);

        let queued = pipeline.submit_batch(100, 100, request(), None, false).await.unwrap();
        {
            let job_table = store.job_read().await;
            let job = job_table.get(queued).unwrap();
            assert_eq!(job.state, JobState::Pending);
            assert_eq!(job.reason, JobReason::PartConfigUnavailable);
        }

        let result = pipeline.submit_batch(100, 100, request(), None, true).await;
        assert!(matches!(result, Err(ControllerError::PartConfigUnavailable)));
    }

    #[tokio::test]
    async fn held_job_is_skipped_by_kick_and_rejects_explicit_allocate() {
        let (store, job_ids) = fixture().await;
        let pipeline = SchedulerPipeline::new(store.clone(), job_ids);

        let mut big = request();
        big.cpus_per_task = 4;
        let first = pipeline.submit_batch(100, 100, big, None, false).await.unwrap();
        let second = pipeline.submit_batch(100, 100, request(), None, false).await.unwrap();
        {
            let job_table = store.job_read().await;
            assert_eq!(job_table.get(second).unwrap().state, JobState::Pending);
        }

        pipeline.update(second, Some(true), None).await.unwrap();
        pipeline.requeue(first, true).await.unwrap();
        {
            let mut nodes = store.node_write().await;
            let node = nodes.get_mut("n1").unwrap();
            node.cpus_alloc = 0;
            node.jobs_running.clear();
            node.recompute_derived_state();
        }

        let result = pipeline.allocate(second).await;
        assert!(matches!(result, Err(ControllerError::JobHeld)));

        let started = pipeline.kick().await.unwrap();
        assert!(!started.contains(&second));

        pipeline.update(second, Some(false), None).await.unwrap();
        let started = pipeline.kick().await.unwrap();
        assert!(started.contains(&second));
    }

    #[tokio::test]
    async fn update_with_no_actual_change_is_rejected() {
        let (store, job_ids) = fixture().await;
        let pipeline = SchedulerPipeline::new(store.clone(), job_ids);
        let id = pipeline.submit_batch(100, 100, request(), None, false).await.unwrap();

        let result = pipeline.update(id, None, None).await;
        assert!(matches!(result, Err(ControllerError::NoChangeInData)));

        let result = pipeline.update(id, None, Some(600)).await;
        assert!(matches!(result, Err(ControllerError::NoChangeInData)));
    }

    #[tokio::test]
    async fn kick_starts_previously_queued_job_once_capacity_frees() {
        let (store, job_ids) = fixture().await;
        let pipeline = SchedulerPipeline::new(store.clone(), job_ids);

        let mut big = request();
        big.cpus_per_task = 4;
        let first = pipeline.submit_batch(100, 100, big, None, false).await.unwrap();

        let second = pipeline.submit_batch(100, 100, request(), None, false).await.unwrap();
        {
            let job_table = store.job_read().await;
            assert_eq!(job_table.get(second).unwrap().state, JobState::Pending);
        }

        pipeline.requeue(first, true).await.unwrap();
        {
            let mut nodes = store.node_write().await;
            let node = nodes.get_mut("n1").unwrap();
            node.cpus_alloc = 0;
            node.jobs_running.clear();
            node.recompute_derived_state();
        }

        let started = pipeline.kick().await.unwrap();
        assert!(started.contains(&second));
    }
}
