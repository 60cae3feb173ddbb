//! Completion reconciliation (C8): prolog/epilog/batch/step completion
//! reports from node agents, reconciled against job and node state.
//!
//! Step completion uses a binomial-tree fan-in: each node reports into its
//! parent in the forwarding tree, which merges the child ranges into its
//! own report before forwarding up, so the controller sees one aggregated
//! completion per step rather than one message per node. The controller
//! side only needs to fold an incoming range into `pending_nodes` and is
//! indifferent to how many tree hops produced it, which is what makes
//! duplicate reports (retransmission at any tree level) safe to merge
//! twice (spec.md testable property 6).

use crate::collaborators::AccountingSink;
use crate::error::{ControllerError, ControllerResult};
use crate::model::{JobFlags, JobState, NodeFlags};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Exit classification for a batch step or epilog failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionOutcome {
    /// Exit code 0: job moves to Complete.
    Success,
    /// Transient: job should be requeued, no node penalty.
    Requeue,
    /// The offending node should be drained; job is requeued elsewhere.
    DrainNode,
    /// Unrecoverable: job moves to Failed.
    Fatal,
}

fn classify_exit(exit_code: i32) -> CompletionOutcome {
    match exit_code {
        0 => CompletionOutcome::Requeue, // unreachable in practice; callers check 0 first
        1..=127 => CompletionOutcome::Fatal,
        // Negative/high codes model signals and node-side infrastructure
        // failure (e.g. killed by OOM killer, prolog setup failure).
        _ if exit_code < 0 => CompletionOutcome::DrainNode,
        _ => CompletionOutcome::Requeue,
    }
}

pub struct CompletionReconciler<A: AccountingSink> {
    store: Arc<Store>,
    accounting: Arc<A>,
}

impl<A: AccountingSink> CompletionReconciler<A> {
    pub fn new(store: Arc<Store>, accounting: Arc<A>) -> Self {
        Self { store, accounting }
    }

    /// Fold a (possibly tree-aggregated) set of nodes reporting step
    /// completion into the step's pending set. Reporting an already-cleared
    /// node is a no-op, making retransmitted ranges idempotent.
    pub async fn step_complete(&self, job_id: u32, step_id: u32, nodes: &[String]) -> ControllerResult<bool> {
        let mut job_table = self.store.job_write().await;
        let step = job_table
            .get_step_mut(job_id, step_id)
            .ok_or_else(|| ControllerError::Internal(format!("unknown step {job_id}.{step_id}")))?;

        for node in nodes {
            step.pending_nodes.remove(node);
        }
        let is_complete = step.is_complete();
        if is_complete {
            step.state = crate::model::StepState::Complete;
            step.end_time = Some(crate::time::now());
        }
        Ok(is_complete)
    }

    /// A node finished running the job's prolog. Once every allocated node
    /// has reported, the job's CONFIGURING flag clears and it is eligible
    /// to actually launch steps (spec.md §4.4).
    pub async fn complete_prolog(&self, job_id: u32, _node: &str) -> ControllerResult<()> {
        let mut job_table = self.store.job_write().await;
        let job = job_table.get_mut(job_id)?;
        if job.prolog_pending == 0 {
            return Ok(()); // already cleared; duplicate report
        }
        job.prolog_pending -= 1;
        if job.prolog_pending == 0 {
            job.flags.remove(JobFlags::CONFIGURING);
            tracing::info!(job_id, "prolog complete on all nodes");
        }
        Ok(())
    }

    /// A node finished running the job's epilog, reporting `rc`. Frees that
    /// node's share of the job's resources; a non-zero `rc` is a fatal
    /// epilog failure on that node and forces a requeue regardless of how
    /// the batch script itself exited, draining the offending node the same
    /// way a fatal batch exit code would (spec.md §4.8: "if any epilog
    /// reported a fatal error... the job is requeued"). Once every node has
    /// reported, finalizes the job.
    pub async fn epilog_complete(&self, job_id: u32, node: &str, rc: i32) -> ControllerResult<()> {
        let granted_cpus = {
            let job_table = self.store.job_read().await;
            job_table
                .get(job_id)
                .ok()
                .and_then(|j| j.job_resources.as_ref())
                .and_then(|r| r.cpus_by_node.get(node).copied())
                .unwrap_or(0)
        };

        {
            let mut node_table = self.store.node_write().await;
            if let Ok(n) = node_table.get_mut(node) {
                n.jobs_running.remove(&job_id);
                n.cpus_alloc = n.cpus_alloc.saturating_sub(granted_cpus);
                n.recompute_derived_state();
            }
        }

        if rc != 0 {
            let mut node_table = self.store.node_write().await;
            if let Ok(n) = node_table.get_mut(node) {
                n.flags.insert(NodeFlags::DRAIN);
                n.reason = Some(format!("drained after job {job_id} epilog failure"));
            }
        }

        let mut job_table = self.store.job_write().await;
        let job = job_table.get_mut(job_id)?;
        if job.epilog_pending == 0 {
            return Ok(()); // duplicate report after job already finalized
        }
        if rc != 0 {
            job.flags.insert(JobFlags::REQUEUE);
        }
        job.epilog_pending -= 1;
        if job.epilog_pending == 0 {
            let requeue = job.flags.contains(JobFlags::REQUEUE);
            job.flags.remove(JobFlags::COMPLETING);
            job.flags.remove(JobFlags::REQUEUE);
            if requeue {
                job.restart_cnt += 1;
                job.requeue_to_pending()?;
                tracing::info!(job_id, "epilog complete on all nodes, job requeued to pending");
            } else {
                tracing::info!(job_id, "epilog complete on all nodes, job fully reconciled");
            }
        }
        Ok(())
    }

    /// Batch script step finished. Classifies the exit code and either
    /// finalizes the job as Complete, requeues it, drains the offending
    /// node and requeues, or marks it Failed. The Requeue/DrainNode
    /// outcomes land the job in a terminal state with the REQUEUE modifier
    /// set; once every node's epilog has reported, [`Self::epilog_complete`]
    /// carries it the rest of the way back to Pending.
    pub async fn batch_complete(&self, job_id: u32, exit_code: i32) -> ControllerResult<CompletionOutcome> {
        self.complete_with_exit_code(job_id, exit_code).await
    }

    /// Generic job-driver completion report: unlike `batch_complete` (which
    /// is specifically the batch script launcher reporting script_rc /
    /// slurmd_rc), this is the single-`rc` completion path a non-batch job
    /// driver uses to tell the controller the job ended (spec.md §4.8
    /// `job_complete(job, rc)`). Exit-code classification is identical.
    pub async fn job_complete(&self, job_id: u32, rc: i32) -> ControllerResult<CompletionOutcome> {
        self.complete_with_exit_code(job_id, rc).await
    }

    async fn complete_with_exit_code(&self, job_id: u32, exit_code: i32) -> ControllerResult<CompletionOutcome> {
        if exit_code == 0 {
            self.start_job_completion(job_id, JobState::Complete, false).await?;
            return Ok(CompletionOutcome::Success);
        }

        let outcome = classify_exit(exit_code);
        match outcome {
            CompletionOutcome::Fatal => {
                self.start_job_completion(job_id, JobState::Failed, false).await?;
            }
            CompletionOutcome::Requeue => {
                self.start_job_completion(job_id, JobState::Failed, true).await?;
            }
            CompletionOutcome::DrainNode => {
                self.drain_job_nodes(job_id).await?;
                self.start_job_completion(job_id, JobState::NodeFail, true).await?;
            }
        }
        Ok(outcome)
    }

    async fn drain_job_nodes(&self, job_id: u32) -> ControllerResult<()> {
        let node_names: Vec<String> = {
            let job_table = self.store.job_read().await;
            job_table.get(job_id)?.node_bitmap.iter().cloned().collect()
        };
        let mut node_table = self.store.node_write().await;
        for name in node_names {
            if let Ok(node) = node_table.get_mut(&name) {
                node.flags.insert(NodeFlags::DRAIN);
                node.reason = Some(format!("drained after job {job_id} failure"));
            }
        }
        Ok(())
    }

    /// A user SIGKILL or admin cancel: any live state moves to Cancelled
    /// with Completing set (spec.md §4.4). Returns the job's granted nodes
    /// so the caller can queue an outbound kill message to each one.
    pub async fn cancel_job(&self, job_id: u32) -> ControllerResult<Vec<String>> {
        let nodes: Vec<String> = {
            let job_table = self.store.job_read().await;
            let job = job_table.get(job_id)?;
            if job.state.is_terminal() {
                return Err(ControllerError::AlreadyDone);
            }
            job.node_bitmap.iter().cloned().collect()
        };
        self.start_job_completion(job_id, JobState::Cancelled, false).await?;
        Ok(nodes)
    }

    async fn start_job_completion(&self, job_id: u32, target: JobState, requeue: bool) -> ControllerResult<()> {
        let node_count = {
            let mut job_table = self.store.job_write().await;
            let job = job_table.get_mut(job_id)?;
            job.flags.insert(JobFlags::COMPLETING);
            if requeue {
                job.flags.insert(JobFlags::REQUEUE);
            }
            job.transition_to(target)?;
            job.end_time = Some(crate::time::now());
            let count = job.node_bitmap.len() as u32;
            job.epilog_pending = count;
            count
        };

        if node_count == 0 {
            // No nodes ever granted (e.g. cancelled while Pending): finalize now.
            let mut job_table = self.store.job_write().await;
            let job = job_table.get_mut(job_id)?;
            let pending_requeue = job.flags.contains(JobFlags::REQUEUE);
            job.flags.remove(JobFlags::COMPLETING);
            job.flags.remove(JobFlags::REQUEUE);
            if pending_requeue {
                job.restart_cnt += 1;
                job.requeue_to_pending()?;
            }
        }

        let job_table = self.store.job_read().await;
        let job = job_table.get(job_id)?;
        self.accounting.record_job_end(job).await.ok();
        Ok(())
    }
}
