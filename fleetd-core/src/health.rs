//! Node registration & health (C9): heartbeat reconciliation plus the
//! NoRespond/Down watchdog.

use crate::model::{JobState, Node, NodeFlags, NodeState};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub struct HealthMonitor {
    store: Arc<Store>,
    agent_timeout: Duration,
    down_grace: Duration,
}

/// Result of a single `register_node` call: the §4.9 step-6 "newly up" flag
/// (used to kick the scheduler) plus any job ids the node reported running
/// that the controller has no record of — the caller tells that node's
/// agent to abort each one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRegistrationOutcome {
    pub newly_up: bool,
    pub abort_job_ids: Vec<u32>,
}

impl HealthMonitor {
    pub fn new(store: Arc<Store>, agent_timeout: Duration, down_grace: Duration) -> Self {
        Self {
            store,
            agent_timeout,
            down_grace,
        }
    }

    /// A node agent checked in. Registers the node if unseen, clears
    /// NoRespond/Fail, reconciles its reported hardware against the node's
    /// configured capacity, and reconciles its reported job set against the
    /// controller's view (spec.md §4.9 steps 3-4): a job the controller
    /// believes running on this node but the report omits is marked failed;
    /// a job the node reports that the controller has no record of is
    /// returned so the caller can tell that node's agent to abort it. A
    /// hardware mismatch drains the node rather than rejecting the
    /// registration outright, so a slightly-off node still joins the pool
    /// for investigation.
    pub async fn register_node(&self, reported: Node) -> NodeRegistrationOutcome {
        let name = reported.name.clone();
        let reported_jobs = reported.jobs_running.clone();

        let previously_known_jobs: Option<HashSet<u32>>;
        let newly_up: bool;
        {
            let mut node_table = self.store.node_write().await;
            match node_table.get_mut(&name) {
                Ok(existing) => {
                    previously_known_jobs = Some(existing.jobs_running.clone());
                    let was_down = matches!(existing.state, NodeState::Down | NodeState::Unknown);

                    let mismatch = existing.cpus_total != reported.cpus_total
                        || existing.mem_total_mb != reported.mem_total_mb;
                    existing.last_response = Some(crate::time::now());
                    existing.flags.remove(NodeFlags::NO_RESPOND);
                    existing.flags.remove(NodeFlags::FAIL);
                    existing.jobs_running = reported_jobs.clone();
                    if mismatch {
                        existing.flags.insert(NodeFlags::DRAIN);
                        existing.reason = Some("hardware mismatch at registration".to_string());
                        tracing::warn!(node = %name, "node hardware mismatch at registration, draining");
                    }
                    existing.recompute_derived_state();
                    newly_up = was_down && existing.state != NodeState::Down;
                }
                Err(_) => {
                    previously_known_jobs = None;
                    let mut node = reported;
                    node.last_response = Some(crate::time::now());
                    node.boot_time = Some(crate::time::now());
                    node_table.insert(node);
                    if let Ok(n) = node_table.get_mut(&name) {
                        n.recompute_derived_state();
                        newly_up = n.state != NodeState::Down;
                    } else {
                        newly_up = false;
                    }
                }
            }
        }

        if let Some(previous) = previously_known_jobs {
            let missing: Vec<u32> = previous.difference(&reported_jobs).copied().collect();
            if !missing.is_empty() {
                let mut job_table = self.store.job_write().await;
                for job_id in missing {
                    if let Ok(job) = job_table.get_mut(job_id) {
                        if job.state == JobState::Running {
                            let _ = job.transition_to(JobState::Failed);
                            tracing::warn!(node = %name, job_id, "job missing from node report, marked failed");
                        }
                    }
                }
            }
        }

        let mut abort_job_ids = Vec::new();
        {
            let job_table = self.store.job_read().await;
            for job_id in &reported_jobs {
                if job_table.get(*job_id).is_err() {
                    abort_job_ids.push(*job_id);
                    tracing::warn!(node = %name, job_id, "node reported unknown job, telling it to abort");
                }
            }
        }

        NodeRegistrationOutcome { newly_up, abort_job_ids }
    }

    /// One pass of the NoRespond/Down watchdog: nodes silent longer than
    /// `agent_timeout` get NoRespond; silent `agent_timeout + down_grace`
    /// get forced Down (spec.md §4.4 watchdog rule).
    pub async fn sweep_unresponsive(&self) -> Vec<String> {
        let now = crate::time::now();
        let mut newly_down = Vec::new();
        let mut node_table = self.store.node_write().await;
        for node in node_table.iter_mut() {
            let Some(last) = node.last_response else { continue };
            let silent_for = now.signed_duration_since(last);
            if silent_for > chrono_duration(self.agent_timeout + self.down_grace) {
                if node.state != NodeState::Down {
                    newly_down.push(node.name.clone());
                }
                node.flags.insert(NodeFlags::NO_RESPOND);
                let _ = node.transition_to(NodeState::Down);
            } else if silent_for > chrono_duration(self.agent_timeout) {
                node.flags.insert(NodeFlags::NO_RESPOND);
                node.recompute_derived_state();
            }
        }
        newly_down
    }

    /// Administrative request to reboot a set of nodes: marks them for
    /// reboot so the next agent heartbeat can act on it, without touching
    /// their schedulability directly.
    pub async fn reboot_nodes(&self, names: &[String]) {
        let mut node_table = self.store.node_write().await;
        for name in names {
            if let Ok(node) = node_table.get_mut(name) {
                node.flags.insert(NodeFlags::REBOOT);
            }
        }
    }

    pub async fn last_response_of(&self, name: &str) -> Option<DateTime<Utc>> {
        let node_table = self.store.node_read().await;
        node_table.get(name).ok().and_then(|n| n.last_response)
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::seconds(d.as_secs() as i64)
}
