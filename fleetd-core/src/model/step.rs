//! Job step entity (C7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    Pending,
    Running,
    Complete,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub job_id: u32,
    pub step_id: u32,
    pub state: StepState,
    /// Node name -> core bitmap (one bit per core granted on that node).
    pub core_bitmap_by_node: BTreeMap<String, Vec<bool>>,
    pub mem_limit_mb: Option<u64>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Nodes that have not yet reported step completion.
    pub pending_nodes: std::collections::BTreeSet<String>,
    pub exit_code: Option<i32>,
}

impl Step {
    pub fn new(job_id: u32, step_id: u32, core_bitmap_by_node: BTreeMap<String, Vec<bool>>, start_time: DateTime<Utc>) -> Self {
        let pending_nodes = core_bitmap_by_node.keys().cloned().collect();
        Self {
            job_id,
            step_id,
            state: StepState::Running,
            core_bitmap_by_node,
            mem_limit_mb: None,
            start_time,
            end_time: None,
            pending_nodes,
            exit_code: None,
        }
    }

    /// Every node a step runs on must be a subset of the owning job's node
    /// bitmap (spec.md testable property 3).
    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.core_bitmap_by_node.keys()
    }

    pub fn is_complete(&self) -> bool {
        self.pending_nodes.is_empty()
    }
}
