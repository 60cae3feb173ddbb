//! Partition entity: a named pool of nodes with scheduling policy (spec.md §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionState {
    Up,
    Down,
    Drain,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub state: PartitionState,
    pub nodes: Vec<String>,
    pub max_time_secs: Option<u64>,
    pub default_time_secs: Option<u64>,
    pub max_nodes_per_job: Option<u32>,
    pub priority_tier: u32,
    pub allow_groups: Vec<String>,
    pub is_default: bool,
}

impl Partition {
    pub fn new(name: String, nodes: Vec<String>) -> Self {
        Self {
            name,
            state: PartitionState::Up,
            nodes,
            max_time_secs: None,
            default_time_secs: Some(3600),
            max_nodes_per_job: None,
            priority_tier: 0,
            allow_groups: Vec::new(),
            is_default: false,
        }
    }

    pub fn accepts_submissions(&self) -> bool {
        matches!(self.state, PartitionState::Up)
    }
}
