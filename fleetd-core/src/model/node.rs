//! Node entity and its state machine (C3/C4).

use crate::error::{ControllerError, ControllerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Unknown,
    Down,
    Idle,
    Allocated,
    /// Hosting work but reporting a fault (e.g. a step exited due to node
    /// infrastructure failure rather than job failure); distinct from
    /// `Down` because the node may still be responding to heartbeats.
    Error,
    Mixed,
    Future,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

bitflags::bitflags! {
    /// Modifier flags, OR-ed with the base state (spec.md §4.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NodeFlags: u16 {
        const DRAIN       = 0b0000_0001;
        const COMPLETING  = 0b0000_0010;
        const NO_RESPOND  = 0b0000_0100;
        const FAIL        = 0b0000_1000;
        const POWER_SAVE  = 0b0001_0000;
        const MAINTENANCE = 0b0010_0000;
        const REBOOT      = 0b0100_0000;
        const POWER_UP    = 0b1000_0000;
        const CLOUD       = 0b0001_0000_0000;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        NodeFlags::empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub state: NodeState,
    pub flags: NodeFlags,
    pub cpus_total: u32,
    pub cpus_alloc: u32,
    pub mem_total_mb: u64,
    pub mem_alloc_mb: u64,
    pub features: Vec<String>,
    pub gres: Vec<String>,
    pub partitions: Vec<String>,
    pub weight: u32,
    pub jobs_running: HashSet<u32>,
    pub last_response: Option<DateTime<Utc>>,
    pub boot_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl Node {
    pub fn new(name: String, cpus_total: u32, mem_total_mb: u64, weight: u32) -> Self {
        Self {
            name,
            state: NodeState::Unknown,
            flags: NodeFlags::empty(),
            cpus_total,
            cpus_alloc: 0,
            mem_total_mb,
            mem_alloc_mb: 0,
            features: Vec::new(),
            gres: Vec::new(),
            partitions: Vec::new(),
            weight,
            jobs_running: HashSet::new(),
            last_response: None,
            boot_time: None,
            reason: None,
        }
    }

    pub fn cpus_free(&self) -> u32 {
        self.cpus_total.saturating_sub(self.cpus_alloc)
    }

    pub fn mem_free_mb(&self) -> u64 {
        self.mem_total_mb.saturating_sub(self.mem_alloc_mb)
    }

    /// *Draining* = Drain ∧ (cpus_alloc > 0) (spec.md §4.4).
    pub fn is_draining(&self) -> bool {
        self.flags.contains(NodeFlags::DRAIN) && self.cpus_alloc > 0
    }

    /// *Drained* = Drain ∧ ¬Draining (spec.md §4.4).
    pub fn is_drained(&self) -> bool {
        self.flags.contains(NodeFlags::DRAIN) && !self.is_draining()
    }

    pub fn is_responding(&self) -> bool {
        !self.flags.contains(NodeFlags::NO_RESPOND)
    }

    /// True when the node may accept new job allocations.
    pub fn is_schedulable(&self) -> bool {
        matches!(self.state, NodeState::Idle | NodeState::Mixed)
            && !self.flags.intersects(
                NodeFlags::DRAIN | NodeFlags::NO_RESPOND | NodeFlags::FAIL | NodeFlags::MAINTENANCE,
            )
    }

    fn can_transition_to(self_state: NodeState, target: NodeState) -> bool {
        use NodeState::*;
        match (self_state, target) {
            (Unknown, Down | Idle | Allocated | Mixed) => true,
            (Down, Idle | Future) => true,
            (Idle, Allocated | Mixed | Down | Error) => true,
            (Mixed, Allocated | Idle | Down | Error) => true,
            (Allocated, Mixed | Idle | Down | Error) => true,
            (Error, Idle | Down | Mixed | Allocated) => true,
            (Future, Down | Idle) => true,
            _ => false,
        }
    }

    pub fn transition_to(&mut self, target: NodeState) -> ControllerResult<()> {
        if self.state == target {
            return Ok(());
        }
        if !Self::can_transition_to(self.state, target) {
            return Err(ControllerError::Internal(format!(
                "illegal node transition {:?} -> {:?}",
                self.state, target
            )));
        }
        tracing::info!(node = %self.name, from = ?self.state, to = ?target, "node state transition");
        self.state = target;
        Ok(())
    }

    /// Recompute the base state from current allocation counters, the way
    /// the teacher's allocator derives derived node status from load rather
    /// than storing it independently (spec.md §4.4 derived-state rule).
    pub fn recompute_derived_state(&mut self) {
        if !self.is_responding() || self.flags.contains(NodeFlags::FAIL) {
            let _ = self.transition_to(NodeState::Down);
            return;
        }
        let next = if self.cpus_alloc == 0 {
            NodeState::Idle
        } else if self.cpus_alloc >= self.cpus_total {
            NodeState::Allocated
        } else {
            NodeState::Mixed
        };
        let _ = self.transition_to(next);
    }

    pub fn check_allocation_integrity(&self) -> ControllerResult<()> {
        if self.cpus_alloc > self.cpus_total {
            return Err(ControllerError::Internal(format!(
                "node {} cpus_alloc {} exceeds cpus_total {}",
                self.name, self.cpus_alloc, self.cpus_total
            )));
        }
        if self.mem_alloc_mb > self.mem_total_mb {
            return Err(ControllerError::Internal(format!(
                "node {} mem_alloc {} exceeds mem_total {}",
                self.name, self.mem_alloc_mb, self.mem_total_mb
            )));
        }
        Ok(())
    }
}
