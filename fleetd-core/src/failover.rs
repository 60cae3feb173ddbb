//! Primary/backup controller failover (Supplemented Features), simplified
//! from the teacher's `LeaderElection`: exactly two roles, driven by an
//! explicit takeover RPC rather than a lease renewal loop, since only one
//! standby ever exists in this system.

use crate::error::{ControllerError, ControllerResult};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    Primary,
    Backup,
}

pub struct FailoverState {
    role: Mutex<ControllerRole>,
    node_name: String,
}

impl FailoverState {
    pub fn new(node_name: String, starts_as: ControllerRole) -> Self {
        Self {
            role: Mutex::new(starts_as),
            node_name,
        }
    }

    pub fn role(&self) -> ControllerRole {
        *self.role.lock()
    }

    pub fn is_primary(&self) -> bool {
        self.role() == ControllerRole::Primary
    }

    /// A backup controller takes over as primary. No-op if already primary,
    /// rejected for a primary trying to "take over" itself via RPC replay.
    pub fn takeover(&self) -> ControllerResult<()> {
        let mut role = self.role.lock();
        if *role == ControllerRole::Primary {
            return Err(ControllerError::AlreadyDone);
        }
        tracing::warn!(node = %self.node_name, "controller taking over as primary");
        *role = ControllerRole::Primary;
        Ok(())
    }

    /// Step down to backup, e.g. on graceful handoff back to the original
    /// primary once it recovers.
    pub fn step_down(&self) {
        let mut role = self.role.lock();
        *role = ControllerRole::Backup;
    }
}
