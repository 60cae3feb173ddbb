//! Authorization tiers and privacy masking (C5).

use crate::model::Job;
use fleetd_config::PrivacyMask;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthTier {
    User,
    Operator,
    SuperUser,
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
    pub tier: AuthTier,
    /// Set for connections authenticated as the slurm-user (the node agent's
    /// own identity), distinct from the {user, operator, super-user} tiers:
    /// registration/completion RPCs require this rather than a tier
    /// (spec.md §4.5 "node-origin RPCs require the slurm-user identity").
    pub is_node_agent: bool,
}

impl Identity {
    pub fn user(uid: u32, gid: u32) -> Self {
        Self { uid, gid, tier: AuthTier::User, is_node_agent: false }
    }

    pub fn node_agent() -> Self {
        Self { uid: 0, gid: 0, tier: AuthTier::SuperUser, is_node_agent: true }
    }

    pub fn owns(&self, job: &Job) -> bool {
        self.uid == job.user_id
    }

    /// True when this identity may issue administrative RPCs (reconfigure,
    /// shutdown, set_debug_*) against the controller.
    pub fn is_at_least(&self, required: AuthTier) -> bool {
        self.tier >= required
    }

    /// A job is visible to its owner and to anyone at or above operator
    /// tier, unless the privacy mask additionally restricts job visibility
    /// to super-users only (spec.md §5 privacy mask rule).
    pub fn may_view(&self, job: &Job, mask: &PrivacyMask) -> bool {
        if self.owns(job) {
            return true;
        }
        if mask.private_data_jobs {
            return self.tier >= AuthTier::SuperUser;
        }
        self.tier >= AuthTier::Operator
    }
}
