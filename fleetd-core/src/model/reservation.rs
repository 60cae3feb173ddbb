//! Reservation entity: a node-time rectangle held for a user/account/flag
//! combination (spec.md §3, C10).

use crate::error::{ControllerError, ControllerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub name: String,
    pub nodes: HashSet<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub users: Vec<u32>,
    pub accounts: Vec<String>,
    pub flags_maint: bool,
    pub flags_overlap: bool,
}

impl Reservation {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        at >= self.start_time && at < self.end_time
    }

    /// Two reservations conflict if they share any node and their
    /// [start,end) intervals overlap, unless either explicitly allows
    /// overlap, or their user sets are disjoint or one is a subset of the
    /// other (spec.md §4.10 reservation overlap rule).
    pub fn conflicts_with(&self, other: &Reservation) -> bool {
        if self.flags_overlap || other.flags_overlap {
            return false;
        }
        let shares_node = self.nodes.intersection(&other.nodes).next().is_some();
        let time_overlaps = self.start_time < other.end_time && other.start_time < self.end_time;
        if !shares_node || !time_overlaps {
            return false;
        }
        !self.user_sets_compatible(other)
    }

    /// An empty user list means the reservation is unrestricted (covers
    /// every user), so it can never be disjoint from or a subset of
    /// another reservation's user set.
    fn user_sets_compatible(&self, other: &Reservation) -> bool {
        if self.users.is_empty() || other.users.is_empty() {
            return false;
        }
        let a: HashSet<&u32> = self.users.iter().collect();
        let b: HashSet<&u32> = other.users.iter().collect();
        a.is_disjoint(&b) || a.is_subset(&b) || b.is_subset(&a)
    }

    /// Enforces the §4.10 temporal invariants: `start_time < end_time`, and
    /// a reservation entirely in the past is rejected unless `flags_maint`
    /// is set (maintenance reservations may be backdated for bookkeeping).
    pub fn validate_window(&self, now: DateTime<Utc>) -> ControllerResult<()> {
        if self.start_time >= self.end_time {
            return Err(ControllerError::InvalidReservationWindow(format!(
                "reservation {} has start_time >= end_time",
                self.name
            )));
        }
        if !self.flags_maint && self.end_time <= now {
            return Err(ControllerError::InvalidReservationWindow(format!(
                "reservation {} lies entirely in the past",
                self.name
            )));
        }
        Ok(())
    }
}
