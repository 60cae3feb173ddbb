//! FrontEnd entity: a login/submission host the controller tracks for
//! availability, distinct from compute nodes (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrontEndState {
    Unknown,
    Idle,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontEnd {
    pub name: String,
    pub state: FrontEndState,
    pub allow_groups: Vec<String>,
    pub last_response: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl FrontEnd {
    pub fn new(name: String) -> Self {
        Self {
            name,
            state: FrontEndState::Unknown,
            allow_groups: Vec::new(),
            last_response: None,
            reason: None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, FrontEndState::Idle)
    }
}
