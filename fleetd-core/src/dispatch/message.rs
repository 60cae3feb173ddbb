//! Wire message envelope (C5).
//!
//! `msg_type` values are grouped into numbered ranges and are append-only:
//! once assigned a number is never reused or renumbered, so old clients
//! talking to a newer controller (or vice versa) fail on an unknown type
//! rather than misinterpreting a repurposed one (spec.md §6).

use serde::{Deserialize, Serialize};

/// Request message types, numbered by functional family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum MsgType {
    // 1001-1999: job family
    JobSubmit = 1001,
    JobWillRun = 1002,
    JobCancel = 1003,
    JobRequeue = 1004,
    JobAllocate = 1005,
    JobInfoRequest = 1006,
    JobUpdate = 1007,

    // 2001-2999: step family
    StepCreate = 2001,
    StepCredential = 2002,
    StepComplete = 2003,
    StepLayout = 2004,

    // 3001-3999: node registration / health family
    NodeRegister = 3001,
    NodeConfigure = 3002,
    NodeReboot = 3003,
    PingRequest = 3004,

    // 4001-4999: completion family
    EpilogComplete = 4001,
    BatchComplete = 4002,
    PrologComplete = 4003,
    JobComplete = 4004,

    // 5001-5999: reservation family
    ReservationCreate = 5001,
    ReservationUpdate = 5002,
    ReservationDelete = 5003,
    ReservationInfoRequest = 5004,

    // 6001-6999: control / admin family
    ReconfigureRequest = 6001,
    ShutdownRequest = 6002,
    TakeoverRequest = 6003,
    SetDebugFlags = 6004,
    SetDebugLevel = 6005,
    SetSchedlogLevel = 6006,

    // 10001-...: forward-compatible catch-all reserved for unknown-at-build
    // future additions (spec.md §6); never dispatched, only recognized.
    ReservedFuture = 10001,
}

/// Special node-rank sentinel meaning "no forwarding tree, send directly."
pub const FORWARD_NONE: u16 = 0xfffe;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingDescriptor {
    /// Rank of this node in the fan-out tree, or [`FORWARD_NONE`].
    pub rank: u16,
    pub children: Vec<String>,
    pub timeout_ms: u32,
}

impl ForwardingDescriptor {
    pub fn direct() -> Self {
        Self {
            rank: FORWARD_NONE,
            children: Vec::new(),
            timeout_ms: 0,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.rank == FORWARD_NONE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    pub msg_type: MsgType,
    pub version: u16,
    pub auth_uid: Option<u32>,
    pub forwarding: ForwardingDescriptor,
}

impl MessageHeader {
    pub fn direct(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            version: 1,
            auth_uid: None,
            forwarding: ForwardingDescriptor::direct(),
        }
    }
}
