//! Controller-wide error type.
//!
//! Variants map 1:1 onto the wire return codes enumerated in spec.md §4.5
//! and §7. Infrastructure-only variants (`StatePersistence`,
//! `ExternalSystem`, `Internal`) never cross the wire verbatim — the
//! dispatcher logs them and returns `Unexpected` to the caller.

use thiserror::Error;

pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("no user id associated with this connection")]
    UserIdMissing,

    #[error("access denied")]
    AccessDenied,

    #[error("invalid job id {0}")]
    InvalidJobId(u32),

    #[error("invalid node name {0}")]
    InvalidNodeName(String),

    #[error("request already satisfied")]
    AlreadyDone,

    #[error("feature disabled for current state: {0}")]
    Disabled(String),

    #[error("operation already in progress")]
    InProgress,

    #[error("no change in data")]
    NoChangeInData,

    #[error("job cannot start immediately")]
    CanNotStartImmediately,

    #[error("reservation busy")]
    ReservationBusy,

    #[error("resource busy")]
    ResourceBusy,

    #[error("duplicate job id {0}")]
    DuplicateJobId(u32),

    #[error("no nodes available for request")]
    NodeNotAvail,

    #[error("partition configuration unavailable")]
    PartConfigUnavailable,

    #[error("QOS threshold exceeded")]
    QosThreshold,

    #[error("job is held")]
    JobHeld,

    #[error("prolog still running for job")]
    PrologRunning,

    #[error("credential is invalid")]
    CredentialInvalid,

    #[error("unexpected internal condition")]
    Unexpected,

    #[error("invalid reservation window: {0}")]
    InvalidReservationWindow(String),

    // --- infrastructure-only, never surfaced verbatim ---
    #[error("state persistence error: {0}")]
    StatePersistence(String),

    #[error("external system error: {0}")]
    ExternalSystem(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// True for the transient-capacity family spec.md §7 says should be
    /// reported as *success* (job stays Pending) for non-immediate submits.
    pub fn is_transient_capacity(&self) -> bool {
        matches!(
            self,
            ControllerError::NodeNotAvail
                | ControllerError::PartConfigUnavailable
                | ControllerError::QosThreshold
                | ControllerError::JobHeld
        )
    }

    /// Numeric wire return code. Stable across releases; new codes are
    /// appended, never renumbered (spec.md §6 forward-compat rule).
    pub fn wire_code(&self) -> u32 {
        use ControllerError::*;
        match self {
            UserIdMissing => 1,
            AccessDenied => 2,
            InvalidJobId(_) => 3,
            InvalidNodeName(_) => 4,
            AlreadyDone => 5,
            Disabled(_) => 6,
            InProgress => 7,
            NoChangeInData => 8,
            CanNotStartImmediately => 9,
            ReservationBusy => 10,
            ResourceBusy => 11,
            DuplicateJobId(_) => 12,
            NodeNotAvail => 13,
            PartConfigUnavailable => 14,
            QosThreshold => 15,
            JobHeld => 16,
            PrologRunning => 17,
            CredentialInvalid => 18,
            InvalidReservationWindow(_) => 19,
            Unexpected | StatePersistence(_) | ExternalSystem(_) | Internal(_) => 9999,
        }
    }
}

impl From<std::io::Error> for ControllerError {
    fn from(err: std::io::Error) -> Self {
        ControllerError::StatePersistence(err.to_string())
    }
}

impl From<sled::Error> for ControllerError {
    fn from(err: sled::Error) -> Self {
        ControllerError::StatePersistence(err.to_string())
    }
}

impl From<serde_json::Error> for ControllerError {
    fn from(err: serde_json::Error) -> Self {
        ControllerError::StatePersistence(format!("serialization error: {err}"))
    }
}
