//! External collaborator interfaces: everything the controller core talks
//! to through a trait boundary instead of a concrete dependency, mirroring
//! how the teacher isolates its `SchedulerPlugin`-style extension points
//! behind traits in `security` and `resource`.

pub mod accounting;
pub mod agent_queue;
pub mod auth_backend;
pub mod signer;
pub mod state_save;

use crate::dispatch::Identity;
use crate::error::ControllerResult;
use crate::model::{Job, Node, SignedCredential};
use async_trait::async_trait;

pub use accounting::{GuardedAccountingSink, NullAccountingSink};
pub use agent_queue::{AgentMessage, AgentQueue};
pub use auth_backend::SharedSecretAuth;
pub use signer::Ed25519CredentialSigner;
pub use state_save::SledStateSave;

/// Verifies wire credentials presented by a connecting client (spec.md C5).
#[async_trait]
pub trait Authentication: Send + Sync {
    async fn authenticate(&self, token: &[u8]) -> ControllerResult<Identity>;
}

/// Encodes/decodes RPC payloads on the wire. Kept separate from transport so
/// alternate encodings can be swapped without touching handler code.
pub trait WireCodec<T>: Send + Sync {
    fn encode(&self, value: &T) -> ControllerResult<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> ControllerResult<T>;
}

/// Signs and verifies job step credentials (C7).
#[async_trait]
pub trait CredentialSigner: Send + Sync {
    async fn sign(&self, claims: crate::model::CredentialClaims) -> ControllerResult<SignedCredential>;
    async fn verify(&self, credential: &SignedCredential) -> ControllerResult<()>;
    /// Roll to a new signing key; previously issued credentials signed by
    /// an old key must still verify until they expire.
    async fn rotate_key(&self) -> ControllerResult<()>;
}

/// Best-effort usage-accounting sink (job start/end records). Failures here
/// must never block job progress, only be logged (spec.md non-goal: no
/// accounting durability guarantee).
#[async_trait]
pub trait AccountingSink: Send + Sync {
    async fn record_job_start(&self, job: &Job) -> ControllerResult<()>;
    async fn record_job_end(&self, job: &Job) -> ControllerResult<()>;
}

/// Durable controller state (shadow-file-plus-rename semantics) independent
/// of the in-memory entity store, used for crash recovery (C11).
#[async_trait]
pub trait StateSave: Send + Sync {
    async fn save_jobs(&self, jobs: &[Job]) -> ControllerResult<()>;
    async fn load_jobs(&self) -> ControllerResult<Vec<Job>>;
    async fn save_nodes(&self, nodes: &[Node]) -> ControllerResult<()>;
    async fn load_nodes(&self) -> ControllerResult<Vec<Node>>;
}

/// Pluggable job priority function (spec.md Supplemented Features).
pub trait PriorityPlugin: Send + Sync {
    fn priority(&self, job: &Job) -> u64;
}

/// Pluggable alternative to the built-in node-selection algorithm.
pub trait SchedulerPlugin: Send + Sync {
    fn select_nodes<'a>(&self, job: &Job, candidates: Vec<&'a Node>) -> Option<Vec<&'a Node>>;
}

/// Pluggable network-topology-aware node ordering (used to bias selection
/// toward topologically close nodes; a no-op plugin is the default).
pub trait TopologyPlugin: Send + Sync {
    fn order_by_locality<'a>(&self, nodes: Vec<&'a Node>) -> Vec<&'a Node>;
}
