//! Domain entities (C3): job, step, node, frontend, partition, reservation,
//! and the signed credential that binds a step to the nodes running it.

pub mod credential;
pub mod frontend;
pub mod job;
pub mod node;
pub mod partition;
pub mod reservation;
pub mod step;

pub use credential::{CredentialClaims, SignedCredential};
pub use frontend::{FrontEnd, FrontEndState};
pub use job::{Job, JobFlags, JobReason, JobRequest, JobResources, JobState};
pub use node::{Node, NodeFlags, NodeState};
pub use partition::{Partition, PartitionState};
pub use reservation::Reservation;
pub use step::{Step, StepState};
