//! Controller core for a cluster workload manager: entity store, lock
//! domain, RPC dispatch, scheduling pipeline, step/credential management,
//! completion reconciliation, node health, reservations, and failover.

pub mod admin;
pub mod collaborators;
pub mod completion;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod failover;
pub mod health;
pub mod lock;
pub mod model;
pub mod reservation_manager;
pub mod resilience;
pub mod scheduler;
pub mod step_manager;
pub mod store;
pub mod telemetry;
pub mod time;

pub use controller::Controller;
pub use error::{ControllerError, ControllerResult};
