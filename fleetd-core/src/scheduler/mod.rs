//! Scheduling pipeline (C6): node selection plus the submit/allocate/
//! will-run/requeue/kick operations exposed to the dispatcher.

pub mod pipeline;
pub mod selection;

pub use pipeline::{SchedulerPipeline, WillRunResult};
