//! Clock & Identifiers (C1).
//!
//! Monotonic wall time plus job/step id allocation. Ids are never reused
//! while a record with that id still exists: the allocator is handed the
//! live id set on every wraparound search rather than trusting a bare
//! counter.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Monotonic job id allocator with wraparound + gap search, recovered from
/// state-save on startup via `restore_from`.
pub struct JobIdAllocator {
    inner: Mutex<JobIdState>,
}

struct JobIdState {
    next: u32,
    max: u32,
}

impl JobIdAllocator {
    pub fn new(max_job_id: u32) -> Self {
        Self {
            inner: Mutex::new(JobIdState { next: 1, max: max_job_id }),
        }
    }

    pub fn restore_from(max_job_id: u32, last_issued: u32) -> Self {
        Self {
            inner: Mutex::new(JobIdState {
                next: last_issued.wrapping_add(1).max(1),
                max: max_job_id,
            }),
        }
    }

    /// Allocate the next free id, given the set of currently-live ids.
    /// Wraps at `max` and searches for the first gap rather than erroring.
    pub fn alloc(&self, live_ids: &dyn Fn(u32) -> bool) -> Option<u32> {
        let mut state = self.inner.lock();
        let start = state.next;
        let mut candidate = start;
        loop {
            if candidate == 0 {
                candidate = 1;
            }
            if !live_ids(candidate) {
                state.next = if candidate >= state.max { 1 } else { candidate + 1 };
                return Some(candidate);
            }
            candidate = if candidate >= state.max { 1 } else { candidate + 1 };
            if candidate == start {
                return None; // id space exhausted
            }
        }
    }
}

/// Per-job monotonic step id allocator.
#[derive(Default)]
pub struct StepIdAllocator {
    next_by_job: Mutex<HashMap<u32, u32>>,
}

impl StepIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&self, job_id: u32) -> u32 {
        let mut map = self.next_by_job.lock();
        let entry = map.entry(job_id).or_insert(0);
        let id = *entry;
        *entry += 1;
        id
    }

    /// Drop bookkeeping for a job once it is deleted from the entity store.
    pub fn forget(&self, job_id: u32) {
        self.next_by_job.lock().remove(&job_id);
    }
}
