//! The pooled, version-tagged job record (C5) and the opaque handle
//! callers use to refer to one scheduling of it (C6).
//!
//! Grounded on the teacher's `src/utils/handle.rs` (index + version pair)
//! and `src/sched/latch.rs::LockLatch` (the wait-event primitive), with the
//! dependency/continuation bookkeeping grounded on the pack's
//! `ze_jobsystem` reference file (`unfinished_jobs`, `continuations`,
//! cascading `finish()`).

use std::any::Any;
use std::sync::{Condvar, Mutex};

pub type JobIndex = u32;

/// The `(pool-index, version)` pair identifying one scheduling of one
/// user job. Stale as soon as the underlying record is re-pooled and
/// reissued (§3 invariant 7/P7): index reuse bumps the version, so an old
/// `Handle` can never alias a new scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub(crate) index: JobIndex,
    pub(crate) version: u32,
    pub(crate) scheduler_id: usize,
}

impl Handle {
    pub(crate) fn new(index: JobIndex, version: u32, scheduler_id: usize) -> Self {
        Handle {
            index,
            version,
            scheduler_id,
        }
    }

    pub fn index(&self) -> JobIndex {
        self.index
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

/// A manual-reset wait event. Reused across the lifetime of a pooled
/// slot: `reset` clears it back to unsignaled the moment a record is
/// reissued.
pub(crate) struct WaitEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl WaitEvent {
    fn new() -> Self {
        WaitEvent {
            signaled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn reset(&self) {
        *self.signaled.lock().unwrap() = false;
    }

    pub fn signal(&self) {
        *self.signaled.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    pub fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        while !*signaled {
            signaled = self.condvar.wait(signaled).unwrap();
        }
    }
}

/// The mutable state guarded by a job's lock (spec.md §3's `version`,
/// `dependency_count`, `dependents`, `is_complete`, `wait_subscription_count`
/// fields).
pub(crate) struct JobState {
    pub version: u32,
    pub work: Option<Box<dyn FnOnce() + Send>>,
    pub dependency_count: u32,
    pub dependents: Vec<JobIndex>,
    pub is_complete: bool,
    pub wait_subscription_count: u32,
    pub panic: Option<Box<dyn Any + Send>>,
}

impl JobState {
    fn fresh(version: u32) -> Self {
        JobState {
            version,
            work: None,
            dependency_count: 0,
            dependents: Vec::new(),
            is_complete: false,
            wait_subscription_count: 0,
            panic: None,
        }
    }
}

/// A single pooled job record. `version` inside the guarded state
/// disambiguates reused slots (§3, §9 "Cyclic references between jobs").
pub(crate) struct JobRecord {
    pub state: Mutex<JobState>,
    pub wait_event: WaitEvent,
}

impl JobRecord {
    /// Constructs a record in its "just returned from a fresh allocation"
    /// state: version 0, so the first `issue` bumps it to 1 (version 0 is
    /// never handed out, so a default-constructed `Handle` is always
    /// stale).
    pub fn new() -> Self {
        JobRecord {
            state: Mutex::new(JobState::fresh(0)),
            wait_event: WaitEvent::new(),
        }
    }

    /// Resets a record for a new scheduling and returns the version to
    /// stamp into the caller's `Handle`.
    pub fn issue(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.version += 1;
        state.work = None;
        state.dependency_count = 0;
        state.dependents.clear();
        state.is_complete = false;
        state.wait_subscription_count = 0;
        state.panic = None;
        self.wait_event.reset();
        state.version
    }
}
