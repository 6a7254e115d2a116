//! Pooled job-record storage (C5): a fixed-capacity ring that grows only
//! on overflow, so the steady-state scheduling path never calls into the
//! global allocator beyond what the user's own work does.
//!
//! Grounded on the teacher's `src/utils/object_pool.rs` / `handle_pool.rs`
//! (free-list-backed, version-tagged slots) and the pack's `ze_jobsystem`
//! reference file, which sizes its job pool up front and only grows it
//! lazily.

use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};

use crate::errors::{Error, Result};
use crate::sched::job::{Handle, JobIndex, JobRecord};

pub(crate) struct JobPool {
    scheduler_id: usize,
    max_concurrent_jobs: usize,
    strict_allocation: bool,
    records: RwLock<Vec<Arc<JobRecord>>>,
    free: Mutex<Vec<JobIndex>>,
}

impl JobPool {
    pub fn new(
        scheduler_id: usize,
        initial_capacity: usize,
        max_concurrent_jobs: usize,
        strict_allocation: bool,
    ) -> Self {
        let mut records = Vec::with_capacity(initial_capacity);
        let mut free = Vec::with_capacity(initial_capacity);
        for i in 0..initial_capacity {
            records.push(Arc::new(JobRecord::new()));
            free.push(i as JobIndex);
        }
        free.reverse(); // pop() hands out index 0 first
        JobPool {
            scheduler_id,
            max_concurrent_jobs,
            strict_allocation,
            records: RwLock::new(records),
            free: Mutex::new(free),
        }
    }

    pub fn scheduler_id(&self) -> usize {
        self.scheduler_id
    }

    pub fn get(&self, index: JobIndex) -> Arc<JobRecord> {
        self.records.read().unwrap()[index as usize].clone()
    }

    /// Pops a free slot, growing the backing storage if none remain.
    /// Under `strict_allocation`, growth past `max_concurrent_jobs` fails
    /// with `PoolExhausted` instead (P6).
    pub fn allocate(&self) -> Result<(Handle, Arc<JobRecord>)> {
        let index = {
            let mut free = self.free.lock().unwrap();
            match free.pop() {
                Some(i) => i,
                None => {
                    let mut records = self.records.write().unwrap();
                    let next = records.len();
                    if self.strict_allocation && next >= self.max_concurrent_jobs {
                        return Err(Error::PoolExhausted { in_flight: next });
                    }
                    if next >= self.max_concurrent_jobs {
                        warn!(
                            "job pool growing past max_concurrent_jobs ({}); this scheduling \
                             cycle allocates, defeating zero-steady-state-allocation",
                            self.max_concurrent_jobs
                        );
                    } else {
                        debug!(
                            "job pool growing past its initial capacity (slot {})",
                            next
                        );
                    }
                    records.push(Arc::new(JobRecord::new()));
                    next as JobIndex
                }
            }
        };

        let record = self.get(index);
        let version = record.issue();
        Ok((Handle::new(index, version, self.scheduler_id), record))
    }

    /// Returns a completed slot to the free list. Callers must have
    /// already dropped every reference that assumes the record's current
    /// version (invariant 5/6, §3).
    pub fn release(&self, index: JobIndex) {
        self.free.lock().unwrap().push(index);
    }

    pub fn in_flight(&self) -> usize {
        let total = self.records.read().unwrap().len();
        let free = self.free.lock().unwrap().len();
        total - free
    }
}
