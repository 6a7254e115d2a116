//! Scheduler construction options (§6 "Construction configuration").
//!
//! Not part of the algorithmic core, but every ambient knob a caller can
//! set; sizing off `num_cpus` is grounded on the pack's `ze_jobsystem`
//! reference file, which resolves "one worker per hardware thread" the
//! same way.

/// Tunables for [`crate::Scheduler::new`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads to spawn. `0` resolves to
    /// `num_cpus::get()`.
    pub thread_count: u32,
    /// Job-pool capacity pre-allocated at construction; also the ceiling
    /// once `strict_allocation` is set.
    pub max_concurrent_jobs: usize,
    /// When `true`, `schedule*` return `Error::PoolExhausted` instead of
    /// growing the pool past `max_concurrent_jobs` (P6).
    pub strict_allocation: bool,
    /// Cosmetic prefix used to name spawned worker threads.
    pub thread_name_prefix: String,
}

impl Config {
    pub(crate) fn resolved_thread_count(&self) -> usize {
        if self.thread_count == 0 {
            ::num_cpus::get().max(1)
        } else {
            self.thread_count as usize
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            thread_count: 0,
            max_concurrent_jobs: 4096,
            strict_allocation: false,
            thread_name_prefix: "jobweave-worker".to_string(),
        }
    }
}
