//! The scheduler: a Chase-Lev work-stealing concurrency engine (C1-C4)
//! feeding a pooled, version-tagged job graph (C5-C6) through a Lin et
//! al. adaptive worker loop (C7), with a parallel-for driver (C8) built
//! entirely out of the same primitives.

pub mod config;
pub mod deque;
pub mod job;
pub mod notifier;
pub mod parallel_for;
pub mod pool;
pub mod range_deque;
pub mod scheduler;

pub use self::config::Config;
pub use self::job::Handle;
pub use self::parallel_for::ParallelForJob;
pub use self::scheduler::Scheduler;
