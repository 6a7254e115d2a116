//! A zero-allocation task scheduler with dependency graphs: a
//! work-stealing concurrency engine plus a pooled, version-tagged job
//! graph, aimed at game-loop / ECS-style workloads — tens to tens of
//! thousands of short jobs scheduled from one producer thread and run
//! cooperatively by a fixed worker pool.
//!
//! ```
//! use jobweave::{Config, Scheduler};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let scheduler = Scheduler::new(Config::default());
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! let c = counter.clone();
//! let a = scheduler.schedule(move || { c.fetch_add(1, Ordering::SeqCst); }, None).unwrap();
//! let c = counter.clone();
//! let b = scheduler.schedule(move || { c.fetch_add(1, Ordering::SeqCst); }, Some(a)).unwrap();
//!
//! scheduler.flush().unwrap();
//! scheduler.complete(b).unwrap();
//! assert_eq!(counter.load(Ordering::SeqCst), 2);
//! ```

#[macro_use]
extern crate failure;
extern crate log;
extern crate num_cpus;

pub mod errors;
pub mod prelude;
pub mod sched;

pub use crate::errors::{Error, Result};
pub use crate::sched::{Config, Handle, ParallelForJob, Scheduler};
