//! Convenience re-export of the public surface, matching the teacher's
//! `prelude` convention.

pub use crate::errors::{Error, Result};
pub use crate::sched::{Config, Handle, ParallelForJob, Scheduler};
