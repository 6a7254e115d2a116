//! Parallel-For Driver (C8): partitions an index interval into batches
//! and distributes them across several ordinary scheduled jobs via a
//! shared [`RangeDeque`].
//!
//! Grounded directly on spec-level §4.7 in shape (one "finish" job
//! depending on `T` "slice" jobs, each sharing one range deque), and on
//! the teacher's `src/sched/scope.rs` for the "spawn N, let a dependency
//! count close the loop" pattern. One slice — the first scheduled — owns
//! the deque's bottom end and calls `try_pop_bottom`; the remaining
//! slices only `try_steal`, preserving the single-owner contract C2/C3
//! rely on even though every slice shares the one deque.

use std::sync::Arc;

use crate::sched::range_deque::{RangeDeque, Steal};

/// A unit of data-parallel work distributed over `[0, n)`.
pub trait ParallelForJob: Send + Sync {
    /// Invoked exactly once for every `i` in `[0, n)`, in no particular
    /// order and possibly concurrently with other indices.
    fn execute(&self, index: usize);

    /// Invoked exactly once, after every `execute` call has returned.
    fn finish(&self);

    /// Size of each contiguous sub-range handed to a slice in one steal.
    /// Defaults to 1.
    fn batch_size(&self) -> usize {
        1
    }

    /// Requested slice count; `0` asks for one slice per worker thread.
    fn thread_count(&self) -> usize {
        0
    }
}

/// The body of one slice job: drain the shared deque until it reports
/// genuinely empty.
pub(crate) fn run_slice<J: ParallelForJob + ?Sized>(
    work: &Arc<J>,
    range_deque: &Arc<RangeDeque>,
    is_owner: bool,
) {
    loop {
        if is_owner {
            match range_deque.try_pop_bottom() {
                Steal::Success(r) => {
                    for i in r.start..r.end {
                        work.execute(i);
                    }
                    continue;
                }
                Steal::Abort => continue,
                Steal::Empty => {}
            }
        }

        match range_deque.try_steal() {
            Steal::Success(r) => {
                for i in r.start..r.end {
                    work.execute(i);
                }
            }
            Steal::Abort => continue,
            Steal::Empty => break,
        }
    }
}

/// `min(requested_thread_count, worker_count, ceil(n/batch))`, per the
/// resolution recorded in DESIGN.md for spec.md §9's "thread_count higher
/// than worker count" open question.
pub(crate) fn slice_count(requested: usize, worker_count: usize, n: usize, batch: usize) -> usize {
    let total_batches = if n == 0 { 0 } else { (n + batch - 1) / batch };
    let requested = if requested == 0 {
        worker_count
    } else {
        requested
    };
    requested.min(worker_count).min(total_batches).max(1)
}
