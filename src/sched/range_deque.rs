//! The range work-stealing deque used to drive a single parallel-for job
//! across many worker threads (C8).
//!
//! Unlike [`super::deque::Deque`], there is no backing buffer: slot `i`
//! names the half-open sub-range `[start + i*batch, min(start + (i+1)*batch,
//! end))` of the job's index interval. Only five integers of state are
//! needed per deque, matching spec.md's "Only four integers of state per
//! deque (top, bottom, start, end, batch)" (`top`/`bottom` make the fifth
//! and sixth, tracked as atomics).

use std::sync::atomic::{fence, AtomicIsize, Ordering};

use log::trace;

pub use super::deque::Steal;

/// A contiguous, half-open sub-range of a parallel-for's index interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// A single-owner, multi-thief deque over implicit integer batches.
pub struct RangeDeque {
    bottom: AtomicIsize,
    top: AtomicIsize,
    start: usize,
    end: usize,
    batch: usize,
}

impl RangeDeque {
    /// `set(start, count, batch)`: initializes `bottom = ceil(count /
    /// batch)`, `top = 0`.
    pub fn new(start: usize, count: usize, batch: usize) -> Self {
        debug_assert!(batch > 0);
        let batches = (count + batch - 1) / batch;
        RangeDeque {
            bottom: AtomicIsize::new(batches as isize),
            top: AtomicIsize::new(0),
            start,
            end: start + count,
            batch,
        }
    }

    fn range_at(&self, i: isize) -> Range {
        let lo = self.start + (i as usize) * self.batch;
        let hi = (self.start + (i as usize + 1) * self.batch).min(self.end);
        Range { start: lo, end: hi }
    }

    /// Owner-only: there is no LIFO/FIFO distinction here since each batch
    /// is interchangeable, but the bottom end is still reserved for the
    /// owning slice job so it need not race thieves on every pop.
    pub fn try_pop_bottom(&self) -> Steal<Range> {
        let b = self.bottom.load(Ordering::Relaxed) - 1;
        self.bottom.store(b, Ordering::Relaxed);

        // StoreLoad barrier, matching `Deque::try_pop_bottom`: without it
        // a concurrent `try_steal` can read a stale `bottom` and both
        // calls can return the same batch.
        fence(Ordering::SeqCst);
        let t = self.top.load(Ordering::Relaxed);
        let size = b - t;
        if size < 0 {
            self.bottom.store(t, Ordering::Relaxed);
            return Steal::Empty;
        }

        let range = self.range_at(b);

        if size > 0 {
            trace!("range try_pop_bottom: success, size {} > 0", size);
            return Steal::Success(range);
        }

        let won = self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok();
        self.bottom.store(t + 1, Ordering::Relaxed);
        if won {
            trace!("range try_pop_bottom: won last-batch race at top {}", t);
            Steal::Success(range)
        } else {
            trace!("range try_pop_bottom: lost last-batch race at top {}", t);
            Steal::Abort
        }
    }

    /// May be called by any slice job, including the owner.
    pub fn try_steal(&self) -> Steal<Range> {
        let t = self.top.load(Ordering::Acquire);
        // StoreLoad barrier, matching `Deque::try_steal`.
        fence(Ordering::SeqCst);
        let b = self.bottom.load(Ordering::Acquire);
        if b - t <= 0 {
            return Steal::Empty;
        }

        let range = self.range_at(t);

        if self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            trace!("range try_steal: stole top {}", t);
            Steal::Success(range)
        } else {
            trace!("range try_steal: lost CAS at top {}", t);
            Steal::Abort
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bottom.load(Ordering::Relaxed) <= self.top.load(Ordering::Relaxed)
    }
}

unsafe impl Send for RangeDeque {}
unsafe impl Sync for RangeDeque {}
