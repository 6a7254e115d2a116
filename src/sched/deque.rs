//! A Chase-Lev work-stealing deque, one per worker thread.
//!
//! The owner thread pushes and pops from the bottom (LIFO); any number of
//! thief threads steal from the top (FIFO). The backing storage is a power-
//! of-two circular array (`Buffer`) that the owner grows by doubling when
//! it fills up. Grown-away buffers are never freed: stealers may still be
//! mid-read against them, and reclaiming them safely needs an epoch scheme
//! this crate does not pull in. They are leaked, matching the "abandoned
//! and reclaimed by the host's memory system" contract.

use std::cell::Cell;
use std::sync::atomic::{fence, AtomicIsize, AtomicPtr, Ordering};

use log::trace;

/// Power-of-two circular buffer indexed by monotonic counters modulo
/// capacity.
struct Buffer<T> {
    capacity: usize,
    mask: isize,
    data: Box<[Cell<Option<T>>]>,
}

impl<T: Copy> Buffer<T> {
    fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let data = (0..capacity).map(|_| Cell::new(None)).collect();
        Buffer {
            capacity,
            mask: capacity as isize - 1,
            data,
        }
    }

    #[inline]
    unsafe fn get(&self, i: isize) -> T {
        (*self.data.get_unchecked((i & self.mask) as usize))
            .get()
            .unwrap()
    }

    #[inline]
    unsafe fn set(&self, i: isize, v: T) {
        (*self.data.get_unchecked((i & self.mask) as usize)).set(Some(v));
    }

    /// Allocates a new buffer of double the capacity and copies the live
    /// range `[top, bottom)` into it. The caller guarantees `bottom - top
    /// <= capacity`.
    unsafe fn grow(&self, bottom: isize, top: isize) -> Box<Buffer<T>> {
        let grown = Buffer::new(self.capacity * 2);
        for i in top..bottom {
            grown.set(i, self.get(i));
        }
        Box::new(grown)
    }
}

/// Result of a steal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steal<T> {
    /// The deque was observed empty.
    Empty,
    /// A concurrent operation won the race; the caller should retry.
    Abort,
    /// An element was stolen.
    Success(T),
}

impl<T> Steal<T> {
    pub fn is_abort(&self) -> bool {
        matches!(self, Steal::Abort)
    }

    pub fn success(self) -> Option<T> {
        match self {
            Steal::Success(v) => Some(v),
            _ => None,
        }
    }
}

/// A single-owner, multi-thief work-stealing deque.
///
/// `push_bottom` and `try_pop_bottom` must only ever be called by the
/// owning worker thread; `try_steal` may be called concurrently by any
/// number of other threads. This contract is not enforced by the type
/// system (the scheduler hands out `Arc<Deque<T>>` so thieves can reach
/// in); it is upheld structurally because only the scheduler's own worker
/// loop ever calls the owner-only methods, and only on its own deque.
pub struct Deque<T> {
    bottom: AtomicIsize,
    top: AtomicIsize,
    buffer: AtomicPtr<Buffer<T>>,
    last_top_cache: Cell<isize>,
}

const MIN_CAPACITY: usize = 32;

impl<T: Copy> Deque<T> {
    pub fn new() -> Self {
        let buffer = Box::new(Buffer::new(MIN_CAPACITY));
        Deque {
            bottom: AtomicIsize::new(0),
            top: AtomicIsize::new(0),
            buffer: AtomicPtr::new(Box::into_raw(buffer)),
            last_top_cache: Cell::new(0),
        }
    }

    /// Owner-only. Pushes a job reference to the bottom of the deque,
    /// growing the backing buffer first if it is close to full.
    pub fn push_bottom(&self, value: T) {
        let b = self.bottom.load(Ordering::Relaxed);
        let mut buf = self.buffer.load(Ordering::Relaxed);

        unsafe {
            let capacity = (*buf).capacity as isize;
            if b - self.last_top_cache.get() >= capacity - 1 {
                let t = self.top.load(Ordering::Acquire);
                self.last_top_cache.set(t);
                if b - t >= capacity - 1 {
                    let grown = Box::into_raw((*buf).grow(b, t));
                    self.buffer.store(grown, Ordering::Release);
                    buf = grown;
                }
            }

            (*buf).set(b, value);
        }

        self.bottom.store(b + 1, Ordering::Release);
        trace!("push_bottom: bottom {} -> {}", b, b + 1);
    }

    /// Owner-only. Pops the most recently pushed element, racing any
    /// thief that may be stealing the last remaining element.
    pub fn try_pop_bottom(&self) -> Option<T> {
        let b = self.bottom.load(Ordering::Relaxed) - 1;
        self.bottom.store(b, Ordering::Relaxed);

        // StoreLoad barrier: the decremented `bottom` must be visible to
        // any thief reading it before we read `top`, or both this call
        // and a concurrent `try_steal` can observe the deque as holding
        // the last element and both win, violating at-most-once delivery.
        fence(Ordering::SeqCst);
        let t = self.top.load(Ordering::Relaxed);
        let size = b - t;

        if size < 0 {
            self.bottom.store(t, Ordering::Relaxed);
            return None;
        }

        let buf = self.buffer.load(Ordering::Acquire);
        let candidate = unsafe { (*buf).get(b) };

        if size > 0 {
            trace!("try_pop_bottom: success, size {} > 0", size);
            return Some(candidate);
        }

        let won = self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok();
        self.bottom.store(t + 1, Ordering::Relaxed);
        if won {
            trace!("try_pop_bottom: won last-element race at top {}", t);
            Some(candidate)
        } else {
            trace!("try_pop_bottom: lost last-element race at top {}", t);
            None
        }
    }

    /// May be called from any thread. Attempts to steal the oldest
    /// element.
    pub fn try_steal(&self) -> Steal<T> {
        let t = self.top.load(Ordering::Acquire);
        // StoreLoad barrier: must read `top` before `bottom` so a racing
        // owner's `try_pop_bottom` cannot be observed as having already
        // vacated the slot we are about to read.
        fence(Ordering::SeqCst);
        let b = self.bottom.load(Ordering::Acquire);

        if b - t <= 0 {
            return Steal::Empty;
        }

        let buf = self.buffer.load(Ordering::Acquire);
        let candidate = unsafe { (*buf).get(t) };

        if self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            trace!("try_steal: stole top {}", t);
            Steal::Success(candidate)
        } else {
            trace!("try_steal: lost CAS at top {}", t);
            Steal::Abort
        }
    }

    /// Approximate length; racy against concurrent pushes/steals, useful
    /// only for diagnostics.
    pub fn len(&self) -> usize {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Relaxed);
        if b > t {
            (b - t) as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for Deque<T> {
    fn drop(&mut self) {
        // Only the current buffer is definitely not aliased by an
        // in-flight thief (the deque itself is going away); grown-away
        // buffers were already leaked intentionally.
        unsafe {
            drop(Box::from_raw(self.buffer.load(Ordering::Relaxed)));
        }
    }
}

unsafe impl<T: Send> Send for Deque<T> {}
unsafe impl<T: Send> Sync for Deque<T> {}
