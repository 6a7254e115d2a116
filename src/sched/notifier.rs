//! Wake-one / wake-all primitive used to park idle workers (C4).
//!
//! Grounded on `Signal` in the teacher's `src/sched/scheduler.rs` and
//! `ThreadWakeEvent` in the pack's path-tracer job system: a plain
//! `Mutex`+`Condvar` pair, with the mutex-guarded flag absorbing a
//! `notify_one` that arrives before anyone is waiting so it is not lost.

use std::sync::{Condvar, Mutex};

struct State {
    /// Coalesced single-slot wake-up used by `notify_one`: a notification
    /// that arrives before anyone is parked is remembered once and
    /// consumed by the next `wait`.
    pending: bool,
    /// Set once by `notify_all` and never cleared. Its own latch,
    /// independent of `pending`, so "wake all waiters permanently" holds
    /// even though `wait` otherwise consumes `pending` the instant any
    /// single thread reacquires the mutex.
    shutdown: bool,
}

pub struct Notifier {
    state: Mutex<State>,
    condvar: Condvar,
}

impl Notifier {
    pub fn new() -> Self {
        Notifier {
            state: Mutex::new(State {
                pending: false,
                shutdown: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Blocks the calling thread until a notification arrives. Returns
    /// immediately, without blocking, once `notify_all` has ever been
    /// called — that permanent latch is checked before (and instead of)
    /// the coalesced `pending` flag. If a notification was already
    /// pending (coalesced from an earlier `notify_one` that found no
    /// waiter), returns immediately and consumes it.
    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.pending && !state.shutdown {
            state = self.condvar.wait(state).unwrap();
        }
        if !state.shutdown {
            state.pending = false;
        }
    }

    /// Wakes exactly one waiter, or leaves a single pending notification
    /// for the next `wait` if nobody is currently parked.
    pub fn notify_one(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending = true;
        self.condvar.notify_one();
    }

    /// Wakes every waiter, now and permanently: once called, every past
    /// or future `wait()` on this `Notifier` returns immediately. Used
    /// only for shutdown, where every worker must re-check the
    /// cancellation flag and none may be left parked.
    pub fn notify_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        self.condvar.notify_all();
    }

    /// Releases any waiting threads one final time. Idempotent. Callers
    /// must ensure every worker has already observed shutdown and will
    /// not call `wait` again before dropping the `Notifier`.
    pub fn dispose(&self) {
        self.notify_all();
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wakes_a_waiting_thread() {
        let n = Arc::new(Notifier::new());
        let n2 = n.clone();
        let t = thread::spawn(move || {
            n2.wait();
        });

        thread::sleep(Duration::from_millis(20));
        n.notify_one();
        t.join().unwrap();
    }

    #[test]
    fn coalesces_a_notification_with_no_waiter() {
        let n = Notifier::new();
        n.notify_one();
        n.wait(); // must not block
    }

    /// `notify_all` must stand alone as a true broadcast: every waiter
    /// parked before the call wakes, and it remains a permanent latch so
    /// threads that call `wait` afterward never block either.
    #[test]
    fn notify_all_wakes_every_waiter_and_latches_open() {
        let n = Arc::new(Notifier::new());
        let woke = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let n = n.clone();
                let woke = woke.clone();
                thread::spawn(move || {
                    n.wait();
                    woke.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        n.notify_all();

        for w in waiters {
            w.join().unwrap();
        }
        assert_eq!(woke.load(Ordering::SeqCst), 8);

        // The latch is permanent: a `wait` issued after the fact must
        // still return immediately, with no further `notify_*` call.
        n.wait();
    }
}
