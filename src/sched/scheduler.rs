//! Scheduler Core (C7): the producer-facing API, the master queue, and
//! the worker loop implementing Lin et al.'s adaptive Exploit / Explore /
//! Wait-for-task algorithm.
//!
//! Grounded on the teacher's `src/sched/scheduler.rs` (thread spawning,
//! per-worker deque ownership, random victim selection via an xorshift
//! generator) and `src/multitask/threads.rs` (the bounded-spin /
//! bounded-yield / block-on-notifier shape of `wait_for_work`).

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use log::{debug, error, trace, warn};

use crate::errors::{Error, Result};
use crate::sched::config::Config;
use crate::sched::deque::Deque;
use crate::sched::job::{Handle, JobIndex, JobRecord};
use crate::sched::notifier::Notifier;
use crate::sched::parallel_for::{run_slice, slice_count, ParallelForJob};
use crate::sched::pool::JobPool;
use crate::sched::range_deque::RangeDeque;

static NEXT_SCHEDULER_ID: AtomicUsize = AtomicUsize::new(0);

/// Small, fast, non-cryptographic PRNG used only to pick steal victims.
/// Grounded on the generator the teacher's scheduler seeds per worker.
struct XorShift64Star(u64);

impl XorShift64Star {
    fn new(seed: u64) -> Self {
        XorShift64Star(seed | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() as usize) % n
    }
}

struct Inner {
    id: usize,
    worker_count: usize,
    pool: JobPool,
    deques: Vec<Arc<Deque<JobIndex>>>,
    master_queue: Mutex<VecDeque<JobIndex>>,
    pending: Mutex<Vec<JobIndex>>,
    notifier: Notifier,
    num_actives: AtomicUsize,
    num_thieves: AtomicUsize,
    cancelled: AtomicBool,
}

/// The scheduler itself. Owns the worker threads for its lifetime;
/// dropping it cancels and joins them.
pub struct Scheduler {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
    owner_thread: ThreadId,
}

impl Scheduler {
    pub fn new(config: Config) -> Self {
        let id = NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed);
        let worker_count = config.resolved_thread_count();
        let deques: Vec<_> = (0..worker_count).map(|_| Arc::new(Deque::new())).collect();

        let inner = Arc::new(Inner {
            id,
            worker_count,
            pool: JobPool::new(
                id,
                config.max_concurrent_jobs,
                config.max_concurrent_jobs,
                config.strict_allocation,
            ),
            deques,
            master_queue: Mutex::new(VecDeque::new()),
            pending: Mutex::new(Vec::new()),
            notifier: Notifier::new(),
            num_actives: AtomicUsize::new(0),
            num_thieves: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        });

        debug!(
            "spawning {} worker thread(s) for scheduler #{}",
            worker_count, id
        );

        let workers = (0..worker_count)
            .map(|i| {
                let inner = inner.clone();
                thread::Builder::new()
                    .name(format!("{}-{}", config.thread_name_prefix, i))
                    .spawn(move || worker_main(inner, i))
                    .expect("failed to spawn scheduler worker thread")
            })
            .collect();

        Scheduler {
            inner,
            workers,
            owner_thread: thread::current().id(),
        }
    }

    fn check_owner_thread(&self) -> Result<()> {
        if thread::current().id() != self.owner_thread {
            return Err(Error::WrongThread);
        }
        Ok(())
    }

    fn check_own_handle(&self, handle: Handle) -> Result<()> {
        if handle.scheduler_id != self.inner.id {
            return Err(Error::ForeignHandle);
        }
        Ok(())
    }

    /// Links `handle`'s dependency count to `dependency`, if given and
    /// not already stale (§4.6 step 2). A dependency that already
    /// completed, or whose handle is stale, is silently treated as
    /// already satisfied.
    fn link_dependency(&self, handle: Handle, dependency: Option<Handle>) -> Result<()> {
        let dependency = match dependency {
            Some(d) => d,
            None => return Ok(()),
        };
        self.check_own_handle(dependency)?;

        let dep_record = self.inner.pool.get(dependency.index());
        let mut dep_state = dep_record.state.lock().unwrap();
        if dep_state.version == dependency.version() && !dep_state.is_complete {
            dep_state.dependents.push(handle.index());
            drop(dep_state);
            let record = self.inner.pool.get(handle.index());
            record.state.lock().unwrap().dependency_count += 1;
        }
        Ok(())
    }

    fn enqueue_if_ready(&self, handle: Handle, record: &JobRecord) {
        let ready = record.state.lock().unwrap().dependency_count == 0;
        if ready {
            self.inner.pending.lock().unwrap().push(handle.index());
        }
    }

    /// Schedules `work`, optionally depending on a previously scheduled
    /// handle. Must be called from the thread that constructed this
    /// `Scheduler`.
    pub fn schedule<F>(&self, work: F, dependency: Option<Handle>) -> Result<Handle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.check_owner_thread()?;
        let (handle, record) = self.inner.pool.allocate()?;
        record.state.lock().unwrap().work = Some(Box::new(work));
        self.link_dependency(handle, dependency)?;
        self.enqueue_if_ready(handle, &record);
        Ok(handle)
    }

    /// Creates a synthetic job with no work of its own whose completion
    /// signals that every handle in `dependencies` has completed.
    pub fn combine_dependencies(&self, dependencies: &[Handle]) -> Result<Handle> {
        self.check_owner_thread()?;
        let (handle, record) = self.inner.pool.allocate()?;
        for dep in dependencies {
            self.link_dependency(handle, Some(*dep))?;
        }
        self.enqueue_if_ready(handle, &record);
        Ok(handle)
    }

    /// Partitions `[0, n)` into batches of `work.batch_size()` and
    /// schedules up to `min(work.thread_count(), worker_count,
    /// ceil(n/batch))` slice jobs that drain them via a shared
    /// [`RangeDeque`], returning the handle of a synthetic job that runs
    /// `work.finish()` once every slice has finished.
    pub fn schedule_parallel_for<J>(
        &self,
        work: J,
        n: usize,
        dependency: Option<Handle>,
    ) -> Result<Handle>
    where
        J: ParallelForJob + 'static,
    {
        self.check_owner_thread()?;
        let work = Arc::new(work);
        let batch = work.batch_size().max(1);
        let slices = slice_count(work.thread_count(), self.inner.worker_count, n, batch);
        let range_deque = Arc::new(RangeDeque::new(0, n, batch));

        let (finish_handle, finish_record) = self.inner.pool.allocate()?;
        {
            let finish_work = work.clone();
            finish_record.state.lock().unwrap().work = Some(Box::new(move || finish_work.finish()));
        }

        for slot in 0..slices {
            let (slice_handle, slice_record) = self.inner.pool.allocate()?;
            let slice_work = work.clone();
            let slice_deque = range_deque.clone();
            let is_owner = slot == 0;
            slice_record.state.lock().unwrap().work =
                Some(Box::new(move || run_slice(&slice_work, &slice_deque, is_owner)));

            self.link_dependency(slice_handle, dependency)?;
            self.enqueue_if_ready(slice_handle, &slice_record);
            self.link_dependency(finish_handle, Some(slice_handle))?;
        }

        self.enqueue_if_ready(finish_handle, &finish_record);
        Ok(finish_handle)
    }

    /// Publishes every pending ready job to the master queue, in the
    /// order they were scheduled, and wakes one worker.
    pub fn flush(&self) -> Result<()> {
        self.check_owner_thread()?;
        let mut pending = self.inner.pending.lock().unwrap();
        if pending.is_empty() {
            return Ok(());
        }
        self.inner
            .master_queue
            .lock()
            .unwrap()
            .extend(pending.drain(..));
        drop(pending);
        self.inner.notifier.notify_one();
        Ok(())
    }

    /// Blocks the calling thread — any thread, including a worker
    /// executing a different job — until `handle` is stale or complete.
    /// A stale handle (already re-pooled and reissued) returns
    /// immediately, never blocking (P7).
    pub fn complete(&self, handle: Handle) -> Result<()> {
        self.check_own_handle(handle)?;
        let record = self.inner.pool.get(handle.index());
        {
            let mut state = record.state.lock().unwrap();
            if state.version != handle.version() || state.is_complete {
                return Ok(());
            }
            state.wait_subscription_count += 1;
        }

        record.wait_event.wait();

        let panic = {
            let mut state = record.state.lock().unwrap();
            let panic = state.panic.take();
            state.wait_subscription_count -= 1;
            if state.wait_subscription_count == 0 {
                self.inner.pool.release(handle.index());
            }
            panic
        };

        if let Some(payload) = panic {
            panic::resume_unwind(payload);
        }
        Ok(())
    }

    /// Sets the cancellation flag and wakes every worker. New work may
    /// still be scheduled (this crate does not forbid it) but workers
    /// exit their loop the next time they run out of local work.
    pub fn dispose(&self) -> Result<()> {
        self.check_owner_thread()?;
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notifier.notify_all();
        Ok(())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notifier.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("a scheduler worker thread panicked internally");
            }
        }
    }
}

fn worker_main(inner: Arc<Inner>, my_index: usize) {
    let my_deque = inner.deques[my_index].clone();
    let mut cache: Option<JobIndex> = None;
    let mut rng = XorShift64Star::new(0x9E37_79B9_7F4A_7C15 ^ (my_index as u64 + 1));

    trace!("worker {} started", my_index);
    loop {
        exploit(&inner, &my_deque, &mut cache);
        match wait_for_task(&inner, my_index, &mut rng) {
            WaitOutcome::Task(index) => cache = Some(index),
            WaitOutcome::Continue => {}
            WaitOutcome::Exit => break,
        }
    }
    trace!("worker {} exiting", my_index);
}

/// Algorithm 3: drain the cache slot and the local deque, signaling a
/// peer to start thieving the first time this worker goes from idle to
/// active with nobody already out looking for work.
fn exploit(inner: &Inner, my_deque: &Deque<JobIndex>, cache: &mut Option<JobIndex>) {
    if inner.num_actives.fetch_add(1, Ordering::AcqRel) == 0
        && inner.num_thieves.load(Ordering::Acquire) == 0
    {
        inner.notifier.notify_one();
    }

    loop {
        let next = match cache.take() {
            Some(index) => Some(index),
            None => my_deque.try_pop_bottom(),
        };
        match next {
            Some(index) => execute_job(inner, index, my_deque, cache),
            None => break,
        }
    }

    inner.num_actives.fetch_sub(1, Ordering::AcqRel);
}

/// "Execute a task" from §4.6: run the user closure outside any lock,
/// then under the job's lock mark it complete, cascade the decrement to
/// its dependents, and either signal waiters or re-pool it.
fn execute_job(
    inner: &Inner,
    index: JobIndex,
    my_deque: &Deque<JobIndex>,
    cache: &mut Option<JobIndex>,
) {
    let record = inner.pool.get(index);

    let work = record.state.lock().unwrap().work.take();
    let outcome = match work {
        Some(work) => panic::catch_unwind(AssertUnwindSafe(work)),
        None => Ok(()),
    };

    let mut ready = Vec::new();
    {
        let mut state = record.state.lock().unwrap();
        state.is_complete = true;
        if let Err(payload) = outcome {
            error!("job at pool index {} panicked; propagating to a subscriber", index);
            state.panic = Some(payload);
        }
        for &dependent_index in &state.dependents {
            let dependent = inner.pool.get(dependent_index);
            let mut dependent_state = dependent.state.lock().unwrap();
            dependent_state.dependency_count -= 1;
            if dependent_state.dependency_count == 0 {
                ready.push(dependent_index);
            }
        }
    }

    let mut ready = ready.into_iter();
    *cache = ready.next();
    for idx in ready {
        my_deque.push_bottom(idx);
    }

    // Holding the lock across the release call closes the race where a
    // `complete` call could subscribe to a record that is concurrently
    // being handed back to the free list unsignaled.
    let mut state = record.state.lock().unwrap();
    if state.wait_subscription_count > 0 {
        drop(state);
        record.wait_event.signal();
    } else {
        inner.pool.release(index);
    }
}

enum WaitOutcome {
    Task(JobIndex),
    Continue,
    Exit,
}

/// Algorithm 5.
fn wait_for_task(inner: &Inner, my_index: usize, rng: &mut XorShift64Star) -> WaitOutcome {
    loop {
        inner.num_thieves.fetch_add(1, Ordering::AcqRel);

        if let Some(index) = explore(inner, my_index, rng) {
            if inner.num_thieves.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.notifier.notify_one();
            }
            return WaitOutcome::Task(index);
        }

        if let Some(index) = inner.master_queue.lock().unwrap().pop_front() {
            if inner.num_thieves.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.notifier.notify_one();
            }
            return WaitOutcome::Task(index);
        }

        if inner.cancelled.load(Ordering::Acquire) {
            inner.num_thieves.fetch_sub(1, Ordering::AcqRel);
            inner.notifier.notify_all();
            return WaitOutcome::Exit;
        }

        let was_last_thief = inner.num_thieves.fetch_sub(1, Ordering::AcqRel) == 1;
        if was_last_thief && inner.num_actives.load(Ordering::Acquire) > 0 {
            continue;
        }

        inner.notifier.wait();
        return WaitOutcome::Continue;
    }
}

/// Algorithm 4. `my_index` doubles as "try the master queue" when picked
/// as its own victim.
fn explore(inner: &Inner, my_index: usize, rng: &mut XorShift64Star) -> Option<JobIndex> {
    let n = inner.deques.len();
    let failure_threshold = 2 * n.saturating_sub(1);
    let mut failures: u32 = 0;
    let mut yields: u32 = 0;

    loop {
        if inner.cancelled.load(Ordering::Acquire) {
            return None;
        }

        let victim = rng.below(n);
        let stolen = if victim == my_index {
            inner.master_queue.lock().unwrap().pop_front()
        } else {
            inner.deques[victim].try_steal().success()
        };

        if let Some(index) = stolen {
            return Some(index);
        }

        failures += 1;
        if failures > failure_threshold {
            if yields >= 100 {
                return None;
            }
            thread::yield_now();
            yields += 1;
        }
    }
}
