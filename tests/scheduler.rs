//! End-to-end scenarios from spec.md §8 (S1-S6), exercised against the
//! public `Scheduler` API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use jobweave::{Config, Error, ParallelForJob, Scheduler};

fn small_scheduler(threads: u32) -> Scheduler {
    let _ = env_logger::try_init();
    Scheduler::new(Config {
        thread_count: threads,
        max_concurrent_jobs: 64,
        strict_allocation: false,
        thread_name_prefix: "jobweave-test".to_string(),
    })
}

/// S1 - Two dependents of one dependency: A executes before B and C; B
/// and C may execute in either order; every `execute` counter is 1.
#[test]
fn s1_two_dependents_of_one_dependency() {
    let sched = small_scheduler(4);
    let order = Arc::new(Mutex::new(Vec::new()));
    let counts = Arc::new(Mutex::new([0u32; 3]));

    let (o, c) = (order.clone(), counts.clone());
    let a = sched
        .schedule(
            move || {
                o.lock().unwrap().push('A');
                c.lock().unwrap()[0] += 1;
            },
            None,
        )
        .unwrap();

    let (o, c) = (order.clone(), counts.clone());
    let b = sched
        .schedule(
            move || {
                o.lock().unwrap().push('B');
                c.lock().unwrap()[1] += 1;
            },
            Some(a),
        )
        .unwrap();

    let (o, c) = (order.clone(), counts.clone());
    let cjob = sched
        .schedule(
            move || {
                o.lock().unwrap().push('C');
                c.lock().unwrap()[2] += 1;
            },
            Some(a),
        )
        .unwrap();

    sched.flush().unwrap();
    sched.complete(cjob).unwrap();
    sched.complete(b).unwrap();

    let order = order.lock().unwrap();
    assert_eq!(order[0], 'A');
    assert_eq!(order.len(), 3);
    assert!(order.contains(&'B') && order.contains(&'C'));
    assert_eq!(*counts.lock().unwrap(), [1, 1, 1]);
}

/// S2 - Linear chain of five jobs executes in schedule order.
#[test]
fn s2_linear_chain() {
    let sched = small_scheduler(4);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut prev = None;
    let mut last = None;
    for i in 1..=5u32 {
        let o = order.clone();
        let h = sched
            .schedule(move || o.lock().unwrap().push(i), prev)
            .unwrap();
        prev = Some(h);
        last = Some(h);
    }

    sched.flush().unwrap();
    sched.complete(last.unwrap()).unwrap();

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}

/// S3 - combine_dependencies fans two independent jobs into one gate
/// that a third job depends on.
#[test]
fn s3_combine_then_fan_out() {
    let sched = small_scheduler(4);
    let a_done = Arc::new(AtomicUsize::new(0));
    let b_done = Arc::new(AtomicUsize::new(0));
    let c_ran_after_both = Arc::new(AtomicUsize::new(0));

    let (ad, bd) = (a_done.clone(), b_done.clone());
    let a = sched
        .schedule(
            move || {
                std::thread::sleep(Duration::from_millis(5));
                ad.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .unwrap();
    let b = sched
        .schedule(move || bd.fetch_add(1, Ordering::SeqCst), None)
        .unwrap();

    let combined = sched.combine_dependencies(&[a, b]).unwrap();

    let (ad, bd, seen) = (a_done.clone(), b_done.clone(), c_ran_after_both.clone());
    let c = sched
        .schedule(
            move || {
                if ad.load(Ordering::SeqCst) == 1 && bd.load(Ordering::SeqCst) == 1 {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            },
            Some(combined),
        )
        .unwrap();

    sched.flush().unwrap();
    sched.complete(c).unwrap();

    assert_eq!(c_ran_after_both.load(Ordering::SeqCst), 1);
}

struct IncrementAll {
    data: Vec<AtomicUsize>,
    finished: AtomicUsize,
}

impl ParallelForJob for IncrementAll {
    fn execute(&self, index: usize) {
        self.data[index].fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn batch_size(&self) -> usize {
        1
    }
}

/// S4 - a parallel-for over a large interval touches every index exactly
/// once and calls `finish` exactly once.
#[test]
fn s4_parallel_for_sanity() {
    const N: usize = 1_048_576;
    let sched = small_scheduler(8);

    let job = Arc::new(IncrementAll {
        data: (0..N).map(|_| AtomicUsize::new(0)).collect(),
        finished: AtomicUsize::new(0),
    });

    struct Proxy(Arc<IncrementAll>);
    impl ParallelForJob for Proxy {
        fn execute(&self, index: usize) {
            self.0.execute(index);
        }
        fn finish(&self) {
            self.0.finish();
        }
        fn batch_size(&self) -> usize {
            1
        }
    }

    let h = sched
        .schedule_parallel_for(Proxy(job.clone()), N, None)
        .unwrap();
    sched.flush().unwrap();
    sched.complete(h).unwrap();

    assert!(job.data.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    assert_eq!(job.finished.load(Ordering::SeqCst), 1);
}

/// S5 - strict allocation rejects the 33rd concurrent schedule and
/// recovers once the pool drains.
#[test]
fn s5_strict_overflow_then_recovery() {
    let sched = Scheduler::new(Config {
        thread_count: 2,
        max_concurrent_jobs: 32,
        strict_allocation: true,
        thread_name_prefix: "jobweave-test".to_string(),
    });

    let mut handles = Vec::new();
    for _ in 0..32 {
        handles.push(sched.schedule(|| {}, None).unwrap());
    }

    match sched.schedule(|| {}, None) {
        Err(Error::PoolExhausted { in_flight }) => assert_eq!(in_flight, 32),
        other => panic!("expected PoolExhausted, got {:?}", other),
    }

    sched.flush().unwrap();
    for h in handles {
        sched.complete(h).unwrap();
    }

    for _ in 0..32 {
        sched.schedule(|| {}, None).unwrap();
    }
}

/// S6 - concurrent `complete` calls from multiple observer threads on the
/// same handle all return without hanging, and the job runs exactly
/// once.
#[test]
fn s6_thread_fan_in_of_complete() {
    let sched = Arc::new(small_scheduler(4));
    let runs = Arc::new(AtomicUsize::new(0));

    let r = runs.clone();
    let handle = sched
        .schedule(
            move || {
                std::thread::sleep(Duration::from_millis(20));
                r.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .unwrap();
    sched.flush().unwrap();

    let barrier = Arc::new(Barrier::new(5));
    let observers: Vec<_> = (0..5)
        .map(|_| {
            let sched = sched.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                sched.complete(handle).unwrap();
            })
        })
        .collect();

    for o in observers {
        o.join().unwrap();
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// P7 - a handle whose record was re-pooled and reissued under a new
/// version must not be mistaken for the new job by `complete`.
#[test]
fn p7_handle_isolation_across_reissue() {
    let sched = small_scheduler(2);

    let first = sched.schedule(|| {}, None).unwrap();
    sched.flush().unwrap();
    sched.complete(first).unwrap();

    // Drain enough new schedulings that the freed slot is very likely
    // reissued with a different version; either way `complete` on the
    // stale handle must return immediately rather than hang.
    let mut last = None;
    for _ in 0..8 {
        last = Some(sched.schedule(|| {}, None).unwrap());
    }
    sched.flush().unwrap();
    sched.complete(last.unwrap()).unwrap();

    // Stale handle: must return immediately, not block on a new job.
    sched.complete(first).unwrap();
}

/// `WrongThread`: schedule/flush/dispose must fail when invoked from
/// anything but the scheduler's constructing thread.
#[test]
fn wrong_thread_is_rejected() {
    let sched = Arc::new(small_scheduler(2));
    let s = sched.clone();
    let result = std::thread::spawn(move || s.schedule(|| {}, None))
        .join()
        .unwrap();
    assert!(matches!(result, Err(Error::WrongThread)));

    let s = sched.clone();
    let result = std::thread::spawn(move || s.flush()).join().unwrap();
    assert!(matches!(result, Err(Error::WrongThread)));
}

/// `ForeignHandle`: a handle from one scheduler must not be accepted by
/// another.
#[test]
fn foreign_handle_is_rejected() {
    let sched_a = small_scheduler(1);
    let sched_b = small_scheduler(1);

    let handle = sched_a.schedule(|| {}, None).unwrap();
    sched_a.flush().unwrap();

    assert!(matches!(
        sched_b.complete(handle),
        Err(Error::ForeignHandle)
    ));
    sched_a.complete(handle).unwrap();
}

/// A dependency handle that is already stale when passed to `schedule`
/// is silently dropped rather than wired up, per spec.md §4.6 failure
/// semantics.
#[test]
fn stale_dependency_is_dropped_silently() {
    let sched = small_scheduler(2);

    let dep = sched.schedule(|| {}, None).unwrap();
    sched.flush().unwrap();
    sched.complete(dep).unwrap();

    // `dep`'s slot may already be reissued; scheduling against it must
    // not deadlock or error, and the dependent must still run.
    let ran = Arc::new(AtomicUsize::new(0));
    let r = ran.clone();
    let h = sched
        .schedule(move || r.fetch_add(1, Ordering::SeqCst), Some(dep))
        .unwrap();
    sched.flush().unwrap();
    sched.complete(h).unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

/// A panicking user job does not corrupt the graph: its dependents still
/// run, and the panic is re-raised exactly once on the first `complete`
/// caller.
#[test]
fn panic_propagates_once_and_releases_dependents() {
    let sched = small_scheduler(2);

    let a = sched.schedule(|| panic!("boom"), None).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let r = ran.clone();
    let b = sched
        .schedule(move || r.fetch_add(1, Ordering::SeqCst), Some(a))
        .unwrap();

    sched.flush().unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        sched.complete(a).unwrap();
    }));
    assert!(result.is_err());

    sched.complete(b).unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}
