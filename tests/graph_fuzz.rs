//! Randomized dependency-graph stress test (P2, P3): build many small
//! random DAGs, schedule them, and check that every job ran exactly once
//! and that it observed all of its declared dependencies as complete the
//! instant it started.
//!
//! Grounded in the teacher's own randomized test style (`multitask::test`
//! seeds an `XorShiftRng` to fuzz quicksort over a `ThreadPool`); here the
//! same `rand` dev-dependency fuzzes dependency-graph shape instead.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use jobweave::{Config, Handle, Scheduler};

fn random_dag(rng: &mut impl Rng, node_count: usize) -> Vec<Option<usize>> {
    // node i may depend on any earlier node, or nothing. Earlier-only
    // edges guarantee a DAG without a cycle-detection pass.
    (0..node_count)
        .map(|i| {
            if i == 0 || rng.gen_range(0, 3) == 0 {
                None
            } else {
                Some(rng.gen_range(0, i))
            }
        })
        .collect()
}

#[test]
fn random_graphs_respect_dependency_order_and_run_once() {
    let mut rng = rand::thread_rng();

    for trial in 0..50 {
        let node_count = rng.gen_range(2, 40);
        let deps = random_dag(&mut rng, node_count);

        let sched = Scheduler::new(Config {
            thread_count: 4,
            max_concurrent_jobs: node_count + 4,
            strict_allocation: false,
            thread_name_prefix: "jobweave-fuzz".to_string(),
        });

        let completed: Vec<Arc<AtomicBool>> =
            (0..node_count).map(|_| Arc::new(AtomicBool::new(false))).collect();
        let run_counts: Vec<Arc<AtomicUsize>> =
            (0..node_count).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let ordering_violations = Arc::new(AtomicUsize::new(0));

        let mut handles: Vec<Option<Handle>> = vec![None; node_count];
        for i in 0..node_count {
            let dependency = deps[i].map(|d| handles[d].unwrap());
            let dep_flag = deps[i].map(|d| completed[d].clone());
            let my_flag = completed[i].clone();
            let my_count = run_counts[i].clone();
            let violations = ordering_violations.clone();

            let h = sched
                .schedule(
                    move || {
                        if let Some(flag) = &dep_flag {
                            if !flag.load(Ordering::SeqCst) {
                                violations.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        my_count.fetch_add(1, Ordering::SeqCst);
                        my_flag.store(true, Ordering::SeqCst);
                    },
                    dependency,
                )
                .unwrap();
            handles[i] = Some(h);
        }

        sched.flush().unwrap();
        for h in handles.iter().flatten() {
            sched.complete(*h).unwrap();
        }

        assert_eq!(
            ordering_violations.load(Ordering::SeqCst),
            0,
            "trial {} observed a dependent running before its dependency",
            trial
        );
        for (i, c) in run_counts.iter().enumerate() {
            assert_eq!(
                c.load(Ordering::SeqCst),
                1,
                "trial {} node {} ran {} times",
                trial,
                i,
                c.load(Ordering::SeqCst)
            );
        }
    }
}
