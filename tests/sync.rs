//! `WaitGroup` integration coverage beyond the unit tests in `src/sync.rs`.
//!
//! Grounded on `examples/original_source/tests/test_sync.py`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use goic::sync::WaitGroup;
use goic::Executor;

#[test]
fn many_workers_all_observed_before_wait_returns() {
    let exec = Executor::new();
    let wg = Arc::new(WaitGroup::new());
    let done = Arc::new(AtomicUsize::new(0));
    const N: usize = 50;
    wg.add(N as i64);

    for _ in 0..N {
        let wg = wg.clone();
        let done = done.clone();
        exec.spawn(async move {
            done.fetch_add(1, Ordering::SeqCst);
            wg.done();
        });
    }

    exec.run_sync({
        let wg = wg.clone();
        async move { wg.wait().await }
    });

    assert_eq!(done.load(Ordering::SeqCst), N);
}

#[test]
fn multiple_waiters_all_wake() {
    let exec = Executor::new();
    let wg = Arc::new(WaitGroup::new());
    wg.add(1);
    let woke = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let wg = wg.clone();
        let woke = woke.clone();
        exec.spawn(async move {
            wg.wait().await;
            woke.fetch_add(1, Ordering::SeqCst);
        });
    }
    exec.spawn({
        let wg = wg.clone();
        async move {
            goic::time::after(std::time::Duration::from_millis(5)).recv().await;
            wg.done();
        }
    });

    exec.run_sync(async move {
        loop {
            goic::time::after(std::time::Duration::from_millis(2)).recv().await;
            if woke.load(Ordering::SeqCst) == 3 {
                break;
            }
        }
    });
}
