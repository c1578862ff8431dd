//! Scenario 7 of spec.md §8: resetting a timer while a `select` is parked
//! on it must not let it fire twice.
//!
//! Grounded on `examples/original_source/tests/test_time.py`.

use std::time::Duration;

use goic::time::{after, Timer};
use goic::{select, Executor};

#[test]
fn reset_while_waiting_does_not_double_fire() {
    // spec.md §8 scenario 7.
    let exec = Executor::new();
    let timer = Timer::new(Duration::from_millis(10));

    std::thread::sleep(Duration::from_millis(1));
    assert!(timer.reset(Duration::from_millis(1)));

    let first = exec.run_sync({
        let c = timer.c.clone();
        async move {
            let cases = vec![c.case_recv().into(), after(Duration::from_millis(4)).case_recv().into()];
            select(cases).await.unwrap().0
        }
    });
    assert_eq!(first, 0);

    let second = exec.run_sync({
        let c = timer.c.clone();
        async move {
            let cases = vec![c.case_recv().into(), after(Duration::from_millis(20)).case_recv().into()];
            select(cases).await.unwrap().0
        }
    });
    assert_eq!(second, 1);
}
