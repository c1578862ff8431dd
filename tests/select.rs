//! Scenarios 4-5 of spec.md §8.
//!
//! Grounded on `examples/original_source/tests/test_channel.py`'s `select`
//! cases.

use std::time::Duration;

use goic::{select, select_default, Chan, Executor};

#[test]
fn select_picks_whichever_case_is_ready_first() {
    // spec.md §8 scenario 4.
    let exec = Executor::new();
    let ch1: Chan<&'static str> = Chan::new(1);
    let ch2: Chan<&'static str> = Chan::new(1);

    exec.spawn({
        let ch1 = ch1.clone();
        async move {
            goic::time::after(Duration::from_millis(1)).recv().await;
            ch1.send("one").await.unwrap();
        }
    });
    exec.spawn({
        let ch2 = ch2.clone();
        async move {
            goic::time::after(Duration::from_millis(2)).recv().await;
            ch2.send("two").await.unwrap();
        }
    });

    exec.run_sync(async move {
        let cases = vec![ch1.case_recv().into(), ch2.case_recv().into()];
        let (index, value) = select(cases).await.unwrap();
        assert_eq!(index, 0);
        assert!(value.ok());
        assert_eq!(value.downcast::<&'static str>(), Some("one"));

        let (_, ok) = ch2.recv().await;
        assert!(ok);
    });
}

#[test]
fn select_default_reports_no_case_ready_then_picks_up_a_late_send() {
    // spec.md §8 scenario 5.
    let exec = Executor::new();
    let ch: Chan<&'static str> = Chan::new(0);

    let outcome = select_default(vec![ch.case_recv().into()]).unwrap();
    assert!(outcome.is_none());

    exec.spawn({
        let ch = ch.clone();
        async move {
            goic::time::after(Duration::from_millis(5)).recv().await;
            ch.send("v").await.unwrap();
        }
    });

    let found = exec.run_sync({
        let ch = ch.clone();
        async move {
            loop {
                if let Some((index, value)) = select_default(vec![ch.case_recv().into()]).unwrap() {
                    break (index, value.ok(), value.downcast::<&'static str>());
                }
                goic::time::after(Duration::from_millis(1)).recv().await;
            }
        }
    });
    assert_eq!(found, (0, true, Some("v")));

    exec.run_sync(async move {
        ch.close();
    });
    let after_close = select_default(vec![ch.case_recv().into()]).unwrap().unwrap();
    assert_eq!(after_close.0, 0);
    assert!(!after_close.1.ok());
    assert_eq!(after_close.1.downcast::<&'static str>(), None);
}
