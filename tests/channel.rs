//! Scenarios 1-3 of spec.md §8, plus the FIFO/close invariants they imply.
//!
//! Grounded on `examples/original_source/tests/test_channel.py`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use goic::sync::WaitGroup;
use goic::{Chan, ChannelClosed, Executor};

/// Lets `RUST_LOG=trace cargo test -- --nocapture` surface the crate's
/// `tracing` output while chasing down a test failure.
fn init_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

#[test]
fn buffered_send_ordering() {
    // spec.md §8 scenario 1.
    init_tracing();
    let exec = Executor::new();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let ch: Chan<&'static str> = Chan::new(1);
    let wg = Arc::new(WaitGroup::new());
    wg.add(2);

    {
        let log = log.clone();
        let ch = ch.clone();
        let wg = wg.clone();
        exec.spawn(async move {
            ch.send("a").await.unwrap();
            log.lock().unwrap().push("A.a".into());
            ch.send("b").await.unwrap();
            log.lock().unwrap().push("A.b".into());
            wg.done();
        });
    }
    {
        let log = log.clone();
        let ch = ch.clone();
        let wg = wg.clone();
        exec.spawn(async move {
            goic::time::after(Duration::from_millis(20)).recv().await;
            let (v, ok) = ch.recv().await;
            assert!(ok);
            assert_eq!(v, Some("a"));
            log.lock().unwrap().push("B.a".into());
            let (v, ok) = ch.recv().await;
            assert!(ok);
            assert_eq!(v, Some("b"));
            log.lock().unwrap().push("B.b".into());
            wg.done();
        });
    }

    exec.run_sync({
        let wg = wg.clone();
        async move { wg.wait().await }
    });

    assert_eq!(*log.lock().unwrap(), vec!["A.a", "B.a", "A.b", "B.b"]);
}

#[test]
fn close_cascade_to_readers() {
    // spec.md §8 scenario 2.
    let exec = Executor::new();
    let ch: Chan<&'static str> = Chan::new(0);
    let results = Arc::new(Mutex::new(Vec::new()));
    let wg = Arc::new(WaitGroup::new());
    wg.add(2);

    {
        let ch = ch.clone();
        let results = results.clone();
        let wg = wg.clone();
        exec.spawn(async move {
            results.lock().unwrap().push(ch.recv().await);
            results.lock().unwrap().push(ch.recv().await);
            wg.done();
        });
    }
    {
        let ch = ch.clone();
        let wg = wg.clone();
        exec.spawn(async move {
            ch.send("x").await.unwrap();
            ch.close();
            wg.done();
        });
    }

    exec.run_sync({
        let wg = wg.clone();
        async move { wg.wait().await }
    });

    assert_eq!(*results.lock().unwrap(), vec![(Some("x"), true), (None, false)]);
}

#[test]
fn send_on_closed_channel_fails() {
    // spec.md §8 scenario 3.
    let exec = Executor::new();
    exec.run_sync(async {
        let ch: Chan<&'static str> = Chan::new(1);
        ch.close();
        let err = ch.send("y").await.unwrap_err();
        assert_eq!(err, ChannelClosed);

        let other: Chan<()> = Chan::new(0);
        let cases = vec![other.case_recv().into(), ch.case_send("y").into()];
        let err = goic::select(cases).await.unwrap_err();
        assert_eq!(err, ChannelClosed);
    });
}

#[test]
fn fifo_within_one_side() {
    // spec.md §8 invariant: FIFO within a channel's waiter side.
    let exec = Executor::new();
    let ch: Chan<i32> = Chan::new(0);
    let order = Arc::new(Mutex::new(Vec::new()));
    let wg = Arc::new(WaitGroup::new());
    wg.add(2);

    for id in 0..2 {
        let ch = ch.clone();
        let order = order.clone();
        let wg = wg.clone();
        exec.spawn(async move {
            let (_, ok) = ch.recv().await;
            assert!(ok);
            order.lock().unwrap().push(id);
            wg.done();
        });
    }

    exec.run_sync({
        let ch = ch.clone();
        async move {
            ch.send(1).await.unwrap();
            ch.send(2).await.unwrap();
            wg.wait().await;
        }
    });

    assert_eq!(*order.lock().unwrap(), vec![0, 1]);
}
