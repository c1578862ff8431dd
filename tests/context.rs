//! Scenario 6 of spec.md §8: context deadline propagation through a mixed
//! `with_timeout`/`with_value` chain.
//!
//! Grounded on `examples/original_source/tests/test_context.py`.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use goic::context::{background, with_timeout, with_value};
use goic::{CtxError, Executor};

#[test]
fn deadline_propagation_through_value_layers() {
    // spec.md §8 scenario 6.
    let exec = Executor::new();
    exec.run_sync(async {
        struct MarkerKey;
        let key: Arc<dyn Any + Send + Sync> = Arc::new(MarkerKey);

        let (c2, _cancel2) = with_timeout(background(), Duration::from_millis(40));
        let c3 = with_value(c2.clone(), key, Arc::new("v3"));
        let (c4, _cancel4) = with_timeout(c3.clone(), Duration::from_millis(10));
        let c5 = with_value(c4.clone(), Arc::new(()) as Arc<dyn Any + Send + Sync>, Arc::new("unused"));

        let (_, ok) = c5.done().recv().await;
        assert!(!ok);
        assert_eq!(c4.err(), Some(CtxError::DeadlineExceeded));
        assert_eq!(c5.err(), Some(CtxError::DeadlineExceeded));
        assert_eq!(c2.err(), None);
        assert_eq!(c3.err(), None);

        let (_, ok) = c3.done().recv().await;
        assert!(!ok);
        assert_eq!(c2.err(), Some(CtxError::DeadlineExceeded));
        assert_eq!(c3.err(), Some(CtxError::DeadlineExceeded));
    });
}

#[test]
fn canceling_root_cancels_every_descendant() {
    let exec = Executor::new();
    exec.run_sync(async {
        let (root, cancel_root) = goic::context::with_cancel(background());
        let (mid, _cancel_mid) = goic::context::with_cancel(root.clone());
        let (leaf, _cancel_leaf) = goic::context::with_cancel(mid.clone());

        cancel_root.cancel();

        let (_, ok) = leaf.done().recv().await;
        assert!(!ok);
        assert_eq!(root.err(), Some(CtxError::Canceled));
        assert_eq!(mid.err(), Some(CtxError::Canceled));
        assert_eq!(leaf.err(), Some(CtxError::Canceled));
    });
}
