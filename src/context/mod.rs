//! Cancellation contexts (spec.md §4.5): a tree of [`Context`] values that
//! propagate cancellation and deadlines from parent to child and carry
//! request-scoped key/value pairs.
//!
//! Grounded on `examples/original_source/pygoic/context.py`: `Context` is
//! the Python ABC of the same name, `background`/`todo` are `Background`/
//! `TODO`, `with_cancel`/`with_deadline`/`with_timeout`/`with_value` are
//! `WithCancel`/`WithDeadline`/`WithTimeout`/`WithValue`, and `CancelFn` is
//! the closure `WithCancel` returns alongside its context.
//!
//! `_propagate_cancel` there has a fast path that attaches a child directly
//! to an ancestor `_CancelCtx`'s children list when one is found by walking
//! `value(_cancel_ctx_key)`, and a fallback that spawns a watcher goroutine
//! selecting on both `done()` channels when it isn't. Rust's trait objects
//! don't give us the Python-style `isinstance`/reflective walk that fast
//! path relies on without a parallel downcasting apparatus for every
//! `Context` impl in the tree (including ones defined outside this crate),
//! so this port always takes the watcher-task path. Multi-generation
//! cancellation still propagates correctly — a cancel at the root closes
//! its `done()`, which wakes its child's watcher, which cancels the child
//! and closes its own `done()`, and so on down the chain — just through one
//! scheduler hop per generation instead of an instant tree-wide fan-out.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::chan::Chan;
use crate::error::CtxError;
use crate::executor::Executor;
use crate::select::{select, AnyCase};

/// A node in a cancellation tree (spec.md §3, §4.5).
pub trait Context: Send + Sync {
    /// The time this context's work should stop, if any.
    fn deadline(&self) -> Option<Instant>;
    /// Closes when this context is canceled or its deadline passes.
    fn done(&self) -> Chan<()>;
    /// Why `done()` closed, if it has.
    fn err(&self) -> Option<CtxError>;
    /// Looks up a value carried by this context or one of its ancestors.
    ///
    /// Keys are compared by [`Any::type_id`], not by value: as in Go, a
    /// context key should be its own unexported type so two unrelated
    /// values can never collide, rather than a bare `&str`/`i32` whose type
    /// is shared by every other caller's keys too.
    fn value(&self, key: &(dyn Any + Send + Sync)) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// The closure returned alongside a derived context; calling it cancels
/// that context (and, transitively, its descendants). Idempotent.
pub struct CancelFn(Arc<dyn Fn() + Send + Sync>);

impl CancelFn {
    pub fn cancel(&self) {
        (self.0)()
    }
}

impl fmt::Debug for CancelFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancelFn")
    }
}

struct EmptyCtx;

impl Context for EmptyCtx {
    fn deadline(&self) -> Option<Instant> {
        None
    }
    fn done(&self) -> Chan<()> {
        Chan::nil()
    }
    fn err(&self) -> Option<CtxError> {
        None
    }
    fn value(&self, _key: &(dyn Any + Send + Sync)) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

/// The root of every context tree: never cancels, has no deadline, carries
/// no values. The conventional name for "I have no context yet but need
/// one to call something", same role as Go's `context.Background()`.
pub fn background() -> Arc<dyn Context> {
    Arc::new(EmptyCtx)
}

/// Identical to [`background`]; used at call sites that are unclear about
/// which context is appropriate, or during a migration toward threading a
/// real one through, matching Go's `context.TODO()` convention exactly.
pub fn todo() -> Arc<dyn Context> {
    Arc::new(EmptyCtx)
}

struct CancelState {
    done: Option<Chan<()>>,
    err: Option<CtxError>,
}

/// Grounded on `_CancelCtx` in context.py. Holds no children list (see the
/// module doc comment on why this port always uses the watcher-task
/// propagation path); cancelling it only ever needs to touch its own state.
struct CancelCtx {
    parent: Arc<dyn Context>,
    state: Mutex<CancelState>,
}

impl CancelCtx {
    fn new(parent: Arc<dyn Context>) -> Arc<Self> {
        Arc::new(CancelCtx { parent, state: Mutex::new(CancelState { done: None, err: None }) })
    }

    fn cancel(&self, err: CtxError) {
        let mut state = self.state.lock().unwrap();
        if state.err.is_some() {
            return;
        }
        tracing::debug!(?err, "context: canceled");
        state.err = Some(err);
        match &state.done {
            Some(c) => c.close(),
            None => {
                let c = Chan::new(0);
                c.close();
                state.done = Some(c);
            }
        }
    }
}

impl Context for CancelCtx {
    fn deadline(&self) -> Option<Instant> {
        self.parent.deadline()
    }

    fn done(&self) -> Chan<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = &state.done {
            return c.clone();
        }
        let c = Chan::new(0);
        if state.err.is_some() {
            c.close();
        }
        state.done = Some(c.clone());
        c
    }

    fn err(&self) -> Option<CtxError> {
        self.state.lock().unwrap().err
    }

    fn value(&self, key: &(dyn Any + Send + Sync)) -> Option<Arc<dyn Any + Send + Sync>> {
        self.parent.value(key)
    }
}

/// The executor used internally to run the watcher task `with_cancel`/
/// `with_deadline` spawn to propagate a parent's cancellation down to a
/// child (see the module doc comment). Separate from any `Executor` the
/// caller constructs for their own work, exactly as `executor.py`'s
/// module-level `_executor` singleton is separate from — and underlies —
/// every `go`/`do`/`delegate` call in that codebase; this is the same
/// pattern, scoped to this module's internal bookkeeping need.
fn watcher_executor() -> &'static Executor {
    static EXEC: OnceLock<Executor> = OnceLock::new();
    EXEC.get_or_init(Executor::new)
}

/// Spawns (or runs inline) the propagation from `parent` to a derived
/// context, invoking `on_parent_done` with the parent's cancellation
/// reason once it fires. `child_done` lets the watcher stop waiting once
/// the child is canceled through some other path (e.g. its own `CancelFn`)
/// so the watcher task doesn't outlive every context it watches.
fn propagate_cancel(
    parent: Arc<dyn Context>,
    child_done: Chan<()>,
    on_parent_done: impl FnOnce(CtxError) + Send + 'static,
) {
    let parent_done = parent.done();
    if parent_done.is_nil() {
        // parent never cancels (e.g. background()); nothing to watch.
        return;
    }
    let (already_done, _, _) = parent_done.try_recv();
    if already_done {
        on_parent_done(parent.err().unwrap_or(CtxError::Canceled));
        return;
    }

    watcher_executor().spawn(async move {
        let cases = vec![AnyCase::from(parent_done.case_recv()), AnyCase::from(child_done.case_recv())];
        if let Ok((0, _)) = select(cases).await {
            on_parent_done(parent.err().unwrap_or(CtxError::Canceled));
        }
    });
}

/// Derives a context that is canceled either explicitly (by calling the
/// returned [`CancelFn`]) or when `parent` is canceled, whichever happens
/// first.
pub fn with_cancel(parent: Arc<dyn Context>) -> (Arc<dyn Context>, CancelFn) {
    let ctx = CancelCtx::new(parent.clone());
    propagate_cancel(parent, ctx.done(), {
        let ctx = ctx.clone();
        move |err| ctx.cancel(err)
    });
    let for_cancel = ctx.clone();
    let cancel_fn = CancelFn(Arc::new(move || for_cancel.cancel(CtxError::Canceled)));
    (ctx as Arc<dyn Context>, cancel_fn)
}

/// Grounded on `_TimerCtx` in context.py: a [`CancelCtx`] plus a [`Timer`]
/// that cancels it with [`CtxError::DeadlineExceeded`] when the deadline
/// arrives. `deadline()` reports the fixed instant rather than delegating
/// up, everything else delegates to `inner`.
struct TimerCtx {
    inner: Arc<CancelCtx>,
    deadline: Instant,
    timer: Mutex<Option<crate::time::Timer>>,
}

impl Context for TimerCtx {
    fn deadline(&self) -> Option<Instant> {
        Some(self.deadline)
    }
    fn done(&self) -> Chan<()> {
        self.inner.done()
    }
    fn err(&self) -> Option<CtxError> {
        self.inner.err()
    }
    fn value(&self, key: &(dyn Any + Send + Sync)) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.value(key)
    }
}

/// Derives a context that is canceled when `parent` is canceled, when the
/// returned [`CancelFn`] is called, or at `deadline`, whichever is first.
pub fn with_deadline(parent: Arc<dyn Context>, deadline: Instant) -> (Arc<dyn Context>, CancelFn) {
    if let Some(parent_deadline) = parent.deadline() {
        if parent_deadline <= deadline {
            // parent already fires at least as soon; a separate timer
            // would only ever lose the race.
            return with_cancel(parent);
        }
    }

    let inner = CancelCtx::new(parent.clone());
    propagate_cancel(parent, inner.done(), {
        let inner = inner.clone();
        move |err| inner.cancel(err)
    });

    let now = Instant::now();
    let timer = if deadline <= now {
        inner.cancel(CtxError::DeadlineExceeded);
        None
    } else {
        let inner = inner.clone();
        Some(crate::time::Timer::from_callback(deadline - now, move || {
            inner.cancel(CtxError::DeadlineExceeded);
        }))
    };

    let ctx = Arc::new(TimerCtx { inner: inner.clone(), deadline, timer: Mutex::new(timer) });
    let for_cancel = ctx.clone();
    let cancel_fn = CancelFn(Arc::new(move || {
        for_cancel.inner.cancel(CtxError::Canceled);
        if let Some(t) = for_cancel.timer.lock().unwrap().take() {
            t.stop();
        }
    }));
    (ctx as Arc<dyn Context>, cancel_fn)
}

/// Shorthand for `with_deadline(parent, Instant::now() + timeout)`.
pub fn with_timeout(parent: Arc<dyn Context>, timeout: Duration) -> (Arc<dyn Context>, CancelFn) {
    with_deadline(parent, Instant::now() + timeout)
}

/// Grounded on `_ValueCtx` in context.py.
struct ValueCtx {
    parent: Arc<dyn Context>,
    key: Arc<dyn Any + Send + Sync>,
    val: Arc<dyn Any + Send + Sync>,
}

impl Context for ValueCtx {
    fn deadline(&self) -> Option<Instant> {
        self.parent.deadline()
    }
    fn done(&self) -> Chan<()> {
        self.parent.done()
    }
    fn err(&self) -> Option<CtxError> {
        self.parent.err()
    }
    fn value(&self, key: &(dyn Any + Send + Sync)) -> Option<Arc<dyn Any + Send + Sync>> {
        if (*self.key).type_id() == key.type_id() {
            Some(self.val.clone())
        } else {
            self.parent.value(key)
        }
    }
}

/// Derives a context carrying one extra key/value pair, falling through to
/// `parent` for any other key. Not for passing optional function
/// parameters — request-scoped data that crosses API boundaries only.
pub fn with_value(
    parent: Arc<dyn Context>,
    key: Arc<dyn Any + Send + Sync>,
    val: Arc<dyn Any + Send + Sync>,
) -> Arc<dyn Context> {
    Arc::new(ValueCtx { parent, key, val })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn background_never_cancels_and_has_no_value() {
        let ctx = background();
        assert!(ctx.done().is_nil());
        assert!(ctx.err().is_none());
        assert!(ctx.value(&"k").is_none());
    }

    #[test]
    fn with_cancel_closes_done_and_sets_err() {
        let exec = Executor::new();
        exec.run_sync(async {
            let (ctx, cancel) = with_cancel(background());
            assert!(ctx.err().is_none());
            cancel.cancel();
            let (_, ok) = ctx.done().recv().await;
            assert!(!ok);
            assert_eq!(ctx.err(), Some(CtxError::Canceled));
            cancel.cancel(); // idempotent
        });
    }

    #[test]
    fn canceling_parent_cancels_child() {
        let exec = Executor::new();
        exec.run_sync(async {
            let (parent, parent_cancel) = with_cancel(background());
            let (child, _child_cancel) = with_cancel(parent);
            parent_cancel.cancel();
            let (_, ok) = child.done().recv().await;
            assert!(!ok);
            assert_eq!(child.err(), Some(CtxError::Canceled));
        });
    }

    #[test]
    fn with_value_looks_up_through_parent() {
        struct KeyA;
        struct KeyB;
        let key_a: Arc<dyn Any + Send + Sync> = Arc::new(KeyA);
        let key_b: Arc<dyn Any + Send + Sync> = Arc::new(KeyB);
        let ctx = with_value(background(), key_a.clone(), Arc::new(42i32));
        assert_eq!(ctx.value(&*key_a).unwrap().downcast_ref::<i32>().copied(), Some(42));
        assert!(ctx.value(&*key_b).is_none());
    }

    #[test]
    fn with_timeout_fires_deadline_exceeded() {
        let exec = Executor::new();
        exec.run_sync(async {
            let (ctx, _cancel) = with_timeout(background(), Duration::from_millis(5));
            let (_, ok) = ctx.done().recv().await;
            assert!(!ok);
            assert_eq!(ctx.err(), Some(CtxError::DeadlineExceeded));
        });
    }

    #[test]
    fn canceling_before_done_is_ever_called_still_closes_it() {
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        let exec = Executor::new();
        exec.run_sync(async move {
            let (ctx, cancel) = with_cancel(background());
            cancel.cancel();
            let (_, ok) = ctx.done().recv().await;
            f.store(!ok, Ordering::SeqCst);
        });
        assert!(fired.load(Ordering::SeqCst));
    }
}
