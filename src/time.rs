//! `Timer`, `after`, and `after_func` (spec.md §4.6).
//!
//! Grounded on `examples/original_source/pygoic/time.py`. That module
//! schedules callbacks on an `asyncio` event loop (`call_later`); this crate
//! has no central loop to hook into (each `Executor` is an independent
//! worker thread a caller may or may not even construct), so a timer here
//! owns a one-shot OS thread that sleeps for the duration and then fires,
//! checking the same "fresh active cell" flag `time.py`'s `_Value` wrapper
//! uses to make `stop`/`reset` race-free against a fire that is already in
//! flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::chan::Chan;
use crate::executor::Executor;
use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;

type FireFn = Arc<dyn Fn() + Send + Sync>;

struct TimerState {
    active: Arc<AtomicBool>,
}

/// A single pending firing (spec.md §4.6). `c` receives the fire time for
/// timers created via [`Timer::new`]/[`after`]; it is a [`Chan::nil`] for
/// timers created via [`after_func`], matching Go's `Timer.C` being unused
/// in that case.
pub struct Timer {
    pub c: Chan<Instant>,
    func: FireFn,
    state: Mutex<TimerState>,
}

fn spawn_fire(duration: Duration, active: Arc<AtomicBool>, func: FireFn) {
    thread::Builder::new()
        .name("goic-timer".into())
        .spawn(move || {
            thread::sleep(duration);
            if active.swap(false, Ordering::SeqCst) {
                tracing::trace!("timer: fire");
                func();
            }
        })
        .expect("goic: failed to spawn timer thread");
}

impl Timer {
    fn with_func(duration: Duration, func: FireFn, c: Chan<Instant>) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        spawn_fire(duration, active.clone(), func.clone());
        Timer { c, func, state: Mutex::new(TimerState { active }) }
    }

    /// Fires once after `duration`, delivering the fire time on `c`.
    pub fn new(duration: Duration) -> Self {
        let c = Chan::new(1);
        let c2 = c.clone();
        let func: FireFn = Arc::new(move || {
            let _ = c2.try_send(Instant::now());
        });
        Self::with_func(duration, func, c)
    }

    /// Internal building block behind [`after_func`] and the deadline timer
    /// in `context::with_deadline`: fires `f` directly rather than wrapping
    /// it in a spawned future, with no `C` channel involved.
    pub(crate) fn from_callback(duration: Duration, f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::with_func(duration, Arc::new(f), Chan::nil())
    }

    /// Prevents a pending fire from happening. Returns `true` if it was
    /// still pending (the fire was actually stopped), `false` if it had
    /// already fired or was already stopped.
    pub fn stop(&self) -> bool {
        self.state.lock().unwrap().active.swap(false, Ordering::SeqCst)
    }

    /// Re-arms the timer for `duration` from now, reusing the same
    /// callback. Returns `true` if a pending fire was still active (and is
    /// now superseded), `false` if the timer had already fired or stopped.
    pub fn reset(&self, duration: Duration) -> bool {
        let mut state = self.state.lock().unwrap();
        let was_active = state.active.swap(false, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));
        spawn_fire(duration, active.clone(), self.func.clone());
        state.active = active;
        was_active
    }
}

/// The executor `after_func` spawns its callback's future onto, the same
/// role `AfterFunc`'s `go(func())` plays in `time.py` — a process-wide
/// default rather than requiring every timer caller to carry their own
/// `Executor` around just to fire one callback.
fn fire_executor() -> &'static Executor {
    static EXEC: OnceLock<Executor> = OnceLock::new();
    EXEC.get_or_init(Executor::new)
}

/// Returns a channel that receives the current time once, after `duration`
/// (spec.md §4.6's `After`). Equivalent to `Timer::new(duration).c`, except
/// the `Timer` itself (and so `stop`/`reset`) isn't reachable — use
/// [`Timer::new`] directly when cancellation matters.
pub fn after(duration: Duration) -> Chan<Instant> {
    Timer::new(duration).c
}

/// Calls `f`, awaiting the future it returns on [`fire_executor`], once
/// `duration` elapses (spec.md §4.6's `AfterFunc`). Unlike `Timer::new`,
/// nothing is ever sent on `Timer::c` (a [`Chan::nil`]) — the side effect
/// is running `f`'s future, not delivering a value.
///
/// Takes `f: Fn() -> Fut` rather than `FnOnce() -> Fut`: `Timer::reset` can
/// re-arm and refire the same timer, and each refire needs to call `f`
/// again, the same way Go's `Timer.Reset` re-invokes an `AfterFunc`'s
/// function on every fire rather than consuming it once.
pub fn after_func<F, Fut>(duration: Duration, f: F) -> Timer
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Timer::from_callback(duration, move || {
        let fut: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(f());
        fire_executor().spawn(fut);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn new_delivers_fire_time() {
        let exec = Executor::new();
        exec.run_sync(async {
            let timer = Timer::new(Duration::from_millis(5));
            let (fired, ok) = timer.c.recv().await;
            assert!(ok);
            assert!(fired.is_some());
        });
    }

    #[test]
    fn stop_before_fire_prevents_it() {
        let timer = Timer::new(Duration::from_millis(50));
        assert!(timer.stop());
        assert!(!timer.stop()); // already stopped
    }

    #[test]
    fn reset_reports_whether_prior_fire_was_pending() {
        let timer = Timer::new(Duration::from_millis(50));
        assert!(timer.reset(Duration::from_millis(50)));
        thread::sleep(Duration::from_millis(80));
        assert!(!timer.reset(Duration::from_millis(50)));
    }

    #[test]
    fn after_func_runs_callback_once_fired() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _timer = after_func(Duration::from_millis(5), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        thread::sleep(Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
