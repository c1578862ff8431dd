//! `WaitGroup` (spec.md §4.8): blocks until a counter of outstanding
//! goroutines returns to zero.
//!
//! Grounded on `examples/original_source/pygoic/sync.py`. That
//! implementation wakes every waiter by wrapping one shared
//! `concurrent.futures.Future` per "generation" (the span between the
//! counter last being at zero and it returning to zero again) in a fresh
//! `asyncio.Future` per caller. This port gets the same wake-everyone
//! behavior for free by reusing [`Chan::close`], which already wakes every
//! parked reader — no bespoke broadcast-future type needed.

use std::sync::Mutex;

use crate::chan::Chan;

struct Inner {
    count: i64,
    waiters: usize,
    generation: Chan<()>,
}

/// Waits for a collection of goroutines to finish (spec.md §4.8). Each
/// goroutine calls [`WaitGroup::add`] before starting and [`WaitGroup::done`]
/// when finished; any number of callers can [`WaitGroup::wait`] for the
/// count to return to zero.
pub struct WaitGroup {
    inner: Mutex<Inner>,
}

impl WaitGroup {
    /// Starts at zero outstanding.
    pub fn new() -> Self {
        WaitGroup { inner: Mutex::new(Inner { count: 0, waiters: 0, generation: Chan::new(0) }) }
    }

    /// Adds `delta` (negative to count one down) to the counter.
    ///
    /// Panics if the result would go negative, or if called with a positive
    /// `delta` while a call to [`WaitGroup::wait`] is already in flight —
    /// both programming errors per spec.md §7, matching the `Exception`s
    /// `sync.py`'s `add` raises for the same misuse.
    pub fn add(&self, delta: i64) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            !(inner.waiters > 0 && delta > 0),
            "goic: WaitGroup misuse: add called concurrently with wait"
        );
        assert!(inner.count + delta >= 0, "goic: negative WaitGroup counter");
        inner.count += delta;
        if inner.count == 0 && inner.waiters > 0 {
            tracing::trace!("waitgroup: counter reached zero, waking waiters");
            inner.generation.close();
            inner.generation = Chan::new(0);
            inner.waiters = 0;
        }
    }

    /// Shorthand for `add(-1)`, called by a goroutine when it finishes.
    pub fn done(&self) {
        self.add(-1);
    }

    /// Blocks until the counter is zero. Returns immediately if it already
    /// is.
    pub async fn wait(&self) {
        let generation = {
            let mut inner = self.inner.lock().unwrap();
            if inner.count == 0 {
                return;
            }
            inner.waiters += 1;
            inner.generation.clone()
        };
        let _ = generation.recv().await;
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use std::sync::Arc;

    #[test]
    fn wait_returns_immediately_at_zero() {
        let exec = Executor::new();
        let wg = WaitGroup::new();
        exec.run_sync(async move { wg.wait().await });
    }

    #[test]
    fn wait_blocks_until_all_done() {
        let exec = Executor::new();
        let wg = Arc::new(WaitGroup::new());
        wg.add(3);
        for _ in 0..3 {
            let wg = wg.clone();
            exec.spawn(async move {
                wg.done();
            });
        }
        exec.run_sync({
            let wg = wg.clone();
            async move { wg.wait().await }
        });
        assert_eq!(wg.inner.lock().unwrap().count, 0);
    }

    #[test]
    #[should_panic(expected = "negative WaitGroup counter")]
    fn negative_counter_panics() {
        let wg = WaitGroup::new();
        wg.done();
    }

    #[test]
    #[should_panic(expected = "add called concurrently with wait")]
    fn add_while_waiting_panics() {
        let exec = Executor::new();
        let wg = Arc::new(WaitGroup::new());
        wg.add(1);
        let waiting = wg.clone();
        exec.spawn(async move {
            waiting.wait().await;
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        wg.add(1);
    }
}
