//! A single-threaded cooperative executor with a dedicated worker thread
//! (spec.md §4.7).
//!
//! Grounded on `GoroutineExecutor` in
//! `examples/original_source/pygoic/executor.py`: `spawn` is `go` (fire and
//! forget onto the worker thread), `run_sync` is `do` (block the calling
//! thread until the submitted future resolves), and `delegate_blocking` is
//! `delegate` (hand CPU-bound work to a lazily-started pool). The run-loop
//! itself — poll what is ready, park the thread otherwise, wake by
//! unparking — is `futures_executor::local_pool::run_executor`
//! (`examples/alexcrichton-futures-rs/futures-executor/src/local_pool.rs`),
//! ported from that crate's now-obsolete `LocalWaker`/`TaskObj` pair onto
//! the stable `std::task::Waker` plus `futures_task::{ArcWake, waker_ref}`.
//! The blocking pool itself is grounded on `futures_cpupool::CpuPool`
//! (`examples/alexcrichton-futures-rs/futures-cpupool/src/pool.rs`): a fixed
//! set of worker threads pulling boxed jobs off an `mpsc` channel, simplified
//! since `goic`'s pool only ever delivers one result back per job rather than
//! also supporting cancellation.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context as TaskContext, Poll};
use std::thread::{self, ThreadId};

use futures_task::{waker_ref, ArcWake};

use crate::chan::slot::{SimpleSlot, SlotFuture};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;
type BlockingJob = Box<dyn FnOnce() + Send>;

struct Task {
    future: Mutex<Option<BoxedTask>>,
    shared: Weak<Shared>,
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if let Some(shared) = arc_self.shared.upgrade() {
            shared.queue.lock().unwrap().push_back(arc_self.clone());
            shared.unpark_worker();
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<Arc<Task>>>,
    worker: Mutex<Option<thread::Thread>>,
    worker_id: Mutex<Option<ThreadId>>,
    pool_tx: Mutex<Option<mpsc::Sender<BlockingJob>>>,
    pool_size: usize,
}

impl Shared {
    fn unpark_worker(&self) {
        if let Some(t) = self.worker.lock().unwrap().as_ref() {
            t.unpark();
        }
    }
}

fn poll_task(task: &Arc<Task>) {
    let mut slot = task.future.lock().unwrap();
    if let Some(mut fut) = slot.take() {
        let waker = waker_ref(task);
        let mut cx = TaskContext::from_waker(&waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {}
            Poll::Pending => *slot = Some(fut),
        }
    }
}

fn worker_run(shared: Arc<Shared>) {
    loop {
        let next = shared.queue.lock().unwrap().pop_front();
        match next {
            Some(task) => {
                tracing::trace!("executor: polling task");
                poll_task(&task);
            }
            None => thread::park(),
        }
    }
}

struct ParkWaker {
    thread: thread::Thread,
}

impl ArcWake for ParkWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.thread.unpark();
    }
}

/// Polls `fut` on the calling thread to completion, parking between wakeups.
/// The modern analogue of `futures_executor::local_pool::run_executor`.
fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = Box::pin(fut);
    let park_waker = Arc::new(ParkWaker { thread: thread::current() });
    let waker = waker_ref(&park_waker);
    let mut cx = TaskContext::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(v) => return v,
            Poll::Pending => thread::park(),
        }
    }
}

/// A handle to a task spawned with [`Executor::spawn`]; resolves once the
/// task's future completes.
pub struct JoinHandle<T>(SlotFuture<T>);

impl<T> Future for JoinHandle<T> {
    type Output = T;
    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<T> {
        let inner = unsafe { self.map_unchecked_mut(|h| &mut h.0) };
        inner.poll(cx)
    }
}

/// The single-threaded cooperative executor (spec.md §4.7): one dedicated
/// worker OS thread runs every spawned goroutine-style task, plus a
/// lazily-started pool of blocking-delegate threads for CPU-bound work that
/// must not stall the worker.
#[derive(Clone)]
pub struct Executor {
    shared: Arc<Shared>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// A pool with one blocking-delegate thread, started lazily.
    pub fn new() -> Self {
        Self::with_blocking_pool_size(1)
    }

    /// Like [`Executor::new`] but with `pool_size` blocking-delegate
    /// threads instead of one (spec.md §7b: pool size is a constructor
    /// argument, not a Cargo feature).
    pub fn with_blocking_pool_size(pool_size: usize) -> Self {
        assert!(pool_size > 0, "goic: blocking pool size must be at least 1");
        Executor {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                worker: Mutex::new(None),
                worker_id: Mutex::new(None),
                pool_tx: Mutex::new(None),
                pool_size,
            }),
        }
    }

    fn ensure_worker(&self) {
        let mut worker = self.shared.worker.lock().unwrap();
        if worker.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("goic-executor".into())
            .spawn(move || worker_run(shared))
            .expect("goic: failed to spawn executor worker thread");
        *self.shared.worker_id.lock().unwrap() = Some(handle.thread().id());
        *worker = Some(handle.thread().clone());
        // The handle itself is intentionally dropped (never joined): the
        // worker thread runs for the lifetime of the process, same as the
        // daemon thread `_init_worker` starts in executor.py.
    }

    fn ensure_pool(&self) {
        let mut tx = self.shared.pool_tx.lock().unwrap();
        if tx.is_some() {
            return;
        }
        let (sender, receiver) = mpsc::channel::<BlockingJob>();
        let receiver = Arc::new(Mutex::new(receiver));
        for i in 0..self.shared.pool_size {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("goic-blocking-{}", i))
                .spawn(move || loop {
                    let job = { receiver.lock().unwrap().recv() };
                    match job {
                        Ok(job) => job(),
                        Err(_) => return, // sender dropped, pool is shutting down
                    }
                })
                .expect("goic: failed to spawn blocking pool thread");
        }
        *tx = Some(sender);
    }

    /// Submits `fut` to run on the executor's worker thread without
    /// blocking the caller (spec.md §4.7's `go`). Safe to call from any
    /// thread, including one that is not the worker thread itself.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.ensure_worker();
        tracing::trace!("executor: spawn");
        let slot = SimpleSlot::new();
        let done = slot.clone();
        let wrapped = async move {
            fut.await;
            done.fulfill(());
        };
        let task = Arc::new(Task { future: Mutex::new(Some(Box::pin(wrapped))), shared: Arc::downgrade(&self.shared) });
        self.shared.queue.lock().unwrap().push_back(task);
        self.shared.unpark_worker();
        JoinHandle(SlotFuture::new(slot))
    }

    /// Runs `fut` on the worker thread and blocks the calling thread until
    /// it resolves (spec.md §4.7's `do`). Unlike [`Executor::spawn`], the
    /// result is returned directly rather than observed through a handle.
    ///
    /// Panics if called from inside the worker thread itself — that thread
    /// is the only one that can ever make `fut` progress, so blocking it
    /// here would deadlock forever instead of making progress, the same
    /// misuse `do()` rejects in `executor.py`.
    pub fn run_sync<F>(&self, fut: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.ensure_worker();
        assert!(
            self.shared.worker_id.lock().unwrap().as_ref() != Some(&thread::current().id()),
            "goic: run_sync called from inside the executor's own worker thread"
        );
        tracing::trace!("executor: run_sync");
        let slot = SimpleSlot::new();
        let done = slot.clone();
        let wrapped = async move {
            let out = fut.await;
            done.fulfill(out);
        };
        let task = Arc::new(Task { future: Mutex::new(Some(Box::pin(wrapped))), shared: Arc::downgrade(&self.shared) });
        self.shared.queue.lock().unwrap().push_back(task);
        self.shared.unpark_worker();
        block_on(SlotFuture::new(slot))
    }

    /// Hands `f` to the blocking-delegate pool and returns a future that
    /// resolves with its result (spec.md §4.7's `delegate`). Use this for
    /// CPU-bound or blocking-syscall work that would otherwise stall the
    /// single worker thread and every task parked behind it.
    pub fn delegate_blocking<F, R>(&self, f: F) -> impl Future<Output = R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_pool();
        tracing::trace!("executor: delegate_blocking dispatch");
        let slot = SimpleSlot::new();
        let done = slot.clone();
        let job: BlockingJob = Box::new(move || {
            let result = f();
            done.fulfill(result);
        });
        self.shared
            .pool_tx
            .lock()
            .unwrap()
            .as_ref()
            .expect("pool initialized above")
            .send(job)
            .expect("goic: blocking pool worker threads are gone");
        SlotFuture::new(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn run_sync_returns_future_output() {
        let exec = Executor::new();
        let out = exec.run_sync(async { 1 + 1 });
        assert_eq!(out, 2);
    }

    #[test]
    fn spawn_runs_in_background() {
        let exec = Executor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let handle = exec.spawn(async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        exec.run_sync(handle);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delegate_blocking_runs_off_worker_thread() {
        let exec = Executor::new();
        let out = exec.run_sync(exec.delegate_blocking(|| 6 * 7));
        assert_eq!(out, 42);
    }

    #[test]
    #[should_panic(expected = "run_sync called from inside the executor's own worker thread")]
    fn run_sync_inside_worker_panics() {
        // Engineers the misuse directly rather than via real nested
        // recursion: a panic raised on the worker thread itself would
        // just kill that (never-joined) thread silently instead of
        // failing this test, so the check is exercised by making the
        // calling thread *look* like the worker thread to `run_sync`.
        let exec = Executor::new();
        exec.ensure_worker();
        *exec.shared.worker_id.lock().unwrap() = Some(thread::current().id());
        exec.run_sync(async {});
    }
}
