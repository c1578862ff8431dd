//! The select group: a single-writer mailbox shared by every case registered
//! by one call to [`crate::select`], plus the dual-lock protocol (spec.md
//! §4.4) used to fulfill a waiter that belongs to a group.
//!
//! Grounded on `_MutexGroup`/`_GeminiLock` in
//! `examples/original_source/pygoic/channel.py`: `_MutexGroup` becomes
//! [`GroupCore`] (an `asyncio.Future` replaced by a `Mutex` + stored
//! `Waker`), and `_GeminiLock` becomes [`lock_group_pair`], a free function
//! that acquires two group locks in a deterministic order instead of a
//! dedicated RAII type, since Rust's borrow checker already gives us scoped
//! guards.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use crate::error::ChannelClosed;

pub(crate) type ErasedValue = Box<dyn Any + Send>;

/// The outcome published into a group's slot by whichever case wins.
pub(crate) enum GroupOutcome {
    Fulfilled { index: usize, value: Option<ErasedValue>, ok: bool },
    Closed(ChannelClosed),
}

impl fmt::Debug for GroupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupOutcome::Fulfilled { index, ok, .. } => {
                f.debug_struct("Fulfilled").field("index", index).field("ok", ok).finish()
            }
            GroupOutcome::Closed(_) => f.write_str("Closed"),
        }
    }
}

pub(crate) enum Slot {
    Pending(Option<Waker>),
    Done(GroupOutcome),
}

/// Per-`select`-call coordination object: the "group" of spec.md §3.
///
/// `lock_id` gives a total order over groups so two groups racing to
/// fulfill each other on the same channel (a send-case of one meeting a
/// recv-case of the other) always acquire locks in the same order,
/// preventing the lock-ordering deadlock spec.md §4.4 calls out.
pub(crate) struct GroupCore {
    lock_id: u64,
    slot: Mutex<Slot>,
}

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

impl GroupCore {
    pub(crate) fn new() -> Self {
        GroupCore {
            lock_id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            slot: Mutex::new(Slot::Pending(None)),
        }
    }

    pub(crate) fn lock_id(&self) -> u64 {
        self.lock_id
    }

    /// Cheap, racy peek used only for the early-exit fast paths spec.md
    /// describes ("if group.done(): return"); any decision that matters is
    /// re-checked under the lock before acting.
    pub(crate) fn is_done(&self) -> bool {
        matches!(*self.slot.lock().unwrap(), Slot::Done(_))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap()
    }
}

pub(crate) fn done_locked(slot: &Slot) -> bool {
    matches!(slot, Slot::Done(_))
}

/// Publishes `outcome` into the slot if it is still pending, and wakes
/// whoever is polling the owning `select` future. Must be called with the
/// group's lock already held. No-op (other than the poisoning-free early
/// return) if the group already has a result — this is what makes
/// at-most-one-fulfillment hold even when two channels race to deliver.
pub(crate) fn fulfill_locked(slot: &mut MutexGuard<'_, Slot>, outcome: GroupOutcome) {
    if done_locked(slot) {
        return;
    }
    let prior = std::mem::replace(&mut **slot, Slot::Done(outcome));
    if let Slot::Pending(Some(waker)) = prior {
        waker.wake();
    }
}

pub(crate) fn register_waker_locked(slot: &mut MutexGuard<'_, Slot>, waker: Waker) -> Option<()> {
    match &mut **slot {
        Slot::Pending(w) => {
            *w = Some(waker);
            Some(())
        }
        Slot::Done(_) => None,
    }
}

pub(crate) fn take_result_locked(slot: &mut MutexGuard<'_, Slot>) -> Option<GroupOutcome> {
    match std::mem::replace(&mut **slot, Slot::Pending(None)) {
        Slot::Done(outcome) => Some(outcome),
        pending @ Slot::Pending(_) => {
            **slot = pending;
            None
        }
    }
}

/// Awaits a group's single result. Grounded on the `await group._future`
/// that ends pygoic's `select()`.
pub(crate) struct GroupFuture {
    group: Arc<GroupCore>,
}

impl GroupFuture {
    pub(crate) fn new(group: Arc<GroupCore>) -> Self {
        GroupFuture { group }
    }
}

impl Future for GroupFuture {
    type Output = GroupOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<GroupOutcome> {
        let mut slot = self.group.lock();
        if let Some(outcome) = take_result_locked(&mut slot) {
            return Poll::Ready(outcome);
        }
        register_waker_locked(&mut slot, cx.waker().clone());
        Poll::Pending
    }
}

/// Acquires two different groups' locks in the order fixed by their
/// `lock_id`s and returns both guards (`.0` always belongs to `a`, `.1` to
/// `b`, regardless of which was actually locked first). The Rust analogue
/// of pygoic's `_GeminiLock` context manager, written as a plain function
/// rather than an RAII guard-pair so callers keep ordinary control flow
/// (moves, early returns) between acquiring the locks and using them.
pub(crate) fn lock_both<'a>(
    a: &'a GroupCore,
    b: &'a GroupCore,
) -> (MutexGuard<'a, Slot>, MutexGuard<'a, Slot>) {
    debug_assert_ne!(a.lock_id, b.lock_id, "a group never pairs with itself");
    if a.lock_id < b.lock_id {
        let ga = a.lock();
        let gb = b.lock();
        (ga, gb)
    } else {
        let gb = b.lock();
        let ga = a.lock();
        (ga, gb)
    }
}
