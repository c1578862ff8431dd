//! Go-style channels (spec.md §4.2, §4.3, §4.4).
//!
//! Grounded throughout on `examples/original_source/pygoic/channel.py`:
//! `Chan` here is `_Chan`, `send_inner`/`recv_inner` below are
//! `_send_inner`/`_recv_inner`, and `register_send`/`register_recv` are
//! `_send_with_mutex`/`_recv_with_mutex`. The parked-waiter bookkeeping
//! (`State::readers`/`writers`) is `_Chan._readers`/`_writers`, backed here
//! by [`crate::list::IntrusiveList`] instead of Python's `LinkedList`.

pub(crate) mod group;
pub(crate) mod slot;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};

use futures_core::Stream;

use crate::error::{ChannelClosed, TrySendError};
use crate::list::{IntrusiveList, NodeId};
use crate::select::Case;

use group::{done_locked, fulfill_locked, lock_both, ErasedValue, GroupCore, GroupOutcome};
use slot::{Forever, SimpleSlot};

/// A waiter parked on the read side: either an ordinary `recv()`/`try_recv()`
/// caller, or a case registered by `select` (spec.md §3's "grouped waiter").
enum Reader<T> {
    Simple(Arc<SimpleSlot<(Option<T>, bool)>>),
    Grouped { group: Arc<GroupCore>, case: usize },
}

/// A waiter parked on the write side, carrying the item it wants to hand off.
enum Writer<T> {
    Simple(Arc<SimpleSlot<Result<(), ChannelClosed>>>, T),
    Grouped { group: Arc<GroupCore>, case: usize, item: T },
}

struct State<T> {
    buffer: VecDeque<T>,
    readers: IntrusiveList<Reader<T>>,
    writers: IntrusiveList<Writer<T>>,
    closed: bool,
}

struct Inner<T> {
    nil: bool,
    capacity: usize,
    state: Mutex<State<T>>,
}

/// Which side of a channel a parked node belongs to, so `select`'s cleanup
/// pass (spec.md §4.4) knows which list to remove it from.
#[derive(Clone, Copy)]
pub(crate) enum Side {
    Reader,
    Writer,
}

/// Outcome of registering a `select` case with a channel (spec.md §4.4).
pub(crate) enum Registered {
    /// Matched synchronously; the group has a result, nothing to clean up.
    Done,
    /// The group already had a result before this channel was even tried.
    AlreadyDecided,
    /// Parked; the caller must remember `(chan, side, node)` to unregister
    /// if a different case wins first.
    Parked(NodeId),
}

/// A Go-style channel: an `Arc`-shared FIFO mailbox of capacity `N`
/// (`N == 0` is the classic unbuffered/rendezvous channel), plus the nil
/// sentinel that blocks forever on every operation (spec.md §4.2).
pub struct Chan<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Chan<T> {
    fn clone(&self) -> Self {
        Chan { inner: self.inner.clone() }
    }
}

impl<T: Send + 'static> Chan<T> {
    pub fn new(capacity: usize) -> Self {
        Chan {
            inner: Arc::new(Inner {
                nil: false,
                capacity,
                state: Mutex::new(State {
                    buffer: VecDeque::new(),
                    readers: IntrusiveList::new(),
                    writers: IntrusiveList::new(),
                    closed: false,
                }),
            }),
        }
    }

    /// The sentinel nil channel: every send, recv, and select-case on it
    /// blocks forever and `close()` on it panics (spec.md §4.2).
    pub fn nil() -> Self {
        Chan {
            inner: Arc::new(Inner {
                nil: true,
                capacity: 0,
                state: Mutex::new(State {
                    buffer: VecDeque::new(),
                    readers: IntrusiveList::new(),
                    writers: IntrusiveList::new(),
                    closed: false,
                }),
            }),
        }
    }

    pub fn is_nil(&self) -> bool {
        self.inner.nil
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Blocking send. Resolves once the item is handed to a parked reader
    /// (directly, or via the one-slot buffer swap) or buffered; resolves to
    /// `Err` if the channel is already closed.
    pub async fn send(&self, item: T) -> Result<(), ChannelClosed> {
        if self.inner.nil {
            return Forever::new().await;
        }
        let slot = {
            let mut state = self.inner.state.lock().unwrap();
            match send_inner(&mut state, self.inner.capacity, item) {
                Ok(SendNow::Sent) => return Ok(()),
                Ok(SendNow::Blocked(item)) => {
                    let slot = SimpleSlot::new();
                    state.writers.append(Writer::Simple(slot.clone(), item));
                    slot
                }
                Err(_closed) => return Err(ChannelClosed),
            }
        };
        slot::SlotFuture::new(slot).await
    }

    /// Blocking receive. Resolves to `(Some(value), true)` on a delivered
    /// item, or `(None, false)` once the channel is closed and drained.
    pub async fn recv(&self) -> (Option<T>, bool) {
        if self.inner.nil {
            return Forever::new().await;
        }
        let slot = {
            let mut state = self.inner.state.lock().unwrap();
            match recv_inner(&mut state) {
                RecvNow::Got(v) => return (Some(v), true),
                RecvNow::Closed => return (None, false),
                RecvNow::WouldBlock => {
                    let slot = SimpleSlot::new();
                    state.readers.append(Reader::Simple(slot.clone()));
                    slot
                }
            }
        };
        slot::SlotFuture::new(slot).await
    }

    /// Non-blocking send (spec.md §4.2): succeeds immediately or returns the
    /// item back via [`TrySendError`].
    pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
        if self.inner.nil {
            return Err(TrySendError::new(item, false));
        }
        let mut state = self.inner.state.lock().unwrap();
        match send_inner(&mut state, self.inner.capacity, item) {
            Ok(SendNow::Sent) => Ok(()),
            Ok(SendNow::Blocked(item)) => Err(TrySendError::new(item, false)),
            Err(ClosedItem(item)) => Err(TrySendError::new(item, true)),
        }
    }

    /// Non-blocking receive (spec.md §4.2): `(progressed, value, ok)`.
    /// `progressed` is false only when the channel would have blocked.
    pub fn try_recv(&self) -> (bool, Option<T>, bool) {
        if self.inner.nil {
            return (false, None, false);
        }
        let mut state = self.inner.state.lock().unwrap();
        match recv_inner(&mut state) {
            RecvNow::Got(v) => (true, Some(v), true),
            RecvNow::Closed => (true, None, false),
            RecvNow::WouldBlock => (false, None, false),
        }
    }

    /// Closes the channel. Panics if it is already closed or is the nil
    /// sentinel (spec.md §4.2: both are programming errors).
    pub fn close(&self) {
        assert!(!self.inner.nil, "goic: close on nil channel");
        let mut state = self.inner.state.lock().unwrap();
        assert!(!state.closed, "goic: close on already-closed channel");
        state.closed = true;
        tracing::debug!(pending_readers = state.readers.len(), pending_writers = state.writers.len(), "channel closed");

        while let Some(reader) = state.readers.pop_left() {
            match reader {
                Reader::Simple(slot) => {
                    if let Some(v) = state.buffer.pop_front() {
                        slot.fulfill((Some(v), true));
                    } else {
                        slot.fulfill((None, false));
                    }
                }
                Reader::Grouped { group, case } => {
                    let mut g = group.lock();
                    if done_locked(&g) {
                        continue;
                    }
                    if let Some(v) = state.buffer.pop_front() {
                        fulfill_locked(&mut g, GroupOutcome::Fulfilled { index: case, value: Some(Box::new(v)), ok: true });
                    } else {
                        fulfill_locked(&mut g, GroupOutcome::Fulfilled { index: case, value: None, ok: false });
                    }
                }
            }
        }
        while let Some(writer) = state.writers.pop_left() {
            match writer {
                Writer::Simple(slot, _item) => slot.fulfill(Err(ChannelClosed)),
                Writer::Grouped { group, .. } => {
                    let mut g = group.lock();
                    if done_locked(&g) {
                        continue;
                    }
                    fulfill_locked(&mut g, GroupOutcome::Closed(ChannelClosed));
                }
            }
        }
    }

    /// Builds a `select` send-case for this channel (spec.md §4.3).
    pub fn case_send(&self, item: T) -> Case<T> {
        Case::Send(self.clone(), item)
    }

    /// Builds a `select` recv-case for this channel (spec.md §4.3).
    pub fn case_recv(&self) -> Case<T> {
        Case::Recv(self.clone())
    }

    /// A `Stream` that yields items until the channel closes (spec.md §4.2's
    /// "receive-until-closed" iterator view).
    pub fn iter(&self) -> Iter<T> {
        Iter { chan: self.clone(), pending: None }
    }

    pub(crate) fn register_send(&self, item: T, group: &Arc<GroupCore>, case: usize) -> Result<Registered, ChannelClosed> {
        if self.inner.nil {
            drop(item); // nil channel: never completes, never parks (spec.md §4.2)
            return Ok(Registered::AlreadyDecided);
        }
        if group.is_done() {
            return Ok(Registered::AlreadyDecided);
        }
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(ChannelClosed);
        }

        let mut item = Some(item);
        for id in state.readers.node_ids() {
            let cand_group = match state.readers.get(id) {
                Some(Reader::Grouped { group: cg, .. }) => Some(cg.clone()),
                Some(Reader::Simple(_)) => None,
                None => continue,
            };
            if let Some(cg) = &cand_group {
                if Arc::ptr_eq(cg, group) {
                    continue; // same select call on both sides: never self-fulfill (spec.md §4.4)
                }
            }
            match cand_group {
                None => {
                    let mut mine = group.lock();
                    if done_locked(&mine) {
                        return Ok(Registered::AlreadyDecided);
                    }
                    let reader = state.readers.remove(id).expect("peeked reader still linked");
                    let slot = match reader {
                        Reader::Simple(slot) => slot,
                        Reader::Grouped { .. } => unreachable!("peeked as Simple"),
                    };
                    slot.fulfill((item.take(), true));
                    fulfill_locked(&mut mine, GroupOutcome::Fulfilled { index: case, value: None, ok: true });
                    return Ok(Registered::Done);
                }
                Some(cg) => {
                    let (mut mine, mut theirs) = lock_both(group, &cg);
                    if done_locked(&mine) {
                        return Ok(Registered::AlreadyDecided);
                    }
                    let reader = state.readers.remove(id).expect("peeked reader still linked");
                    if done_locked(&theirs) {
                        continue; // candidate already claimed elsewhere, its node is gone, keep scanning
                    }
                    let rcase = match reader {
                        Reader::Grouped { case, .. } => case,
                        Reader::Simple(_) => unreachable!("peeked as Grouped"),
                    };
                    let value: ErasedValue = Box::new(item.take().expect("item not yet consumed"));
                    fulfill_locked(&mut theirs, GroupOutcome::Fulfilled { index: rcase, value: Some(value), ok: true });
                    fulfill_locked(&mut mine, GroupOutcome::Fulfilled { index: case, value: None, ok: true });
                    return Ok(Registered::Done);
                }
            }
        }

        if state.buffer.len() < self.inner.capacity {
            let mut mine = group.lock();
            if !done_locked(&mine) {
                state.buffer.push_back(item.take().expect("item not yet consumed"));
                fulfill_locked(&mut mine, GroupOutcome::Fulfilled { index: case, value: None, ok: true });
                return Ok(Registered::Done);
            }
            return Ok(Registered::AlreadyDecided);
        }

        let node = state.writers.append(Writer::Grouped { group: group.clone(), case, item: item.take().expect("item not yet consumed") });
        Ok(Registered::Parked(node))
    }

    pub(crate) fn register_recv(&self, group: &Arc<GroupCore>, case: usize) -> Registered {
        if self.inner.nil {
            return Registered::AlreadyDecided;
        }
        if group.is_done() {
            return Registered::AlreadyDecided;
        }
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            let mut mine = group.lock();
            if !done_locked(&mine) {
                if let Some(v) = state.buffer.pop_front() {
                    fulfill_locked(&mut mine, GroupOutcome::Fulfilled { index: case, value: Some(Box::new(v)), ok: true });
                } else {
                    fulfill_locked(&mut mine, GroupOutcome::Fulfilled { index: case, value: None, ok: false });
                }
            }
            return Registered::AlreadyDecided;
        }

        for id in state.writers.node_ids() {
            let cand_group = match state.writers.get(id) {
                Some(Writer::Grouped { group: cg, .. }) => Some(cg.clone()),
                Some(Writer::Simple(..)) => None,
                None => continue,
            };
            if let Some(cg) = &cand_group {
                if Arc::ptr_eq(cg, group) {
                    continue;
                }
            }
            match cand_group {
                None => {
                    let mut mine = group.lock();
                    if done_locked(&mine) {
                        return Registered::AlreadyDecided;
                    }
                    let writer = state.writers.remove(id).expect("peeked writer still linked");
                    let (slot, item) = match writer {
                        Writer::Simple(slot, item) => (slot, item),
                        Writer::Grouped { .. } => unreachable!("peeked as Simple"),
                    };
                    slot.fulfill(Ok(()));
                    let value = match state.buffer.pop_front() {
                        Some(front) => {
                            state.buffer.push_back(item);
                            front
                        }
                        None => item,
                    };
                    fulfill_locked(&mut mine, GroupOutcome::Fulfilled { index: case, value: Some(Box::new(value)), ok: true });
                    return Registered::Done;
                }
                Some(cg) => {
                    let (mut mine, mut theirs) = lock_both(group, &cg);
                    if done_locked(&mine) {
                        return Registered::AlreadyDecided;
                    }
                    let writer = state.writers.remove(id).expect("peeked writer still linked");
                    if done_locked(&theirs) {
                        continue;
                    }
                    let (wcase, item) = match writer {
                        Writer::Grouped { case, item, .. } => (case, item),
                        Writer::Simple(..) => unreachable!("peeked as Grouped"),
                    };
                    let value = match state.buffer.pop_front() {
                        Some(front) => {
                            state.buffer.push_back(item);
                            front
                        }
                        None => item,
                    };
                    fulfill_locked(&mut theirs, GroupOutcome::Fulfilled { index: wcase, value: None, ok: true });
                    fulfill_locked(&mut mine, GroupOutcome::Fulfilled { index: case, value: Some(Box::new(value)), ok: true });
                    return Registered::Done;
                }
            }
        }

        if !state.buffer.is_empty() {
            let mut mine = group.lock();
            if !done_locked(&mine) {
                let v = state.buffer.pop_front().unwrap();
                fulfill_locked(&mut mine, GroupOutcome::Fulfilled { index: case, value: Some(Box::new(v)), ok: true });
                return Registered::Done;
            }
            return Registered::AlreadyDecided;
        }

        let node = state.readers.append(Reader::Grouped { group: group.clone(), case });
        Registered::Parked(node)
    }

    /// Removes a parked select-case waiter this channel holds on behalf of
    /// a group that was fulfilled by some other case (spec.md §4.4 cleanup
    /// pass). Harmless no-op if it already fired.
    pub(crate) fn unregister(&self, side: Side, node: NodeId) {
        let mut state = self.inner.state.lock().unwrap();
        match side {
            Side::Reader => {
                state.readers.remove(node);
            }
            Side::Writer => {
                state.writers.remove(node);
            }
        }
    }
}

/// Item handed back to `try_send` when the channel is closed.
struct ClosedItem<T>(T);

enum SendNow<T> {
    Sent,
    Blocked(T),
}

enum RecvNow<T> {
    Got(T),
    Closed,
    WouldBlock,
}

/// Plain (non-`select`) send attempt: grounded on `_send_inner`. Pops the
/// first parked reader unconditionally and only then checks whether it was
/// discarded (a select-group waiter some other case already claimed).
fn send_inner<T>(state: &mut State<T>, capacity: usize, item: T) -> Result<SendNow<T>, ClosedItem<T>> {
    if state.closed {
        return Err(ClosedItem(item));
    }
    let mut item = item;
    for id in state.readers.node_ids() {
        let reader = match state.readers.remove(id) {
            Some(r) => r,
            None => continue,
        };
        match reader {
            Reader::Simple(slot) => {
                slot.fulfill((Some(item), true));
                return Ok(SendNow::Sent);
            }
            Reader::Grouped { group, case } => {
                let mut g = group.lock();
                if done_locked(&g) {
                    continue;
                }
                fulfill_locked(&mut g, GroupOutcome::Fulfilled { index: case, value: Some(Box::new(item)), ok: true });
                return Ok(SendNow::Sent);
            }
        }
    }
    if state.buffer.len() < capacity {
        state.buffer.push_back(item);
        return Ok(SendNow::Sent);
    }
    Ok(SendNow::Blocked(item))
}

/// Plain (non-`select`) receive attempt: grounded on `_recv_inner`,
/// including the one-slot buffer-swap rule (spec.md §4.2's fairness note)
/// applied when a parked writer is matched against a non-empty buffer.
fn recv_inner<T>(state: &mut State<T>) -> RecvNow<T> {
    if state.closed {
        return match state.buffer.pop_front() {
            Some(v) => RecvNow::Got(v),
            None => RecvNow::Closed,
        };
    }
    for id in state.writers.node_ids() {
        let writer = match state.writers.remove(id) {
            Some(w) => w,
            None => continue,
        };
        match writer {
            Writer::Simple(slot, item) => {
                slot.fulfill(Ok(()));
                return match state.buffer.pop_front() {
                    Some(front) => {
                        state.buffer.push_back(item);
                        RecvNow::Got(front)
                    }
                    None => RecvNow::Got(item),
                };
            }
            Writer::Grouped { group, case, item } => {
                let mut g = group.lock();
                if done_locked(&g) {
                    continue;
                }
                fulfill_locked(&mut g, GroupOutcome::Fulfilled { index: case, value: None, ok: true });
                drop(g);
                return match state.buffer.pop_front() {
                    Some(front) => {
                        state.buffer.push_back(item);
                        RecvNow::Got(front)
                    }
                    None => RecvNow::Got(item),
                };
            }
        }
    }
    match state.buffer.pop_front() {
        Some(v) => RecvNow::Got(v),
        None => RecvNow::WouldBlock,
    }
}

/// The `Stream` view returned by [`Chan::iter`] (spec.md §4.2).
pub struct Iter<T> {
    chan: Chan<T>,
    pending: Option<Pin<Box<dyn Future<Output = (Option<T>, bool)> + Send>>>,
}

impl<T: Send + 'static> Stream for Iter<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.pending.is_none() {
            let chan = this.chan.clone();
            this.pending = Some(Box::pin(async move { chan.recv().await }));
        }
        let fut = this.pending.as_mut().unwrap();
        match fut.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready((value, ok)) => {
                this.pending = None;
                Poll::Ready(if ok { value } else { None })
            }
        }
    }
}
