//! The waiter record used by a plain (non-`select`) `send`/`recv`: a
//! single-shot, single-consumer cell plus a stored [`Waker`]. This is the
//! Rust analogue of pygoic's `_SimpleChanItemReader`/`_SimpleChanItemWriter`,
//! which wrap a bare `asyncio.Future`. Unlike a grouped waiter, a simple
//! slot never needs its own lock: it is only ever touched while the
//! channel's lock is held, by definition of how `send`/`recv` park it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

enum Inner<V> {
    Pending(Option<Waker>),
    Ready(V),
    Taken,
}

pub(crate) struct SimpleSlot<V> {
    inner: Mutex<Inner<V>>,
}

impl<V> SimpleSlot<V> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(SimpleSlot { inner: Mutex::new(Inner::Pending(None)) })
    }

    /// Delivers the outcome and wakes the parked task. Called by whichever
    /// side (peer send/recv, or `close`) fulfills this waiter while holding
    /// the channel's lock.
    pub(crate) fn fulfill(&self, value: V) {
        let mut guard = self.inner.lock().unwrap();
        let prior = std::mem::replace(&mut *guard, Inner::Ready(value));
        if let Inner::Pending(Some(waker)) = prior {
            waker.wake();
        }
    }
}

/// A future that resolves once some other thread calls [`SimpleSlot::fulfill`].
pub(crate) struct SlotFuture<V> {
    slot: Arc<SimpleSlot<V>>,
}

impl<V> SlotFuture<V> {
    pub(crate) fn new(slot: Arc<SimpleSlot<V>>) -> Self {
        SlotFuture { slot }
    }
}

impl<V> Future for SlotFuture<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<V> {
        let mut guard = self.slot.inner.lock().unwrap();
        match &mut *guard {
            Inner::Pending(waker) => {
                *waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Inner::Ready(_) => match std::mem::replace(&mut *guard, Inner::Taken) {
                Inner::Ready(v) => Poll::Ready(v),
                _ => unreachable!(),
            },
            Inner::Taken => panic!("goic: SlotFuture polled after completion"),
        }
    }
}

/// A future that never resolves, used for operations on the sentinel nil
/// channel (spec.md §4.2, §6): `send`/`recv` on `nil` block forever.
pub(crate) struct Forever<V>(std::marker::PhantomData<V>);

impl<V> Forever<V> {
    pub(crate) fn new() -> Self {
        Forever(std::marker::PhantomData)
    }
}

impl<V> Future for Forever<V> {
    type Output = V;
    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<V> {
        Poll::Pending
    }
}
