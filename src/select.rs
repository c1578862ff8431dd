//! `select` over a dynamic list of send/recv cases (spec.md §4.3).
//!
//! Grounded on `select()`, `_CaseSend`, and `_CaseRecv` in
//! `examples/original_source/pygoic/channel.py`. Because the case list is a
//! runtime `Vec`, not a compile-time macro, different cases close over
//! different channel element types — so a case is type-erased into
//! [`AnyCase`] the same way Go's `reflect.Select` takes a dynamic slice of
//! heterogeneous `SelectCase` values.

use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::chan::group::{done_locked, fulfill_locked, GroupCore, GroupFuture, GroupOutcome};
use crate::chan::{Chan, Registered, Side};
use crate::error::ChannelClosed;
use crate::list::NodeId;

/// One case of a `select`, built via [`Chan::case_send`]/[`Chan::case_recv`].
pub enum Case<T> {
    Recv(Chan<T>),
    Send(Chan<T>, T),
}

/// The value half of a `select` outcome: `ok` reports whether a recv-case's
/// channel was still open (always `true` for a completed send-case, per
/// spec.md §4.3); `downcast` recovers the concrete type the caller knows
/// statically from which index won.
pub struct SelectValue {
    value: Option<Box<dyn Any + Send>>,
    ok: bool,
}

impl SelectValue {
    pub fn ok(&self) -> bool {
        self.ok
    }

    /// Recovers the concrete value for a winning recv-case. `None` for a
    /// winning send-case (the item was moved into the channel; the caller
    /// already had it before constructing the case) or a recv from a
    /// channel that closed with an empty buffer.
    pub fn downcast<T: 'static>(self) -> Option<T> {
        self.value.and_then(|v| v.downcast::<T>().ok()).map(|boxed| *boxed)
    }
}

/// A type-erased [`Case`], the element type `select`/`select_default` take.
pub struct AnyCase(Box<dyn SelectCase>);

impl<T: Send + 'static> From<Case<T>> for AnyCase {
    fn from(case: Case<T>) -> Self {
        match case {
            Case::Recv(chan) => AnyCase(Box::new(RecvCase { chan })),
            Case::Send(chan, item) => AnyCase(Box::new(SendCase { chan, item: Mutex::new(Some(item)) })),
        }
    }
}

/// Internal, object-safe view of a case. Not exposed publicly; [`Case`] and
/// [`AnyCase`] are the public surface.
pub(crate) trait SelectCase: Send {
    fn register(&self, group: &Arc<GroupCore>, case: usize) -> Result<Registered, ChannelClosed>;
    fn unregister(&self, node: NodeId);
    fn try_now(&self, index: usize) -> Result<Option<(usize, SelectValue)>, ChannelClosed>;
}

struct RecvCase<T> {
    chan: Chan<T>,
}

impl<T: Send + 'static> SelectCase for RecvCase<T> {
    fn register(&self, group: &Arc<GroupCore>, case: usize) -> Result<Registered, ChannelClosed> {
        Ok(self.chan.register_recv(group, case))
    }

    fn unregister(&self, node: NodeId) {
        self.chan.unregister(Side::Reader, node);
    }

    fn try_now(&self, index: usize) -> Result<Option<(usize, SelectValue)>, ChannelClosed> {
        let (progressed, value, ok) = self.chan.try_recv();
        if !progressed {
            return Ok(None);
        }
        let value: Option<Box<dyn Any + Send>> = value.map(|v| Box::new(v) as Box<dyn Any + Send>);
        Ok(Some((index, SelectValue { value, ok })))
    }
}

struct SendCase<T> {
    chan: Chan<T>,
    item: Mutex<Option<T>>,
}

impl<T: Send + 'static> SelectCase for SendCase<T> {
    fn register(&self, group: &Arc<GroupCore>, case: usize) -> Result<Registered, ChannelClosed> {
        let item = self.item.lock().unwrap().take().expect("select case registered twice");
        self.chan.register_send(item, group, case)
    }

    fn unregister(&self, node: NodeId) {
        self.chan.unregister(Side::Writer, node);
    }

    fn try_now(&self, index: usize) -> Result<Option<(usize, SelectValue)>, ChannelClosed> {
        let item = self.item.lock().unwrap().take().expect("select case already used");
        match self.chan.try_send(item) {
            Ok(()) => Ok(Some((index, SelectValue { value: None, ok: true }))),
            Err(err) if err.is_closed() => {
                *self.item.lock().unwrap() = Some(err.into_inner());
                Err(ChannelClosed)
            }
            Err(err) => {
                *self.item.lock().unwrap() = Some(err.into_inner());
                Ok(None)
            }
        }
    }
}

/// Unregisters every parked case on drop, whether `select` finishes normally
/// or its future is dropped mid-await (e.g. raced against a timeout). The
/// Rust analogue of the `try/finally: group.release()` wrapping pygoic's
/// `select()` body.
struct ParkedGuard<'a> {
    cases: &'a [AnyCase],
    parked: Vec<(usize, NodeId)>,
}

impl<'a> Drop for ParkedGuard<'a> {
    fn drop(&mut self) {
        for (index, node) in self.parked.drain(..) {
            self.cases[index].0.unregister(node);
        }
    }
}

/// Blocks until exactly one case completes (spec.md §4.3, §4.4).
///
/// If a send-case's channel is closed and no case wins, resolves to
/// `Err(ChannelClosed)`; a closed recv-case channel is not an error, it is
/// a normal win with `ok == false`.
pub async fn select(cases: Vec<AnyCase>) -> Result<(usize, SelectValue), ChannelClosed> {
    let group = Arc::new(GroupCore::new());
    let mut closed_err: Option<ChannelClosed> = None;
    let mut guard = ParkedGuard { cases: &cases, parked: Vec::new() };

    for (index, case) in cases.iter().enumerate() {
        match case.0.register(&group, index) {
            Ok(Registered::Done) | Ok(Registered::AlreadyDecided) => {}
            Ok(Registered::Parked(node)) => guard.parked.push((index, node)),
            Err(err) => closed_err = Some(err),
        }
    }

    if let Some(err) = closed_err {
        let mut slot = group.lock();
        if !done_locked(&slot) {
            fulfill_locked(&mut slot, GroupOutcome::Closed(err));
        }
    }

    let outcome = GroupFuture::new(group.clone()).await;
    drop(guard);

    match outcome {
        GroupOutcome::Fulfilled { index, value, ok } => Ok((index, SelectValue { value, ok })),
        GroupOutcome::Closed(err) => Err(err),
    }
}

/// Non-blocking `select` (spec.md §4.3's `default` branch): tries every
/// case once in order and returns the first that can progress immediately,
/// or `Ok(None)` if every case would have blocked.
pub fn select_default(cases: Vec<AnyCase>) -> Result<Option<(usize, SelectValue)>, ChannelClosed> {
    let mut closed_err: Option<ChannelClosed> = None;
    for (index, case) in cases.iter().enumerate() {
        match case.0.try_now(index) {
            Ok(Some(hit)) => return Ok(Some(hit)),
            Ok(None) => {}
            Err(err) => closed_err = Some(err),
        }
    }
    match closed_err {
        Some(err) => Err(err),
        None => Ok(None),
    }
}
