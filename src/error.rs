//! Error taxonomy (spec.md §7): a handful of small, distinct error types
//! rather than one catch-all enum, the same shape as
//! `futures_channel::mpsc::{SendError, TrySendError, TryRecvError}`
//! (`examples/alexcrichton-futures-rs/futures-channel/src/mpsc/mod.rs`).
//! Programming errors (closing an already-closed or nil channel, negative
//! `WaitGroup` counts, concurrent `add`/`wait` misuse, a null context parent)
//! are not modeled as `Result`s at all — they `panic!`, matching spec.md
//! §7's "not meant to be caught" policy.

use std::fmt;

/// Returned by [`crate::Chan::send`], [`crate::Chan::try_send`], and by
/// [`crate::select`] when a send-case targets a channel that is closed and
/// no other case wins first.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("send on closed channel")]
pub struct ChannelClosed;

/// Returned by [`crate::Chan::try_send`] describing why the non-blocking
/// send did not happen; carries the item back so the caller does not lose
/// it, mirroring `TrySendError::into_inner` in the teacher's mpsc channel.
#[derive(Debug)]
pub struct TrySendError<T> {
    item: T,
    closed: bool,
}

impl<T> TrySendError<T> {
    pub(crate) fn new(item: T, closed: bool) -> Self {
        TrySendError { item, closed }
    }

    /// True if the channel was closed rather than merely full.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Recovers the value that could not be sent.
    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.closed {
            write!(f, "send failed because channel is closed")
        } else {
            write!(f, "send failed because channel would block")
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

/// The two terminal [`crate::context::Context`] errors (spec.md §3, §4.5).
/// Compared by value, the same way Go code compares `context.Canceled`
/// against a sentinel rather than via `downcast`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtxError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}
