//! `goic`: CSP-style channels, `select`, cancellation contexts, timers, and
//! wait groups, all running on a single-threaded cooperative [`Executor`].
//!
//! This is a Rust port of the concurrency primitives in Go's runtime and
//! standard library (`chan`, `select`, `context`, `time.Timer`,
//! `sync.WaitGroup`), built directly from a Python reference
//! implementation (`pygoic`) rather than from Go source. The pieces compose
//! the way they do in Go: a [`Chan`] is a first-class value you can clone,
//! pass around, and wait on with [`select`] alongside other channels; a
//! [`context::Context`] tree carries cancellation and deadlines through a
//! call graph; an [`Executor`] is where the async code built from all of
//! the above actually runs.
//!
//! ```
//! use goic::{Chan, Executor};
//!
//! let exec = Executor::new();
//! let ch = Chan::new(1);
//! exec.run_sync(async move {
//!     ch.send(42).await.unwrap();
//!     let (value, ok) = ch.recv().await;
//!     assert_eq!(value, Some(42));
//!     assert!(ok);
//! });
//! ```

mod chan;
pub mod context;
mod error;
mod executor;
mod list;
mod select;
pub mod sync;
pub mod time;

pub use chan::{Chan, Iter};
pub use error::{ChannelClosed, CtxError, TrySendError};
pub use executor::{Executor, JoinHandle};
pub use select::{select, select_default, AnyCase, Case, SelectValue};

/// Re-exports the most commonly used items together, for `use goic::prelude::*;`.
pub mod prelude {
    pub use crate::context::{self, CancelFn, Context};
    pub use crate::sync::WaitGroup;
    pub use crate::time::{self, Timer};
    pub use crate::{select, select_default, AnyCase, Case, Chan, ChannelClosed, CtxError, Executor, SelectValue, TrySendError};
}
