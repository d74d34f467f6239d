//! # Safer-Promise: a thread-safe future/promise primitive
//!
//! [`AsyncOperation`] represents the eventual outcome of work that may finish
//! on any thread. Producers complete it exactly once; consumers query it,
//! block on it, attach continuations, request cancellation, or `.await` it.
//!
//! ## Key Features
//!
//! - **Exactly-once completion**: concurrent `try_set_*` calls race through a
//!   single packed atomic state word; one wins, the rest return `false`.
//! - **Safe publication**: a thread that observes completion always observes
//!   the result or error.
//! - **Continuations**: run inline on the completing thread, posted to a
//!   [`DispatchContext`], or forced asynchronous per operation. Registering
//!   after completion runs the callback immediately.
//! - **Cancellation**: advisory, requested once, honored by the operation's
//!   [`OperationBehavior`].
//! - **Lazy wait handle**: the blocking event is only allocated when someone
//!   actually waits.
//! - **Combinators**: [`when_all`], [`when_all_void`] and [`WhenAny`].
//!
//! ## Quick Start
//!
//! ```rust
//! use safer_promise::{AsyncOperation, OperationStatus};
//!
//! let operation = AsyncOperation::<u32>::new();
//! operation.add_continuation(|op| {
//!     assert_eq!(op.result(), Some(&42));
//! });
//!
//! let producer = operation.clone();
//! std::thread::spawn(move || producer.try_set_result(42).unwrap());
//!
//! assert_eq!(operation.join().unwrap(), 42);
//! assert_eq!(operation.status(), OperationStatus::RanToCompletion);
//! ```
//!
//! ## Awaiting
//!
//! ```rust
//! use safer_promise::{combinator, AsyncOperation};
//!
//! # #[tokio::main]
//! # async fn main() -> safer_promise::Result<()> {
//! let a = AsyncOperation::<i32>::new();
//! let b = AsyncOperation::<i32>::new();
//! let both = combinator::when_all([a.clone(), b.clone()])?;
//!
//! tokio::spawn(async move {
//!     a.try_set_result(1).unwrap();
//!     b.try_set_result(2).unwrap();
//! });
//!
//! assert_eq!(both.await?, vec![1, 2]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration and Logging
//!
//! ```rust,no_run
//! use safer_promise::{config, init_logging, PromiseConfig};
//!
//! let config = PromiseConfig::development();
//! init_logging(&config.logging);
//! config::install(config).unwrap();
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod combinator;
pub mod config;
pub mod context;
pub mod error;
pub mod future;
pub mod logging;
pub mod operation;
pub mod wait;

mod registry;
mod sync;

pub use combinator::{when_all, when_all_void, AnyPolicy, WhenAny};
pub use config::{ConfigBuilder, DispatchConfig, LoggingConfig, PromiseConfig, SpinConfig};
#[cfg(feature = "tokio")]
pub use context::TokioContext;
pub use context::{DispatchContext, LoopContext, ThreadContext};
pub use error::{OperationError, PromiseError, Result};
pub use future::OperationFuture;
pub use logging::{init_logging, LogLevel};
pub use operation::{
    AsyncOperation, AsyncResult, CreationOptions, DefaultBehavior, FnBehavior, OperationBehavior,
    OperationBuilder, OperationId, OperationStatus, WeakOperation,
};
pub use registry::ContinuationId;
pub use wait::WaitEvent;
