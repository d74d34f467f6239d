//! Operations composed from other operations.
//!
//! - [`when_all`] and [`when_all_void`] complete once every child has
//!   completed, and are driven by child continuations.
//! - [`WhenAny`] completes with the first child that satisfies its
//!   [`AnyPolicy`], and is driven by explicit polling.
//!
//! Combinators are ordinary [`AsyncOperation`](crate::AsyncOperation)s: they
//! can be awaited, waited on, cancelled and combined further. They share their
//! children with other observers and never complete them, except by
//! forwarding a cancellation request.

mod all;
mod any;


pub use all::{when_all, when_all_void};
pub use any::{AnyPolicy, WhenAny};
