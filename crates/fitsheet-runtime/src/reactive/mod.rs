#![forbid(unsafe_code)]

//! Reactive data bindings for fitsheet.
//!
//! - [`Observable`]: a shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`PresenceBinding`]: links `Observable<Option<I>>` to an
//!   `Observable<bool>` presentation flag.
//! - [`BindingScope`]: holds subscriptions for the lifetime of an owner.
//!
//! # Architecture
//!
//! `Observable<T>` uses `Rc<RefCell<..>>` for single-threaded shared
//! ownership. Subscribers are stored as `Weak` slots and cleaned up lazily
//! during notification. Everything here lives on the UI thread.

pub mod binding;
pub mod observable;

pub use binding::{BindingScope, PresenceBinding};
pub use observable::{Observable, Subscription};
