#![forbid(unsafe_code)]

//! Single-threaded runtime pieces for fitsheet: reactive values and the
//! main-loop scheduler that sheet animations and deferred state changes run
//! on.

pub mod reactive;
pub mod scheduler;

pub use reactive::{BindingScope, Observable, PresenceBinding, Subscription};
pub use scheduler::{MainLoop, TaskId};
