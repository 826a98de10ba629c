#![forbid(unsafe_code)]

//! Presence bindings and binding scopes.
//!
//! [`PresenceBinding`] links an optional item to a boolean "is presented"
//! flag so item-driven and flag-driven presentation share the same
//! machinery. [`BindingScope`] owns subscriptions for a presented sheet.
//!
//! # Invariants
//!
//! 1. `PresenceBinding` prevents update cycles via a re-entrancy guard.
//! 2. Dropping a `PresenceBinding` disconnects both directions.
//! 3. After a `BindingScope` drops, none of its callbacks fire.

use std::cell::Cell;
use std::rc::Rc;

use super::observable::{Observable, Subscription};

// ---------------------------------------------------------------------------
// PresenceBinding: Option<I> <-> bool
// ---------------------------------------------------------------------------

/// Two-way link between an optional item and an "is presented" flag.
///
/// - item `Some(_)` sets the flag to `true`, `None` sets it to `false`;
/// - the flag going `false` clears the item;
/// - the flag going `true` on its own leaves the item untouched (there is
///   no item to invent).
///
/// Drop the binding to disconnect both directions.
pub struct PresenceBinding {
    _item_to_flag: Subscription,
    _flag_to_item: Subscription,
    _guard: Rc<Cell<bool>>,
}

impl PresenceBinding {
    /// Link `item` and `flag`, syncing the flag to the item's current state.
    pub fn new<I: Clone + PartialEq + 'static>(
        item: &Observable<Option<I>>,
        flag: &Observable<bool>,
    ) -> Self {
        flag.set(item.with(Option::is_some));

        let syncing = Rc::new(Cell::new(false));

        let flag_clone = flag.clone();
        let guard_if = Rc::clone(&syncing);
        let item_to_flag = item.subscribe(move |value| {
            if !guard_if.get() {
                guard_if.set(true);
                flag_clone.set(value.is_some());
                guard_if.set(false);
            }
        });

        let item_clone = item.clone();
        let guard_fi = Rc::clone(&syncing);
        let flag_to_item = flag.subscribe(move |presented| {
            if !guard_fi.get() && !*presented {
                guard_fi.set(true);
                item_clone.set(None);
                guard_fi.set(false);
            }
        });

        Self {
            _item_to_flag: item_to_flag,
            _flag_to_item: flag_to_item,
            _guard: syncing,
        }
    }
}

impl std::fmt::Debug for PresenceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceBinding").finish()
    }
}

// ---------------------------------------------------------------------------
// BindingScope: lifecycle management
// ---------------------------------------------------------------------------

/// Collects subscriptions for a logical scope (e.g., one presented sheet).
///
/// When the scope is dropped, all held subscriptions are released.
///
/// # Invariants
///
/// 1. After drop, no callbacks from this scope will fire.
/// 2. `clear()` releases all subscriptions immediately (reusable scope).
#[derive(Default)]
pub struct BindingScope {
    subscriptions: Vec<Subscription>,
    presence: Vec<PresenceBinding>,
}

impl BindingScope {
    /// Create an empty binding scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a subscription until the scope is dropped or cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    /// Hold a presence binding until the scope is dropped or cleared.
    pub fn hold_presence(&mut self, binding: PresenceBinding) {
        self.presence.push(binding);
    }

    /// Subscribe to an observable within this scope.
    pub fn subscribe<T: Clone + PartialEq + 'static>(
        &mut self,
        source: &Observable<T>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        let sub = source.subscribe(callback);
        self.subscriptions.push(sub);
        self
    }

    /// Number of active subscriptions and bindings in this scope.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.subscriptions.len() + self.presence.len()
    }

    /// Whether the scope holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.binding_count() == 0
    }

    /// Release everything immediately (scope stays reusable).
    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.presence.clear();
    }
}

impl std::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.binding_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
