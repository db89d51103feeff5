#![forbid(unsafe_code)]

//! Shared visibility flag with change notification and version tracking.
//!
//! [`VisibilityState`] is the single piece of state a visibility controller
//! publishes. It is shared between the controller, the platform callback that
//! writes it, and whatever UI code reads it, so it lives behind
//! `Rc<RefCell<..>>` like the runtime's other observables.
//!
//! # Invariants
//!
//! 1. `version` increments exactly once per write that changes the value.
//! 2. Writing the current value is a no-op (no version bump, no callbacks).
//! 3. Subscribers are notified in registration order.
//! 4. Dropping a [`Subscription`] stops its callback before the next change.
//!
//! # Failure Modes
//!
//! - **Re-entrant write**: writing from inside a subscriber runs a nested
//!   notification before the outer one finishes. Later subscribers of the
//!   outer round then see the older value as their argument.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type CallbackRc = Rc<dyn Fn(bool)>;
type CallbackWeak = Weak<dyn Fn(bool)>;

struct StateInner {
    visible: bool,
    version: u64,
    subscribers: Vec<CallbackWeak>,
}

/// A shared, version-tracked "is visible" flag.
///
/// Cloning produces another handle to the same flag.
#[derive(Clone)]
pub struct VisibilityState {
    inner: Rc<RefCell<StateInner>>,
}

impl std::fmt::Debug for VisibilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("VisibilityState")
            .field("visible", &inner.visible)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl Default for VisibilityState {
    fn default() -> Self {
        Self::new(false)
    }
}

impl VisibilityState {
    /// Create a flag with the given initial value at version 0.
    #[must_use]
    pub fn new(visible: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StateInner {
                visible,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> bool {
        self.inner.borrow().visible
    }

    /// Write a new value, notifying subscribers when it differs.
    ///
    /// Returns `true` when the value changed.
    pub fn set(&self, visible: bool) -> bool {
        if !self.write(visible) {
            return false;
        }
        self.notify(visible);
        true
    }

    /// Store `visible` without notifying. The caller owes a
    /// [`notify`](Self::notify) when this returns `true`.
    pub(crate) fn write(&self, visible: bool) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.visible == visible {
            return false;
        }
        inner.visible = visible;
        inner.version += 1;
        true
    }

    /// Number of value changes since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Register a callback invoked with the new value on every change.
    ///
    /// The callback stays registered for as long as the returned guard lives.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(bool) + 'static) -> Subscription {
        let strong: CallbackRc = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription { _callback: strong }
    }

    /// Registered subscribers, including dropped ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub(crate) fn notify(&self, visible: bool) {
        let callbacks: Vec<CallbackRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner.subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for cb in &callbacks {
            cb(visible);
        }
    }
}

/// RAII guard for a [`VisibilityState`] subscriber.
pub struct Subscription {
    _callback: CallbackRc,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
