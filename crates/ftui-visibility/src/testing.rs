#![forbid(unsafe_code)]

//! Scripted platform for deterministic tests.
//!
//! [`ScriptedPlatform`] records every resource it creates and every call made
//! on those resources, and lets a test push record batches into a resource's
//! callback with [`deliver`](ScriptedPlatform::deliver). Clones share state,
//! so a test keeps one handle for inspection and gives another to the
//! controller.
//!
//! Resources are addressed by creation index (`0` is the first one created).
//!
//! `deliver` does not filter by watched elements: it hands the batch to the
//! callback as-is, which is how tests exercise a platform that keeps reporting
//! after `unwatch`. It does refuse to deliver to a released resource, since the
//! callback is gone by then.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::ObserverOptions;
use crate::platform::{DetectionCallback, DetectionResource, VisibilityEntry, VisibilityPlatform};

/// A call made on a scripted resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCall<E> {
    Watch(E),
    Unwatch(E),
    ReleaseAll,
}

struct ResourceRecord<E> {
    options: ObserverOptions,
    callback: RefCell<Option<DetectionCallback<E>>>,
    calls: RefCell<Vec<ResourceCall<E>>>,
    released: Cell<bool>,
}

struct ScriptState<E> {
    available: bool,
    resources: Vec<Rc<ResourceRecord<E>>>,
    max_live: usize,
}

/// Recording platform with switchable availability.
pub struct ScriptedPlatform<E> {
    state: Rc<RefCell<ScriptState<E>>>,
}

impl<E> Clone for ScriptedPlatform<E> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<E> std::fmt::Debug for ScriptedPlatform<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ScriptedPlatform")
            .field("available", &state.available)
            .field("created", &state.resources.len())
            .field("max_live", &state.max_live)
            .finish()
    }
}

impl<E: Clone + PartialEq + 'static> Default for ScriptedPlatform<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + PartialEq + 'static> ScriptedPlatform<E> {
    /// A platform that supports visibility detection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ScriptState {
                available: true,
                resources: Vec::new(),
                max_live: 0,
            })),
        }
    }

    /// A platform without visibility detection.
    #[must_use]
    pub fn unavailable() -> Self {
        let platform = Self::new();
        platform.set_available(false);
        platform
    }

    /// Switch the capability on or off.
    pub fn set_available(&self, available: bool) {
        self.state.borrow_mut().available = available;
    }

    /// Resources created so far.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.state.borrow().resources.len()
    }

    /// Resources created and not yet released.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.state
            .borrow()
            .resources
            .iter()
            .filter(|r| !r.released.get())
            .count()
    }

    /// Highest number of simultaneously live resources ever observed.
    #[must_use]
    pub fn max_live(&self) -> usize {
        self.state.borrow().max_live
    }

    /// Calls made on resource `index`, in order. Empty for unknown indices.
    #[must_use]
    pub fn calls(&self, index: usize) -> Vec<ResourceCall<E>> {
        self.record(index)
            .map(|r| r.calls.borrow().clone())
            .unwrap_or_default()
    }

    /// Options resource `index` was created with.
    #[must_use]
    pub fn options(&self, index: usize) -> Option<ObserverOptions> {
        self.record(index).map(|r| r.options.clone())
    }

    /// Whether resource `index` has been released.
    #[must_use]
    pub fn is_released(&self, index: usize) -> bool {
        self.record(index).is_some_and(|r| r.released.get())
    }

    /// How many times `watch(element)` was called on resource `index`.
    #[must_use]
    pub fn watch_count(&self, index: usize, element: &E) -> usize {
        self.count_calls(index, |c| matches!(c, ResourceCall::Watch(e) if e == element))
    }

    /// How many times `unwatch(element)` was called on resource `index`.
    #[must_use]
    pub fn unwatch_count(&self, index: usize, element: &E) -> usize {
        self.count_calls(index, |c| matches!(c, ResourceCall::Unwatch(e) if e == element))
    }

    /// How many times `release_all()` was called on resource `index`.
    #[must_use]
    pub fn release_count(&self, index: usize) -> usize {
        self.count_calls(index, |c| matches!(c, ResourceCall::ReleaseAll))
    }

    /// Total `release_all()` calls across every resource.
    #[must_use]
    pub fn total_release_count(&self) -> usize {
        (0..self.created_count()).map(|i| self.release_count(i)).sum()
    }

    /// Hand `entries` to the callback of resource `index`.
    ///
    /// Returns `false` without calling anything when the resource does not
    /// exist, was released, or is already mid-delivery.
    pub fn deliver(&self, index: usize, entries: Vec<VisibilityEntry<E>>) -> bool {
        let Some(record) = self.record(index) else {
            return false;
        };
        if record.released.get() {
            return false;
        }
        let Some(mut callback) = record.callback.borrow_mut().take() else {
            return false;
        };

        let handle = ScriptedResource {
            record: Rc::clone(&record),
        };
        callback(entries.as_slice(), &handle);

        if !record.released.get() {
            *record.callback.borrow_mut() = Some(callback);
        }
        true
    }

    fn record(&self, index: usize) -> Option<Rc<ResourceRecord<E>>> {
        self.state.borrow().resources.get(index).cloned()
    }

    fn count_calls(&self, index: usize, pred: impl Fn(&ResourceCall<E>) -> bool) -> usize {
        self.record(index)
            .map(|r| r.calls.borrow().iter().filter(|c| pred(c)).count())
            .unwrap_or(0)
    }
}

/// Resource handed out by [`ScriptedPlatform`].
pub struct ScriptedResource<E> {
    record: Rc<ResourceRecord<E>>,
}

impl<E> std::fmt::Debug for ScriptedResource<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedResource")
            .field("released", &self.record.released.get())
            .field("calls", &self.record.calls.borrow().len())
            .finish()
    }
}

impl<E: Clone> DetectionResource<E> for ScriptedResource<E> {
    fn watch(&self, element: &E) {
        self.record
            .calls
            .borrow_mut()
            .push(ResourceCall::Watch(element.clone()));
    }

    fn unwatch(&self, element: &E) {
        self.record
            .calls
            .borrow_mut()
            .push(ResourceCall::Unwatch(element.clone()));
    }

    fn release_all(&self) {
        self.record.calls.borrow_mut().push(ResourceCall::ReleaseAll);
        self.record.released.set(true);
        self.record.callback.borrow_mut().take();
    }
}

impl<E: Clone + PartialEq + 'static> VisibilityPlatform<E> for ScriptedPlatform<E> {
    type Resource = ScriptedResource<E>;

    fn is_available(&self) -> bool {
        self.state.borrow().available
    }

    fn create_resource(
        &self,
        callback: DetectionCallback<E>,
        options: &ObserverOptions,
    ) -> ScriptedResource<E> {
        let record = Rc::new(ResourceRecord {
            options: options.clone(),
            callback: RefCell::new(Some(callback)),
            calls: RefCell::new(Vec::new()),
            released: Cell::new(false),
        });
        let mut state = self.state.borrow_mut();
        state.resources.push(Rc::clone(&record));
        let live = state
            .resources
            .iter()
            .filter(|r| !r.released.get())
            .count();
        state.max_live = state.max_live.max(live);
        ScriptedResource { record }
    }
}
