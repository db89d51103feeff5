#![forbid(unsafe_code)]

//! Visibility observation controller.
//!
//! A [`VisibilityController`] binds one element at a time to a detection
//! resource created by a [`VisibilityPlatform`], and publishes a single
//! "is visible" flag through [`VisibilityState`].
//!
//! # Lifecycle
//!
//! ```text
//!   new ──► Idle ──attach(Some(el))──► Observing(el) ──attach(Some(el2))──► Observing(el2)
//!             ▲                            │   ▲                              │
//!             └──── attach(None)/release ──┘   └──── reconfigure(cfg') ───────┘
//! ```
//!
//! Every transition out of `Observing` releases the live resource before
//! anything else happens, and every transition into `Observing` creates a fresh
//! one through [`ResourceSlot::replace`], so a controller never holds two.
//!
//! # Invariants
//!
//! 1. At most one live resource per controller.
//! 2. The previous resource is released before its replacement is created.
//! 3. With `trigger_once`, the first visible record unwatches its target and
//!    later records for the same attachment are ignored.
//! 4. Records delivered by a resource after it was released are ignored.
//! 5. Without platform support the state is `true` and no resource exists.
//!
//! # Failure Modes
//!
//! - `attach(None, ..)` and `release()` with nothing attached are no-ops.
//! - An empty record batch reports "not visible".
//! - Subscribers run after [`ElementRef`](crate::ElementRef) drops its borrow
//!   of a [`SharedController`], and platform deliveries never borrow it, so
//!   subscribers reached that way may read or mutate the controller.
//! - A subscriber that borrows a [`SharedController`] while the caller still
//!   holds `borrow_mut()` on it (e.g. `shared.borrow_mut().attach(..)`)
//!   panics on the `RefCell` borrow.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, debug_span, trace};

use crate::config::DetectionConfig;
use crate::platform::{DetectionCallback, DetectionResource, VisibilityEntry, VisibilityPlatform};
use crate::slot::ResourceSlot;
use crate::state::{Subscription, VisibilityState};

/// A controller shared between a component and its [`ElementRef`](crate::ElementRef)s.
pub type SharedController<E, P> = Rc<RefCell<VisibilityController<E, P>>>;

/// Owns the detection resource for one observed element.
pub struct VisibilityController<E, P>
where
    E: Clone + PartialEq + 'static,
    P: VisibilityPlatform<E>,
{
    platform: P,
    config: DetectionConfig,
    state: VisibilityState,
    slot: ResourceSlot<E, P::Resource>,
    element: Option<E>,
    /// Cleared when the current attachment ends; checked by its callback.
    live: Option<Rc<Cell<bool>>>,
    generation: u64,
}

impl<E, P> std::fmt::Debug for VisibilityController<E, P>
where
    E: Clone + PartialEq + std::fmt::Debug + 'static,
    P: VisibilityPlatform<E>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityController")
            .field("element", &self.element)
            .field("config", &self.config)
            .field("visible", &self.state.get())
            .field("observing", &self.slot.is_occupied())
            .field("generation", &self.generation)
            .finish()
    }
}

impl<E, P> VisibilityController<E, P>
where
    E: Clone + PartialEq + 'static,
    P: VisibilityPlatform<E>,
{
    /// Create an idle controller.
    ///
    /// If the platform lacks visibility detection the state starts `true`.
    #[must_use]
    pub fn new(platform: P, config: DetectionConfig) -> Self {
        let supported = platform.is_available();
        if !supported {
            debug!("visibility detection unavailable; reporting visible");
        }
        Self {
            platform,
            config,
            state: VisibilityState::new(!supported),
            slot: ResourceSlot::new(),
            element: None,
            live: None,
            generation: 0,
        }
    }

    /// Wrap the controller for use with [`ElementRef`](crate::ElementRef).
    #[must_use]
    pub fn into_shared(self) -> SharedController<E, P> {
        Rc::new(RefCell::new(self))
    }

    /// Start observing `element` with `config`, or stop observing on `None`.
    ///
    /// Any live resource is released first. Without platform support the
    /// state is forced to `true` and no resource is created.
    pub fn attach(&mut self, element: Option<E>, config: DetectionConfig) {
        if let Some(visible) = self.stage(element, config) {
            self.state.notify(visible);
        }
    }

    /// Attach or detach using the stored configuration.
    ///
    /// This is what a framework's element-ref callback invokes on mount
    /// (`Some`) and unmount (`None`).
    pub fn set_element(&mut self, element: Option<E>) {
        let config = self.config.clone();
        self.attach(element, config);
    }

    /// [`set_element`](Self::set_element) without notifying subscribers.
    ///
    /// Returns the value subscribers still have to be told about, so a caller
    /// holding the controller's `RefCell` borrow can notify after dropping it.
    pub(crate) fn stage_element(&mut self, element: Option<E>) -> Option<bool> {
        let config = self.config.clone();
        self.stage(element, config)
    }

    /// Replace the configuration.
    ///
    /// When an element is attached and `config` differs from the current one,
    /// the resource is torn down and recreated for the same element. Returns
    /// `true` when the configuration changed.
    pub fn reconfigure(&mut self, config: DetectionConfig) -> bool {
        if config == self.config {
            return false;
        }
        debug!(
            trigger_once = config.trigger_once,
            thresholds = ?config.options.thresholds,
            "visibility config changed"
        );
        match self.element.clone() {
            Some(element) => self.attach(Some(element), config),
            None => self.config = config,
        }
        true
    }

    /// Release the live resource, if any, and forget the element.
    ///
    /// Safe to call any number of times.
    pub fn release(&mut self) {
        self.element = None;
        self.end_attachment();
    }

    /// Whether the element is currently considered visible.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.state.get()
    }

    /// Shared handle to the visibility flag.
    #[must_use]
    pub fn state(&self) -> &VisibilityState {
        &self.state
    }

    /// Register a callback fired on each visibility change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(bool) + 'static) -> Subscription {
        self.state.subscribe(callback)
    }

    /// Whether a detection resource is live.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.slot.is_occupied()
    }

    /// The attached element, if any.
    #[must_use]
    pub fn element(&self) -> Option<&E> {
        self.element.as_ref()
    }

    /// The current configuration.
    #[must_use]
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Whether the platform reports visibility detection right now.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.platform.is_available()
    }

    /// The platform this controller drives.
    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The live resource, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&P::Resource> {
        self.slot.get()
    }

    /// Number of attachments that created a resource.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn stage(&mut self, element: Option<E>, config: DetectionConfig) -> Option<bool> {
        let _span = debug_span!(
            "visibility_attach",
            has_element = element.is_some(),
            trigger_once = config.trigger_once
        )
        .entered();

        self.config = config;
        let Some(element) = element else {
            self.release();
            return self.force_visible_if_unsupported();
        };

        if !self.platform.is_available() {
            self.end_attachment();
            self.element = Some(element);
            return self.force_visible_if_unsupported();
        }

        self.observe(element);
        None
    }

    fn force_visible_if_unsupported(&self) -> Option<bool> {
        if self.platform.is_available() || !self.state.write(true) {
            return None;
        }
        debug!("visibility detection unavailable; reporting visible");
        Some(true)
    }

    fn observe(&mut self, element: E) {
        self.end_attachment();
        self.generation += 1;

        let live = Rc::new(Cell::new(true));
        let callback = detection_callback(
            self.state.clone(),
            Rc::clone(&live),
            self.config.trigger_once,
            self.generation,
        );

        let platform = &self.platform;
        let options = &self.config.options;
        let resource = self
            .slot
            .replace(|| platform.create_resource(callback, options));
        resource.watch(&element);

        debug!(
            generation = self.generation,
            trigger_once = self.config.trigger_once,
            "visibility resource created"
        );
        self.live = Some(live);
        self.element = Some(element);
    }

    fn end_attachment(&mut self) {
        if let Some(live) = self.live.take() {
            live.set(false);
        }
        if self.slot.release() {
            debug!(generation = self.generation, "visibility resource released");
        }
    }
}

impl<E, P> Drop for VisibilityController<E, P>
where
    E: Clone + PartialEq + 'static,
    P: VisibilityPlatform<E>,
{
    fn drop(&mut self) {
        self.release();
    }
}

fn detection_callback<E: 'static>(
    state: VisibilityState,
    live: Rc<Cell<bool>>,
    trigger_once: bool,
    generation: u64,
) -> DetectionCallback<E> {
    let settled = Cell::new(false);
    Box::new(
        move |entries: &[VisibilityEntry<E>], resource: &dyn DetectionResource<E>| {
            if !live.get() {
                trace!(generation, "ignoring records from a released resource");
                return;
            }
            if settled.get() {
                trace!(generation, "ignoring records after trigger-once detection");
                return;
            }

            let entry = entries.first();
            let visible = entry.is_some_and(|e| e.is_visible);
            trace!(generation, visible, batch = entries.len(), "visibility records");

            if let Some(entry) = entry.filter(|e| e.is_visible && trigger_once) {
                resource.unwatch(&entry.target);
                settled.set(true);
                trace!(generation, "trigger-once target unwatched");
            }
            state.set(visible);
        },
    )
}
