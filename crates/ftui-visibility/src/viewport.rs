#![forbid(unsafe_code)]

//! In-process visibility detection for hosts that own their layout.
//!
//! [`ViewportPlatform`] implements [`VisibilityPlatform`] for UIs that already
//! know where every element sits, such as a scroll view in a terminal UI. The
//! host reports geometry and then calls [`dispatch`](ViewportPlatform::dispatch)
//! once per event turn; nothing is measured or delivered in between, so there
//! is no timer and no polling.
//!
//! # Delivery Rules
//!
//! For each live resource, in creation order, and each element it watches, in
//! watch order:
//!
//! 1. The viewing region is the viewport grown by the resource's root margin.
//! 2. The element is *intersecting* when its bounds touch or overlap that
//!    region; elements without reported bounds never intersect.
//! 3. The intersection ratio is overlap area over element area (`1.0` for an
//!    intersecting zero-area element).
//! 4. The element is *visible* when intersecting and the ratio reaches the
//!    lowest threshold.
//! 5. A record is produced on the first dispatch after `watch`, and afterwards
//!    only when the element's threshold bucket changes.
//!
//! A resource with at least one record receives them as one batch.
//!
//! # Example
//!
//! ```
//! use ftui_visibility::viewport::{Bounds, ViewportPlatform};
//! use ftui_visibility::{DetectionConfig, VisibilityController};
//!
//! let platform = ViewportPlatform::new(Bounds::new(0, 0, 80, 24));
//! platform.set_bounds("row-40", Bounds::new(0, 40, 80, 1));
//!
//! let mut ctrl = VisibilityController::new(platform.clone(), DetectionConfig::once());
//! ctrl.attach(Some("row-40"), DetectionConfig::once());
//!
//! platform.dispatch();
//! assert!(!ctrl.is_visible());
//!
//! platform.scroll_by(0, 20);
//! platform.dispatch();
//! assert!(ctrl.is_visible());
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::config::{ObserverOptions, RootMargin};
use crate::platform::{DetectionCallback, DetectionResource, VisibilityEntry, VisibilityPlatform};

/// Axis-aligned rectangle in host units.
///
/// Negative widths and heights are treated as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    /// Create bounds from position and size.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    #[must_use]
    pub const fn left(&self) -> i32 {
        self.x
    }

    #[inline]
    #[must_use]
    pub const fn top(&self) -> i32 {
        self.y
    }

    #[inline]
    #[must_use]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width.max(0))
    }

    #[inline]
    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height.max(0))
    }

    /// Area, never negative.
    #[must_use]
    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }

    /// Bounds moved by `(dx, dy)`.
    #[must_use]
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            ..*self
        }
    }

    /// Bounds grown on each edge by `margin` (shrunk for negative values).
    #[must_use]
    pub fn expand(&self, margin: RootMargin) -> Self {
        let x = self.x.saturating_sub(margin.left);
        let y = self.y.saturating_sub(margin.top);
        let right = self.right().saturating_add(margin.right);
        let bottom = self.bottom().saturating_add(margin.bottom);
        Self {
            x,
            y,
            width: right.saturating_sub(x).max(0),
            height: bottom.saturating_sub(y).max(0),
        }
    }

    /// Overlap with `other`. Edge-adjacent bounds yield a zero-area overlap;
    /// disjoint bounds yield `None`.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let x = self.left().max(other.left());
        let y = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right >= x && bottom >= y)
            .then(|| Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y)))
    }
}

/// Result of measuring one element against a viewing region.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Measurement {
    visible: bool,
    ratio: f64,
    bucket: usize,
}

fn measure(root: Bounds, target: Option<Bounds>, options: &ObserverOptions) -> Measurement {
    let hidden = Measurement {
        visible: false,
        ratio: 0.0,
        bucket: 0,
    };
    let Some(target) = target else {
        return hidden;
    };
    let Some(overlap) = target.intersection(&root) else {
        return hidden;
    };

    let ratio = match target.area() {
        0 => 1.0,
        area => overlap.area() as f64 / area as f64,
    };
    let reached = options
        .thresholds
        .iter()
        .filter(|&&t| t > 0.0 && ratio >= t)
        .count();
    Measurement {
        visible: ratio >= options.min_threshold(),
        ratio,
        bucket: 1 + reached,
    }
}

struct Watched<E> {
    element: E,
    /// `None` until the first dispatch after `watch`.
    last_bucket: Option<usize>,
}

struct ResourceInner<E> {
    id: u64,
    /// Validated; thresholds sorted ascending and deduplicated.
    options: ObserverOptions,
    callback: RefCell<Option<DetectionCallback<E>>>,
    watched: RefCell<Vec<Watched<E>>>,
    released: Cell<bool>,
}

struct ViewportState<E> {
    viewport: Bounds,
    bounds: Vec<(E, Bounds)>,
    resources: Vec<Weak<ResourceInner<E>>>,
    next_id: u64,
}

impl<E: PartialEq> ViewportState<E> {
    fn bounds_of(&self, element: &E) -> Option<Bounds> {
        self.bounds
            .iter()
            .find(|(e, _)| e == element)
            .map(|(_, b)| *b)
    }
}

/// Layout-driven visibility platform.
///
/// Clones share the same viewport, element bounds, and resources.
pub struct ViewportPlatform<E> {
    state: Rc<RefCell<ViewportState<E>>>,
}

impl<E> Clone for ViewportPlatform<E> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<E> std::fmt::Debug for ViewportPlatform<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ViewportPlatform")
            .field("viewport", &state.viewport)
            .field("elements", &state.bounds.len())
            .field("resources", &state.resources.len())
            .finish()
    }
}

impl<E: Clone + PartialEq + 'static> ViewportPlatform<E> {
    /// Create a platform with the given viewport and no elements.
    #[must_use]
    pub fn new(viewport: Bounds) -> Self {
        Self {
            state: Rc::new(RefCell::new(ViewportState {
                viewport,
                bounds: Vec::new(),
                resources: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Current viewport.
    #[must_use]
    pub fn viewport(&self) -> Bounds {
        self.state.borrow().viewport
    }

    /// Replace the viewport (resize or jump).
    pub fn set_viewport(&self, viewport: Bounds) {
        self.state.borrow_mut().viewport = viewport;
    }

    /// Move the viewport by `(dx, dy)`; positive `dy` scrolls down.
    pub fn scroll_by(&self, dx: i32, dy: i32) {
        let mut state = self.state.borrow_mut();
        state.viewport = state.viewport.offset(dx, dy);
    }

    /// Report where `element` is laid out.
    pub fn set_bounds(&self, element: E, bounds: Bounds) {
        let mut state = self.state.borrow_mut();
        match state.bounds.iter_mut().find(|(e, _)| *e == element) {
            Some((_, b)) => *b = bounds,
            None => state.bounds.push((element, bounds)),
        }
    }

    /// Forget the layout of `element`; it then counts as not intersecting.
    pub fn remove_bounds(&self, element: &E) {
        self.state.borrow_mut().bounds.retain(|(e, _)| e != element);
    }

    /// Last reported bounds of `element`.
    #[must_use]
    pub fn bounds(&self, element: &E) -> Option<Bounds> {
        self.state.borrow().bounds_of(element)
    }

    /// Resources created and not yet released or dropped.
    #[must_use]
    pub fn live_resources(&self) -> usize {
        self.state
            .borrow()
            .resources
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|r| !r.released.get())
            .count()
    }

    /// Measure every watched element and deliver changed records.
    ///
    /// Returns the number of batches delivered.
    pub fn dispatch(&self) -> usize {
        let resources: Vec<Rc<ResourceInner<E>>> = {
            let mut state = self.state.borrow_mut();
            state.resources.retain(|w| {
                w.upgrade().is_some_and(|r| !r.released.get())
            });
            state.resources.iter().filter_map(Weak::upgrade).collect()
        };

        let mut delivered = 0;
        for resource in resources {
            if resource.released.get() {
                continue;
            }
            let entries = self.collect_changes(&resource);
            if entries.is_empty() {
                continue;
            }
            let Some(mut callback) = resource.callback.borrow_mut().take() else {
                continue;
            };
            trace!(resource = resource.id, records = entries.len(), "viewport dispatch");

            let handle = ViewportResource {
                inner: Rc::clone(&resource),
            };
            callback(entries.as_slice(), &handle);
            delivered += 1;

            if !resource.released.get() {
                *resource.callback.borrow_mut() = Some(callback);
            }
        }
        delivered
    }

    fn collect_changes(&self, resource: &ResourceInner<E>) -> Vec<VisibilityEntry<E>> {
        let state = self.state.borrow();
        let root = state.viewport.expand(resource.options.root_margin);
        let mut watched = resource.watched.borrow_mut();
        watched
            .iter_mut()
            .filter_map(|w| {
                let m = measure(root, state.bounds_of(&w.element), &resource.options);
                if w.last_bucket == Some(m.bucket) {
                    return None;
                }
                w.last_bucket = Some(m.bucket);
                Some(VisibilityEntry {
                    target: w.element.clone(),
                    is_visible: m.visible,
                    intersection_ratio: m.ratio,
                })
            })
            .collect()
    }
}

/// Resource created by [`ViewportPlatform`].
pub struct ViewportResource<E> {
    inner: Rc<ResourceInner<E>>,
}

impl<E> std::fmt::Debug for ViewportResource<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportResource")
            .field("id", &self.inner.id)
            .field("watched", &self.inner.watched.borrow().len())
            .field("released", &self.inner.released.get())
            .finish()
    }
}

impl<E> ViewportResource<E> {
    /// Number of elements currently watched.
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.inner.watched.borrow().len()
    }
}

impl<E: Clone + PartialEq> DetectionResource<E> for ViewportResource<E> {
    fn watch(&self, element: &E) {
        if self.inner.released.get() {
            return;
        }
        let mut watched = self.inner.watched.borrow_mut();
        if watched.iter().all(|w| w.element != *element) {
            watched.push(Watched {
                element: element.clone(),
                last_bucket: None,
            });
        }
    }

    fn unwatch(&self, element: &E) {
        self.inner
            .watched
            .borrow_mut()
            .retain(|w| w.element != *element);
    }

    fn release_all(&self) {
        self.inner.released.set(true);
        self.inner.watched.borrow_mut().clear();
        self.inner.callback.borrow_mut().take();
    }
}

impl<E: Clone + PartialEq + 'static> VisibilityPlatform<E> for ViewportPlatform<E> {
    type Resource = ViewportResource<E>;

    fn is_available(&self) -> bool {
        true
    }

    fn create_resource(
        &self,
        callback: DetectionCallback<E>,
        options: &ObserverOptions,
    ) -> ViewportResource<E> {
        let options = options.clone().normalized().unwrap_or_else(|err| {
            warn!(%err, "invalid observer options; using defaults");
            ObserverOptions::default()
        });

        let mut state = self.state.borrow_mut();
        state.resources.retain(|w| w.upgrade().is_some_and(|r| !r.released.get()));
        let id = state.next_id;
        state.next_id += 1;
        let inner = Rc::new(ResourceInner {
            id,
            options,
            callback: RefCell::new(Some(callback)),
            watched: RefCell::new(Vec::new()),
            released: Cell::new(false),
        });
        state.resources.push(Rc::downgrade(&inner));
        ViewportResource { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::controller::VisibilityController;

    fn recorder() -> (Rc<RefCell<Vec<(u32, bool)>>>, DetectionCallback<u32>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let cb: DetectionCallback<u32> = Box::new(move |entries, _| {
            l.borrow_mut()
                .extend(entries.iter().map(|e| (e.target, e.is_visible)));
        });
        (log, cb)
    }

    fn screen() -> ViewportPlatform<u32> {
        ViewportPlatform::new(Bounds::new(0, 0, 10, 10))
    }

    #[test]
    fn intersection_overlap_and_touching() {
        let a = Bounds::new(0, 0, 10, 10);
        assert_eq!(
            a.intersection(&Bounds::new(5, 5, 10, 10)),
            Some(Bounds::new(5, 5, 5, 5))
        );
        assert_eq!(
            a.intersection(&Bounds::new(10, 0, 5, 5)),
            Some(Bounds::new(10, 0, 0, 5))
        );
        assert_eq!(a.intersection(&Bounds::new(11, 0, 5, 5)), None);
    }

    #[test]
    fn expand_with_margin() {
        let b = Bounds::new(0, 0, 10, 10).expand(RootMargin::symmetric(2, 0));
        assert_eq!(b, Bounds::new(0, -2, 10, 14));
        let shrunk = Bounds::new(0, 0, 4, 4).expand(RootMargin::uniform(-3));
        assert_eq!(shrunk.area(), 0);
    }

    #[test]
    fn measure_ratio_and_buckets() {
        let root = Bounds::new(0, 0, 10, 10);
        let half = Some(Bounds::new(0, 5, 10, 10));
        let m = measure(root, half, &ObserverOptions::new());
        assert!(m.visible);
        assert_eq!(m.ratio, 0.5);

        let m = measure(root, half, &ObserverOptions::new().threshold(0.75));
        assert!(!m.visible);
        assert_eq!(m.bucket, 1);

        let m = measure(root, Some(Bounds::new(0, 20, 1, 1)), &ObserverOptions::new());
        assert!(!m.visible);
        assert_eq!(m.bucket, 0);

        let m = measure(root, None, &ObserverOptions::new());
        assert!(!m.visible);
    }

    #[test]
    fn lowest_threshold_decides_visibility() {
        let root = Bounds::new(0, 0, 10, 10);
        let half = Some(Bounds::new(0, 5, 10, 10));
        let options = ObserverOptions::new()
            .thresholds([0.75, 0.25])
            .normalized()
            .unwrap();
        let m = measure(root, half, &options);
        assert!(m.visible);
        assert_eq!(m.bucket, 2);
    }

    #[test]
    fn released_resources_are_pruned_without_dispatch() {
        let platform = screen();
        for _ in 0..100 {
            let (_, cb) = recorder();
            platform
                .create_resource(cb, &ObserverOptions::default())
                .release_all();
        }
        assert!(platform.state.borrow().resources.len() <= 1);
        assert_eq!(platform.live_resources(), 0);
    }

    #[test]
    fn zero_area_element_inside_is_visible() {
        let m = measure(
            Bounds::new(0, 0, 10, 10),
            Some(Bounds::new(3, 3, 0, 0)),
            &ObserverOptions::new().threshold(1.0),
        );
        assert!(m.visible);
        assert_eq!(m.ratio, 1.0);
    }

    #[test]
    fn initial_dispatch_reports_every_watched_element() {
        let platform = screen();
        platform.set_bounds(1, Bounds::new(0, 0, 1, 1));
        platform.set_bounds(2, Bounds::new(0, 50, 1, 1));
        let (log, cb) = recorder();
        let res = platform.create_resource(cb, &ObserverOptions::default());
        res.watch(&1);
        res.watch(&2);
        res.watch(&1);

        assert_eq!(platform.dispatch(), 1);
        assert_eq!(*log.borrow(), vec![(1, true), (2, false)]);

        // Nothing moved: nothing delivered.
        assert_eq!(platform.dispatch(), 0);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn nothing_happens_without_dispatch() {
        let platform = screen();
        platform.set_bounds(1, Bounds::new(0, 0, 1, 1));
        let (log, cb) = recorder();
        let res = platform.create_resource(cb, &ObserverOptions::default());
        res.watch(&1);
        platform.scroll_by(0, 100);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn scrolling_reports_transitions() {
        let platform = screen();
        platform.set_bounds(1, Bounds::new(0, 15, 1, 1));
        let (log, cb) = recorder();
        let res = platform.create_resource(cb, &ObserverOptions::default());
        res.watch(&1);
        platform.dispatch();

        platform.scroll_by(0, 10);
        platform.dispatch();
        platform.scroll_by(0, -10);
        platform.dispatch();

        assert_eq!(*log.borrow(), vec![(1, false), (1, true), (1, false)]);
    }

    #[test]
    fn root_margin_preloads_nearby_elements() {
        let platform = screen();
        platform.set_bounds(1, Bounds::new(0, 12, 1, 1));
        let (log, cb) = recorder();
        let options = ObserverOptions::new().root_margin(RootMargin::symmetric(5, 0));
        let res = platform.create_resource(cb, &options);
        res.watch(&1);
        platform.dispatch();
        assert_eq!(*log.borrow(), vec![(1, true)]);
    }

    #[test]
    fn threshold_changes_within_visibility_are_reported() {
        let platform = screen();
        platform.set_bounds(1, Bounds::new(0, 8, 10, 4));
        let (log, cb) = recorder();
        let options = ObserverOptions::new().thresholds([0.0, 1.0]);
        let res = platform.create_resource(cb, &options);
        res.watch(&1);
        platform.dispatch();

        platform.scroll_by(0, 2);
        platform.dispatch();

        assert_eq!(*log.borrow(), vec![(1, true), (1, true)]);
    }

    #[test]
    fn unwatched_element_receives_nothing() {
        let platform = screen();
        platform.set_bounds(1, Bounds::new(0, 0, 1, 1));
        let (log, cb) = recorder();
        let res = platform.create_resource(cb, &ObserverOptions::default());
        res.watch(&1);
        res.unwatch(&1);
        assert_eq!(platform.dispatch(), 0);
        assert!(log.borrow().is_empty());
        assert_eq!(res.watched_count(), 0);
    }

    #[test]
    fn released_resource_receives_nothing() {
        let platform = screen();
        platform.set_bounds(1, Bounds::new(0, 0, 1, 1));
        let (log, cb) = recorder();
        let res = platform.create_resource(cb, &ObserverOptions::default());
        res.watch(&1);
        res.release_all();
        res.watch(&1);

        assert_eq!(platform.dispatch(), 0);
        assert!(log.borrow().is_empty());
        assert_eq!(platform.live_resources(), 0);
    }

    #[test]
    fn removed_bounds_count_as_hidden() {
        let platform = screen();
        platform.set_bounds(1, Bounds::new(0, 0, 1, 1));
        let (log, cb) = recorder();
        let res = platform.create_resource(cb, &ObserverOptions::default());
        res.watch(&1);
        platform.dispatch();
        platform.remove_bounds(&1);
        platform.dispatch();
        assert_eq!(*log.borrow(), vec![(1, true), (1, false)]);
        assert_eq!(platform.bounds(&1), None);
    }

    #[test]
    fn invalid_options_fall_back_to_defaults() {
        let platform = screen();
        platform.set_bounds(1, Bounds::new(0, 0, 1, 1));
        let (log, cb) = recorder();
        let res = platform.create_resource(cb, &ObserverOptions::new().threshold(7.0));
        res.watch(&1);
        platform.dispatch();
        assert_eq!(*log.borrow(), vec![(1, true)]);
    }

    #[test]
    fn controller_trigger_once_over_scroll() {
        let platform = screen();
        platform.set_bounds(7, Bounds::new(0, 30, 10, 2));
        let mut ctrl = VisibilityController::new(platform.clone(), DetectionConfig::once());
        ctrl.attach(Some(7), DetectionConfig::once());

        platform.dispatch();
        assert!(!ctrl.is_visible());

        platform.scroll_by(0, 25);
        platform.dispatch();
        assert!(ctrl.is_visible());
        assert_eq!(ctrl.resource().map(ViewportResource::watched_count), Some(0));

        platform.scroll_by(0, -25);
        assert_eq!(platform.dispatch(), 0);
        assert!(ctrl.is_visible());
    }

    #[test]
    fn controller_swap_keeps_one_resource() {
        let platform = screen();
        let mut ctrl = VisibilityController::new(platform.clone(), DetectionConfig::default());
        ctrl.attach(Some(1), DetectionConfig::default());
        ctrl.attach(Some(2), DetectionConfig::default());
        assert_eq!(platform.live_resources(), 1);
        drop(ctrl);
        assert_eq!(platform.live_resources(), 0);
    }
}
