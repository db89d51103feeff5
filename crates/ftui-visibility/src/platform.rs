#![forbid(unsafe_code)]

//! Platform seam: the visibility-detection capability the controller drives.
//!
//! A platform creates [`DetectionResource`]s. Each resource owns one callback
//! and reports visibility changes for the elements it watches by invoking that
//! callback with a batch of [`VisibilityEntry`] records plus a handle back to
//! itself, so the callback can `unwatch` without holding its own resource.
//!
//! # Contract
//!
//! - Callbacks are delivered on the host's single UI thread, in the order the
//!   platform produces them, never from inside `create_resource`.
//! - After `unwatch(el)` the resource delivers nothing further for `el`.
//! - After `release_all()` the resource delivers nothing at all.
//! - `is_available()` is consulted at call time; a platform may lose or gain
//!   the capability between calls.

use crate::config::ObserverOptions;

/// One visibility-change record.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityEntry<E> {
    /// The element the record is about.
    pub target: E,
    /// Whether the element is now considered visible.
    pub is_visible: bool,
    /// Fraction of the element inside the viewing region, `0.0..=1.0`.
    pub intersection_ratio: f64,
}

impl<E> VisibilityEntry<E> {
    /// A record with ratio `1.0` when visible and `0.0` otherwise.
    #[must_use]
    pub fn new(target: E, is_visible: bool) -> Self {
        Self {
            target,
            is_visible,
            intersection_ratio: if is_visible { 1.0 } else { 0.0 },
        }
    }

    /// Shorthand for a visible record.
    #[must_use]
    pub fn visible(target: E) -> Self {
        Self::new(target, true)
    }

    /// Shorthand for a hidden record.
    #[must_use]
    pub fn hidden(target: E) -> Self {
        Self::new(target, false)
    }

    /// Override the intersection ratio.
    #[must_use]
    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.intersection_ratio = ratio;
        self
    }
}

/// A live subscription to visibility changes.
///
/// Methods take `&self`: resources are handed to their own callback while
/// delivery is in progress, so implementations use interior mutability.
pub trait DetectionResource<E> {
    /// Begin reporting changes for `element`.
    fn watch(&self, element: &E);

    /// Stop reporting changes for `element` only. The resource stays valid.
    fn unwatch(&self, element: &E);

    /// Stop reporting for every element and detach the callback.
    fn release_all(&self);
}

/// Callback a resource invokes with each batch of records.
pub type DetectionCallback<E> = Box<dyn FnMut(&[VisibilityEntry<E>], &dyn DetectionResource<E>)>;

/// An environment that may or may not provide visibility detection.
pub trait VisibilityPlatform<E> {
    /// Resource type this platform creates.
    type Resource: DetectionResource<E>;

    /// Whether the capability exists right now.
    fn is_available(&self) -> bool;

    /// Create a resource that reports through `callback`.
    ///
    /// Only called after `is_available()` returned `true`.
    fn create_resource(
        &self,
        callback: DetectionCallback<E>,
        options: &ObserverOptions,
    ) -> Self::Resource;
}

/// A platform without visibility detection.
///
/// Controllers built on it report visible immediately and never create a
/// resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

/// Resource type of [`Unsupported`]; it cannot be constructed.
#[derive(Debug)]
pub enum NoResource {}

impl<E> DetectionResource<E> for NoResource {
    fn watch(&self, _element: &E) {
        match *self {}
    }

    fn unwatch(&self, _element: &E) {
        match *self {}
    }

    fn release_all(&self) {
        match *self {}
    }
}

impl<E> VisibilityPlatform<E> for Unsupported {
    type Resource = NoResource;

    fn is_available(&self) -> bool {
        false
    }

    fn create_resource(
        &self,
        _callback: DetectionCallback<E>,
        _options: &ObserverOptions,
    ) -> NoResource {
        unreachable!("create_resource called on a platform without visibility detection")
    }
}

impl<E, P: VisibilityPlatform<E>> VisibilityPlatform<E> for &P {
    type Resource = P::Resource;

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn create_resource(
        &self,
        callback: DetectionCallback<E>,
        options: &ObserverOptions,
    ) -> Self::Resource {
        (**self).create_resource(callback, options)
    }
}

impl<E, P: VisibilityPlatform<E>> VisibilityPlatform<E> for std::rc::Rc<P> {
    type Resource = P::Resource;

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn create_resource(
        &self,
        callback: DetectionCallback<E>,
        options: &ObserverOptions,
    ) -> Self::Resource {
        (**self).create_resource(callback, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_shorthands() {
        let v = VisibilityEntry::visible(7u32);
        assert!(v.is_visible);
        assert_eq!(v.intersection_ratio, 1.0);

        let h = VisibilityEntry::hidden(7u32);
        assert!(!h.is_visible);
        assert_eq!(h.intersection_ratio, 0.0);

        let r = VisibilityEntry::visible(1u8).with_ratio(0.25);
        assert_eq!(r.intersection_ratio, 0.25);
    }

    #[test]
    fn unsupported_is_unavailable() {
        assert!(!VisibilityPlatform::<u32>::is_available(&Unsupported));
    }

    #[test]
    fn references_forward_availability() {
        let platform = Unsupported;
        let by_ref = &platform;
        assert!(!VisibilityPlatform::<u32>::is_available(&by_ref));
        let shared = std::rc::Rc::new(Unsupported);
        assert!(!VisibilityPlatform::<u32>::is_available(&shared));
    }
}
