#![forbid(unsafe_code)]

//! Owned slot for a single detection resource.
//!
//! [`ResourceSlot`] holds at most one resource and enforces the swap order the
//! controller depends on: the current occupant is released **before** the
//! factory for its replacement runs, so two live resources never coexist.
//!
//! # Invariants
//!
//! 1. At most one resource is held at any instant.
//! 2. `replace` releases the prior occupant before creating the new one.
//! 3. `release` on an empty slot is a no-op.
//! 4. Dropping the slot releases its occupant.

use std::marker::PhantomData;

use crate::platform::DetectionResource;

/// Exclusive owner of zero or one detection resource.
pub struct ResourceSlot<E, R: DetectionResource<E>> {
    occupant: Option<R>,
    releases: u64,
    _element: PhantomData<fn(&E)>,
}

impl<E, R: DetectionResource<E>> std::fmt::Debug for ResourceSlot<E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSlot")
            .field("occupied", &self.occupant.is_some())
            .field("releases", &self.releases)
            .finish()
    }
}

impl<E, R: DetectionResource<E>> Default for ResourceSlot<E, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, R: DetectionResource<E>> ResourceSlot<E, R> {
    /// An empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            occupant: None,
            releases: 0,
            _element: PhantomData,
        }
    }

    /// Release the current occupant, then store the resource built by `make`.
    ///
    /// Returns a reference to the new occupant.
    pub fn replace(&mut self, make: impl FnOnce() -> R) -> &R {
        self.release();
        self.occupant.insert(make())
    }

    /// Release the occupant if there is one. Returns `true` if something was
    /// released.
    pub fn release(&mut self) -> bool {
        match self.occupant.take() {
            Some(resource) => {
                resource.release_all();
                self.releases += 1;
                true
            }
            None => false,
        }
    }

    /// The live resource, if any.
    #[must_use]
    pub fn get(&self) -> Option<&R> {
        self.occupant.as_ref()
    }

    /// Whether a resource is held.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    /// Number of resources this slot has released so far.
    #[must_use]
    pub fn release_count(&self) -> u64 {
        self.releases
    }
}

impl<E, R: DetectionResource<E>> Drop for ResourceSlot<E, R> {
    fn drop(&mut self) {
        self.release();
    }
}
