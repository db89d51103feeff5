#![forbid(unsafe_code)]

//! Element visibility observation for FrankenTUI.
//!
//! This crate answers one question for a component: *is my element inside the
//! viewing region right now?* It manages the lifecycle of the underlying
//! detection resource so components never leak observers across
//! mount/update/unmount cycles.
//!
//! - [`VisibilityController`]: binds one element at a time to a detection
//!   resource and publishes a visibility flag.
//! - [`VisibilityState`]: the shared, version-tracked flag with RAII
//!   [`Subscription`]s.
//! - [`ElementRef`]: ref-callback registration for shared controllers.
//! - [`VisibilityPlatform`] / [`DetectionResource`]: the seam to whatever
//!   actually detects visibility.
//! - [`viewport::ViewportPlatform`]: layout-driven detection for hosts that
//!   know their own geometry.
//! - [`ResourceSlot`]: single-occupant resource holder with
//!   release-before-replace semantics.
//!
//! # Degraded Capability
//!
//! When the platform cannot detect visibility, controllers report visible
//! immediately so content gated on visibility is never hidden forever.
//!
//! # Example
//!
//! ```
//! use ftui_visibility::viewport::{Bounds, ViewportPlatform};
//! use ftui_visibility::{DetectionConfig, Unsupported, VisibilityController};
//!
//! // A scroll view 20 rows tall with an item laid out at row 30.
//! let platform = ViewportPlatform::new(Bounds::new(0, 0, 40, 20));
//! platform.set_bounds(7u32, Bounds::new(0, 30, 40, 3));
//!
//! let mut ctrl = VisibilityController::new(platform.clone(), DetectionConfig::default());
//! ctrl.attach(Some(7), DetectionConfig::default());
//! platform.dispatch();
//! assert!(!ctrl.is_visible());
//!
//! platform.scroll_by(0, 15);
//! platform.dispatch();
//! assert!(ctrl.is_visible());
//!
//! ctrl.attach(None, DetectionConfig::default());
//! assert_eq!(platform.live_resources(), 0);
//!
//! // Without detection support everything counts as visible.
//! let fallback: VisibilityController<u32, _> =
//!     VisibilityController::new(Unsupported, DetectionConfig::default());
//! assert!(fallback.is_visible());
//! ```

pub mod config;
pub mod controller;
pub mod element_ref;
pub mod platform;
pub mod slot;
pub mod state;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod viewport;

pub use config::{ConfigError, DetectionConfig, ObserverOptions, RootMargin};
pub use controller::{SharedController, VisibilityController};
pub use element_ref::{ElementRef, element_ref};
pub use platform::{
    DetectionCallback, DetectionResource, NoResource, Unsupported, VisibilityEntry,
    VisibilityPlatform,
};
pub use slot::ResourceSlot;
pub use state::{Subscription, VisibilityState};
