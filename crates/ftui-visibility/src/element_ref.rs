#![forbid(unsafe_code)]

//! Callback-style element registration.
//!
//! Component frameworks usually learn about an element through a ref callback:
//! invoked with the element on mount and with nothing on unmount. An
//! [`ElementRef`] is that callback for a [`SharedController`]. It holds the
//! controller weakly, so a ref kept alive by the framework after the component
//! is gone becomes a no-op instead of keeping the detection resource around.
//!
//! State subscribers are notified only after the ref has released its borrow
//! of the controller, so a subscriber may read the controller (a re-render)
//! or re-attach it.

use std::rc::Rc;

use tracing::trace;

use crate::controller::SharedController;
use crate::platform::VisibilityPlatform;

/// Cloneable ref callback that attaches/detaches elements on a shared
/// controller using its stored configuration.
pub struct ElementRef<E> {
    forward: Rc<dyn Fn(Option<E>)>,
}

impl<E> Clone for ElementRef<E> {
    fn clone(&self) -> Self {
        Self {
            forward: Rc::clone(&self.forward),
        }
    }
}

impl<E> std::fmt::Debug for ElementRef<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRef").finish_non_exhaustive()
    }
}

impl<E: Clone + PartialEq + 'static> ElementRef<E> {
    /// Create a ref callback for `controller`.
    #[must_use]
    pub fn new<P>(controller: &SharedController<E, P>) -> Self
    where
        P: VisibilityPlatform<E> + 'static,
    {
        let weak = Rc::downgrade(controller);
        Self {
            forward: Rc::new(move |element| {
                let Some(controller) = weak.upgrade() else {
                    trace!("element ref outlived its controller");
                    return;
                };
                let (state, pending) = {
                    let mut ctrl = controller.borrow_mut();
                    let pending = ctrl.stage_element(element);
                    (ctrl.state().clone(), pending)
                };
                // Subscribers may borrow the controller again.
                if let Some(visible) = pending {
                    state.notify(visible);
                }
            }),
        }
    }

    /// Report the element (`Some`) or its removal (`None`).
    pub fn set(&self, element: Option<E>) {
        (self.forward)(element);
    }

    /// The ref as a plain closure, for frameworks that take `Fn(Option<E>)`.
    #[must_use]
    pub fn as_callback(&self) -> impl Fn(Option<E>) + 'static {
        let forward = Rc::clone(&self.forward);
        move |element| forward(element)
    }
}

/// Create an [`ElementRef`] for `controller`.
#[must_use]
pub fn element_ref<E, P>(controller: &SharedController<E, P>) -> ElementRef<E>
where
    E: Clone + PartialEq + 'static,
    P: VisibilityPlatform<E> + 'static,
{
    ElementRef::new(controller)
}
