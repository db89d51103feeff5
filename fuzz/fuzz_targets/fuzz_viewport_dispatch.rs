#![no_main]

//! Feed arbitrary geometry and margins into the viewport platform and check
//! the records it delivers stay well-formed.

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use ftui_visibility::viewport::{Bounds, ViewportPlatform};
use ftui_visibility::{
    DetectionResource, ObserverOptions, RootMargin, VisibilityEntry, VisibilityPlatform,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    viewport: (i32, i32, i32, i32),
    margin: (i32, i32, i32, i32),
    thresholds: Vec<u8>,
    elements: Vec<(u8, i32, i32, i32, i32)>,
    scrolls: Vec<(i16, i16)>,
}

fuzz_target!(|input: Input| {
    let (x, y, w, h) = input.viewport;
    let platform = ViewportPlatform::new(Bounds::new(x, y, w, h));
    for &(id, x, y, w, h) in input.elements.iter().take(32) {
        platform.set_bounds(id, Bounds::new(x, y, w, h));
    }

    let (top, right, bottom, left) = input.margin;
    let options = ObserverOptions::new()
        .root_margin(RootMargin { top, right, bottom, left })
        .thresholds(input.thresholds.iter().take(8).map(|&t| f64::from(t) / 255.0));

    let seen: Rc<RefCell<Vec<VisibilityEntry<u8>>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let resource = platform.create_resource(
        Box::new(move |entries: &[VisibilityEntry<u8>], _: &dyn DetectionResource<u8>| {
            sink.borrow_mut().extend_from_slice(entries);
        }),
        &options,
    );
    for &(id, ..) in input.elements.iter().take(32) {
        resource.watch(&id);
    }

    platform.dispatch();
    for &(dx, dy) in input.scrolls.iter().take(32) {
        platform.scroll_by(i32::from(dx), i32::from(dy));
        platform.dispatch();
    }

    for entry in seen.borrow().iter() {
        assert!((0.0..=1.0).contains(&entry.intersection_ratio));
    }
    resource.release_all();
    assert_eq!(platform.live_resources(), 0);
});
