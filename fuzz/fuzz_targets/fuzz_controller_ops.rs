#![no_main]

//! Drive a controller with arbitrary lifecycle operations and check that it
//! never holds more than one live resource and leaves none behind.

use arbitrary::Arbitrary;
use ftui_visibility::testing::ScriptedPlatform;
use ftui_visibility::{DetectionConfig, VisibilityController, VisibilityEntry};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Attach { element: Option<u8>, once: bool },
    Release,
    Deliver { visible: bool, records: u8 },
    Reconfigure { once: bool },
    SetAvailable(bool),
}

fuzz_target!(|ops: Vec<Op>| {
    let platform = ScriptedPlatform::new();
    {
        let mut ctrl = VisibilityController::new(platform.clone(), DetectionConfig::default());
        for op in ops.iter().take(256) {
            match *op {
                Op::Attach { element, once } => {
                    ctrl.attach(element, DetectionConfig::new().trigger_once(once));
                }
                Op::Release => ctrl.release(),
                Op::Deliver { visible, records } => {
                    if let (Some(el), Some(index)) =
                        (ctrl.element().copied(), platform.created_count().checked_sub(1))
                    {
                        let batch = (0..records % 4)
                            .map(|_| VisibilityEntry::new(el, visible))
                            .collect();
                        platform.deliver(index, batch);
                    }
                }
                Op::Reconfigure { once } => {
                    ctrl.reconfigure(DetectionConfig::new().trigger_once(once));
                }
                Op::SetAvailable(available) => platform.set_available(available),
            }
            assert!(platform.live_count() <= 1);
        }
    }
    assert_eq!(platform.live_count(), 0);
    assert!(platform.max_live() <= 1);
});
