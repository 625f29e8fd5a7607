//! Invert modifier: `value = -(value + 1)` for matched events.
//!
//! Asymmetric around zero by design, matching the source's
//! `InvertModifier` rather than a pure sign flip; preserved as a known
//! deviation rather than "fixed".

use crate::device::DeviceEvent;

use super::{matches_any, ModifierCtx, ModifierKind, ModifierMeta};

#[derive(Default)]
pub struct InvertModifier;

impl ModifierKind for InvertModifier {
    fn tweak(&mut self, meta: ModifierMeta, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        if !matches_any(ctx.signals, meta.applies_to, &event) {
            return Some(event);
        }
        Some(DeviceEvent {
            value: -(event.value as i32 + 1) as i16,
            ..event
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ControllerState, GameCommand};
    use crate::device::{DeviceSink, TYPE_AXIS};
    use crate::modifier::{Injector, Modifier};
    use crate::signal::{ControllerSignal, SignalTable};

    struct NullInjector;
    impl Injector for NullInjector {
        fn fake_pipelined_event(&mut self, _event: DeviceEvent, _source: &str) {}
    }
    struct NullSink;
    impl DeviceSink for NullSink {
        fn apply_event(&mut self, _event: DeviceEvent) {}
    }

    #[test]
    fn inverts_around_minus_one() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let mut sink = NullSink;
        let mut injector = NullInjector;
        let mut m = Modifier::new("invert-x", "invert x axis", Box::new(InvertModifier));
        m.applies_to.push(GameCommand::new("x", ControllerSignal::LX));
        let mut remap_table = crate::remap::RemapTable::new(std::sync::Arc::new(SignalTable::new()));
        let mut touchpad = crate::touchpad::TouchpadTracker::new();
        let mut ctx = ModifierCtx {
            signals: &signals,
            state: &state,
            sink: &mut sink,
            injector: &mut injector,
            remap_table: &mut remap_table,
            touchpad: &mut touchpad,
        };
        assert_eq!(m._tweak(&mut ctx, DeviceEvent::new(0, 0, TYPE_AXIS, 0)).unwrap().value, -1);
        assert_eq!(m._tweak(&mut ctx, DeviceEvent::new(0, -1, TYPE_AXIS, 0)).unwrap().value, 0);
        assert_eq!(m._tweak(&mut ctx, DeviceEvent::new(0, 100, TYPE_AXIS, 0)).unwrap().value, -101);
    }
}
