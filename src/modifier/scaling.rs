//! Scaling modifier: `clip(amplitude * (value + sign_tweak) + offset)`.

use crate::device::DeviceEvent;
use crate::signal::joystick_limit;

use super::{matches_any, ModifierCtx, ModifierKind, ModifierMeta};

pub struct ScalingModifier {
    pub amplitude: f64,
    pub offset: f64,
}

impl Default for ScalingModifier {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            offset: 0.0,
        }
    }
}

impl ModifierKind for ScalingModifier {
    fn tweak(&mut self, meta: ModifierMeta, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        if !matches_any(ctx.signals, meta.applies_to, &event) {
            return Some(event);
        }
        let sign_tweak = if self.amplitude < 0.0 { 1.0 } else { 0.0 };
        let scaled = self.amplitude * (event.value as f64 + sign_tweak) + self.offset;
        Some(DeviceEvent {
            value: joystick_limit(scaled as i32),
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
    use crate::signal::{ControllerSignal, SignalTable, JOYSTICK_MAX};

    struct NullInjector;
    impl Injector for NullInjector {
        fn fake_pipelined_event(&mut self, _event: DeviceEvent, _source: &str) {}
    }
    struct NullSink;
    impl DeviceSink for NullSink {
        fn apply_event(&mut self, _event: DeviceEvent) {}
    }

    #[test]
    fn doubles_and_clips() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let mut sink = NullSink;
        let mut injector = NullInjector;
        let mut m = Modifier::new(
            "turbo",
            "double sensitivity",
            Box::new(ScalingModifier { amplitude: 2.0, offset: 0.0 }),
        );
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
        let out = m._tweak(&mut ctx, DeviceEvent::new(0, 30000, TYPE_AXIS, 0)).unwrap();
        assert_eq!(out.value, JOYSTICK_MAX);
    }
}
