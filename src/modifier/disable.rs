//! Disable modifier: rewrite matched events to their signal's minimum.

use crate::device::DeviceEvent;
use crate::signal::{SignalClass, JOYSTICK_MIN};

use super::{matches_any, ModifierCtx, ModifierKind, ModifierMeta};

/// The filter condition gating whether a matched event is disabled this
/// time: always, or only once the matched input's own magnitude crosses a
/// threshold.
#[derive(Debug, Clone, Copy)]
pub enum DisableFilter {
    All,
    Above(i16),
    Below(i16),
}

pub struct DisableModifier {
    pub filter: DisableFilter,
}

impl DisableModifier {
    pub fn new(filter: DisableFilter) -> Self {
        Self { filter }
    }
}

impl ModifierKind for DisableModifier {
    fn tweak(&mut self, meta: ModifierMeta, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        if !matches_any(ctx.signals, meta.applies_to, &event) {
            return Some(event);
        }
        let passes = match self.filter {
            DisableFilter::All => true,
            DisableFilter::Above(t) => (event.value as i32).abs() >= t as i32,
            DisableFilter::Below(t) => (event.value as i32).abs() < t as i32,
        };
        if !passes {
            return Some(event);
        }
        tracing::trace!(modifier = meta.name, "disabling matched event");
        Some(DeviceEvent {
            value: minimum_for_event(ctx.signals, &event),
            ..event
        })
    }
}

fn minimum_for_event(signals: &crate::signal::SignalTable, event: &DeviceEvent) -> i16 {
    match signals.get_by_event(event) {
        None => 0,
        Some(input) => match input.class {
            SignalClass::Hybrid => {
                if event.index() == input.hybrid_index() {
                    JOYSTICK_MIN
                } else {
                    0
                }
            }
            _ => input.min_max().0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ControllerState, GameCommand};
    use crate::device::{TYPE_AXIS, TYPE_BUTTON};
    use crate::modifier::{Injector, Modifier};
    use crate::signal::{ControllerSignal, SignalTable};
    use crate::device::DeviceSink;

    struct NullInjector;
    impl Injector for NullInjector {
        fn fake_pipelined_event(&mut self, _event: DeviceEvent, _source: &str) {}
    }
    struct NullSink;
    impl DeviceSink for NullSink {
        fn apply_event(&mut self, _event: DeviceEvent) {}
    }

    #[test]
    fn disables_axis_to_minimum() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let mut sink = NullSink;
        let mut injector = NullInjector;
        let mut m = Modifier::new("no-aim", "disable aiming", Box::new(DisableModifier::new(DisableFilter::All)));
        m.applies_to.push(GameCommand::new("aim", ControllerSignal::RX));
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
        let out = m._tweak(&mut ctx, DeviceEvent::new(0, 20000, TYPE_AXIS, 3)).unwrap();
        assert_eq!(out.value, JOYSTICK_MIN);
    }

    #[test]
    fn disables_button_to_zero() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let mut sink = NullSink;
        let mut injector = NullInjector;
        let mut m = Modifier::new("no-jump", "disable jump", Box::new(DisableModifier::new(DisableFilter::All)));
        m.applies_to.push(GameCommand::new("jump", ControllerSignal::X));
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
        let out = m._tweak(&mut ctx, DeviceEvent::new(0, 1, TYPE_BUTTON, 0)).unwrap();
        assert_eq!(out.value, 0);
    }

    #[test]
    fn unmatched_events_pass_through() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let mut sink = NullSink;
        let mut injector = NullInjector;
        let mut m = Modifier::new("no-jump", "disable jump", Box::new(DisableModifier::new(DisableFilter::All)));
        m.applies_to.push(GameCommand::new("jump", ControllerSignal::X));
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
        let ev = DeviceEvent::new(0, 1, TYPE_BUTTON, 1);
        let out = m._tweak(&mut ctx, ev).unwrap();
        assert_eq!(out, ev);
    }
}
