//! Remap Table (C2) — per-input current remap record, cascading
//! install/clear, and `DeviceEvent` translation.

use std::cell::Cell;
use std::collections::HashMap;

use crate::device::{DeviceEvent, TYPE_AXIS, TYPE_BUTTON};
use crate::signal::{joystick_limit, ControllerSignal, SignalClass, SignalTable, JOYSTICK_MAX, JOYSTICK_MIN};
use crate::touchpad::TouchpadTracker;

/// Which side of an axis→button/hybrid split last fired, so the opposite
/// side's release can be synthesized when the axis crosses back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisSide {
    None,
    Positive,
    Negative,
}

/// Per-input current remap. Initial state is identity: `to == self`.
#[derive(Debug, Clone)]
pub struct RemapRecord {
    pub to: ControllerSignal,
    pub to_negative: Option<ControllerSignal>,
    pub to_min: bool,
    pub invert: bool,
    /// 0..JOYSTICK_MAX
    pub threshold: i32,
    /// nonzero
    pub scale: f64,
    /// Axes to zero on the `TOUCHPAD_ACTIVE` rising edge, preventing stuck
    /// axes.
    pub disable_signals: Vec<ControllerSignal>,
    last_axis_side: Cell<AxisSide>,
}

impl RemapRecord {
    pub fn identity(signal: ControllerSignal) -> Self {
        Self {
            to: signal,
            to_negative: None,
            to_min: false,
            invert: false,
            threshold: 0,
            scale: 1.0,
            disable_signals: Vec::new(),
            last_axis_side: Cell::new(AxisSide::None),
        }
    }
}

pub struct RemapTable {
    signals: std::sync::Arc<SignalTable>,
    table: HashMap<ControllerSignal, RemapRecord>,
    touchpad_active_prior: HashMap<ControllerSignal, bool>,
}

pub struct Translated {
    pub primary: Option<DeviceEvent>,
    pub synthetic: Vec<DeviceEvent>,
}

impl Translated {
    fn drop_only() -> Self {
        Self {
            primary: None,
            synthetic: Vec::new(),
        }
    }

    fn pass(event: DeviceEvent) -> Self {
        Self {
            primary: Some(event),
            synthetic: Vec::new(),
        }
    }
}

impl RemapTable {
    pub fn new(signals: std::sync::Arc<SignalTable>) -> Self {
        Self {
            signals,
            table: HashMap::new(),
            touchpad_active_prior: HashMap::new(),
        }
    }

    /// Install a batch of `(from, record)` pairs, cascading each against the
    /// currently-installed table.
    ///
    /// For chain `A -> B` then `B -> C`: any existing record whose `to == B`
    /// is rewritten to point at `C` before `B -> C` itself is installed, so
    /// a lookup on `A` always resolves straight to the latest final target.
    pub fn install_cascading(&mut self, batch: Vec<(ControllerSignal, RemapRecord)>) {
        for (from, record) in batch {
            let new_to = record.to;
            for (_, existing) in self.table.iter_mut() {
                if existing.to == from {
                    existing.to = new_to;
                }
            }
            self.table.insert(from, record);
        }
    }

    /// Reset every entry to identity. The engine is responsible for asking
    /// still-active remap modifiers to reinstall afterward.
    pub fn clear_all(&mut self) {
        self.table.clear();
        self.touchpad_active_prior.clear();
    }

    /// Produce the post-remap form of `event`, or a drop (`primary: None`)
    /// plus any synthetic events that must also be injected.
    pub fn translate(&mut self, event: DeviceEvent, touchpad: &mut TouchpadTracker, now: u32) -> Translated {
        let Some(from_input) = self.signals.get_by_event(&event) else {
            return Translated::pass(event);
        };

        // TOUCHPAD_ACTIVE handling is intrinsic to the signal, independent
        // of whether a remap is installed for it.
        if matches!(
            from_input.signal,
            ControllerSignal::TOUCHPAD_ACTIVE | ControllerSignal::TOUCHPAD_ACTIVE_2
        ) {
            return self.handle_touchpad_active(from_input.signal, event, touchpad);
        }

        // Look up the live record by reference (not a clone) so that
        // `last_axis_side`'s Cell-based history survives across events.
        let record = match self.table.get(&from_input.signal) {
            Some(r) => r,
            None => return Translated::pass(event),
        };

        if record.to == ControllerSignal::NOTHING {
            tracing::trace!(signal = ?from_input.signal, "remap translate: dropped (NOTHING)");
            return Translated::drop_only();
        }

        let to_input = self.signals.get_by_signal(record.to);
        let invert = record.invert;

        if from_input.signal == record.to {
            // identity: pass the raw event through unchanged (still honors
            // `invert` if explicitly configured as identity+invert).
            let mut value = event.value;
            if invert && matches!(from_input.class, SignalClass::Axis) {
                value = joystick_limit(-(value as i32));
            }
            return Translated::pass(DeviceEvent::new(event.time, value, event.event_type, event.id));
        }

        let mut synthetic = Vec::new();
        let primary = self.translate_cross_class(&from_input, &to_input, event, record, touchpad, now, &mut synthetic);

        let primary = primary.map(|mut ev| {
            if invert && matches!(to_input.class, SignalClass::Axis) {
                ev.value = joystick_limit(-(ev.value as i32));
            }
            ev
        });

        Translated { primary, synthetic }
    }

    #[allow(clippy::too_many_arguments)]
    fn translate_cross_class(
        &self,
        from_input: &crate::signal::ControllerInput,
        to_input: &crate::signal::ControllerInput,
        event: DeviceEvent,
        record: &RemapRecord,
        touchpad: &mut TouchpadTracker,
        now: u32,
        synthetic: &mut Vec<DeviceEvent>,
    ) -> Option<DeviceEvent> {
        use SignalClass::*;
        let value = event.value;

        match (from_input.class, to_input.class) {
            (Button, Axis) | (Button, ThreeState) => {
                let out = if value == 0 {
                    0
                } else if matches!(to_input.class, Axis) {
                    if record.to_min { JOYSTICK_MIN } else { JOYSTICK_MAX }
                } else if record.to_min {
                    -1
                } else {
                    1
                };
                Some(event_on(to_input, event.time, out))
            }
            (Button, Hybrid) => {
                // button passes through on the button face; synthesize the
                // axis face.
                let axis_val = if value != 0 { JOYSTICK_MAX } else { JOYSTICK_MIN };
                synthetic.push(DeviceEvent::new(event.time, axis_val, TYPE_AXIS, to_input.hybrid_axis_id));
                Some(DeviceEvent::new(event.time, value, TYPE_BUTTON, to_input.button_id))
            }
            (Hybrid, Button) => {
                if event.event_type == TYPE_AXIS {
                    None
                } else {
                    Some(event_on(to_input, event.time, value))
                }
            }
            (Hybrid, ThreeState) => {
                let out = if value == 0 {
                    0
                } else if record.to_min {
                    -1
                } else {
                    1
                };
                Some(event_on(to_input, event.time, out))
            }
            (ThreeState, Axis) => {
                Some(event_on(to_input, event.time, joystick_limit(value as i32 * JOYSTICK_MAX as i32)))
            }
            (ThreeState, Button) | (ThreeState, Hybrid) => {
                let out = if value != 0 { 1 } else { 0 };
                Some(event_on(to_input, event.time, out))
            }
            (Axis, Button) | (Axis, Hybrid) => {
                self.axis_to_button(to_input, event, record, synthetic)
            }
            (Axis, ThreeState) => {
                let out = if value as i32 >= record.threshold {
                    1
                } else if (value as i32) <= -record.threshold {
                    -1
                } else {
                    0
                };
                Some(event_on(to_input, event.time, out))
            }
            (Accelerometer, Axis) => {
                debug_assert!(record.scale != 0.0, "accelerometer remap scale must be nonzero");
                let scaled = joystick_limit((-(value as f64) / record.scale) as i32);
                Some(event_on(to_input, event.time, scaled))
            }
            (Touchpad, Axis) => {
                let v = touchpad.to_axis(from_input.signal, value, now);
                Some(event_on(to_input, event.time, v))
            }
            // Same-class or otherwise identity-shaped destinations: pass
            // the raw value through onto the new input's wire slot.
            _ => Some(event_on(to_input, event.time, value)),
        }
    }

    fn axis_to_button(
        &self,
        to_input: &crate::signal::ControllerInput,
        event: DeviceEvent,
        record: &RemapRecord,
        synthetic: &mut Vec<DeviceEvent>,
    ) -> Option<DeviceEvent> {
        let value = event.value as i32;
        if let Some(neg_signal) = record.to_negative {
            let neg_input = self.signals.get_by_signal(neg_signal);
            let new_side = if value >= record.threshold {
                AxisSide::Positive
            } else if value <= -record.threshold {
                AxisSide::Negative
            } else {
                AxisSide::None
            };
            let prior = record.last_axis_side.get();
            record.last_axis_side.set(new_side);

            match new_side {
                AxisSide::Positive => {
                    if prior == AxisSide::Negative {
                        synthetic.push(event_on(&neg_input, event.time, 0));
                    }
                    Some(event_on(to_input, event.time, 1))
                }
                AxisSide::Negative => {
                    if prior == AxisSide::Positive {
                        synthetic.push(event_on(to_input, event.time, 0));
                    }
                    Some(event_on(&neg_input, event.time, 1))
                }
                AxisSide::None => {
                    match prior {
                        AxisSide::Positive => Some(event_on(to_input, event.time, 0)),
                        AxisSide::Negative => Some(event_on(&neg_input, event.time, 0)),
                        AxisSide::None => None,
                    }
                }
            }
        } else {
            let out = if value >= record.threshold { 1 } else { 0 };
            Some(event_on(to_input, event.time, out))
        }
    }

    fn handle_touchpad_active(
        &mut self,
        signal: ControllerSignal,
        event: DeviceEvent,
        touchpad: &mut TouchpadTracker,
    ) -> Translated {
        // The rising/falling convention here is inverted relative to a
        // plain-language reading: value 0 indicates touching. Encodes the
        // observed wire behavior, not the apparent intent of the names.
        let was_active = *self.touchpad_active_prior.get(&signal).unwrap_or(&false);
        let now_active = event.value == 0;

        if now_active && !was_active {
            // Falling edge in the wire sense: becomes active.
            touchpad.first_touch();
        }

        let mut synthetic = Vec::new();
        if !now_active && was_active {
            // Rising edge: emit synthetic zero events on every disabled
            // axis to prevent stuck axes.
            if let Some(record) = self.table.get(&signal) {
                for sig in &record.disable_signals {
                    let input = self.signals.get_by_signal(*sig);
                    synthetic.push(event_on(&input, event.time, 0));
                }
            }
        }

        self.touchpad_active_prior.insert(signal, now_active);

        Translated {
            primary: Some(event),
            synthetic,
        }
    }
}

fn event_on(input: &crate::signal::ControllerInput, time: u32, value: i16) -> DeviceEvent {
    match input.class {
        SignalClass::Hybrid => DeviceEvent::new(time, value, TYPE_BUTTON, input.button_id),
        SignalClass::Axis | SignalClass::Accelerometer | SignalClass::Gyroscope | SignalClass::Touchpad => {
            DeviceEvent::new(time, value, TYPE_AXIS, input.button_id)
        }
        SignalClass::ThreeState => DeviceEvent::new(time, value, TYPE_AXIS, input.button_id),
        SignalClass::Button | SignalClass::Dummy => DeviceEvent::new(time, value, TYPE_BUTTON, input.button_id),
    }
}
