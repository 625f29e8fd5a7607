//! Signal Table (C1) — canonical, read-only inventory of controller inputs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::device::{DeviceEvent, TYPE_AXIS, TYPE_BUTTON};

pub const JOYSTICK_MAX: i16 = 32767;
pub const JOYSTICK_MIN: i16 = -32767;

/// Closed enum over every input the DualShock-style controller reports,
/// plus the two dummy signals `NOTHING` (drop) and `NONE` (no remap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[allow(non_camel_case_types)]
pub enum ControllerSignal {
    X,
    CIRCLE,
    TRIANGLE,
    SQUARE,
    L1,
    R1,
    L2,
    R2,
    SHARE,
    OPTIONS,
    PS,
    L3,
    R3,
    TOUCHPAD,
    TOUCHPAD_ACTIVE,
    TOUCHPAD_ACTIVE_2,
    LX,
    LY,
    RX,
    RY,
    DX,
    DY,
    ACCX,
    ACCY,
    ACCZ,
    GYRX,
    GYRY,
    GYRZ,
    TOUCHPAD_X,
    TOUCHPAD_Y,
    TOUCHPAD_X_2,
    TOUCHPAD_Y_2,
    NOTHING,
    NONE,
}

/// Subdivides button/axis so translation rules can special-case categories

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SignalClass {
    Button,
    /// Tri-valued axis, range -1/0/1.
    ThreeState,
    Axis,
    /// Carries both a button and an axis face sharing one logical identity
    /// (L2/R2).
    Hybrid,
    Accelerometer,
    Gyroscope,
    Touchpad,
    /// `NOTHING` / `NONE` — never arrives from the controller.
    Dummy,
}

/// Identity of one physical input.
#[derive(Debug, Clone)]
pub struct ControllerInput {
    pub name: String,
    pub signal: ControllerSignal,
    pub class: SignalClass,
    pub button_id: u8,
    /// Only meaningful for `SignalClass::Hybrid`.
    pub hybrid_axis_id: u8,
}

impl ControllerInput {
    pub fn new(name: &str, signal: ControllerSignal, class: SignalClass, button_id: u8) -> Self {
        Self {
            name: name.to_string(),
            signal,
            class,
            button_id,
            hybrid_axis_id: 0,
        }
    }

    pub fn hybrid(name: &str, signal: ControllerSignal, button_id: u8, hybrid_axis_id: u8) -> Self {
        Self {
            name: name.to_string(),
            signal,
            class: SignalClass::Hybrid,
            button_id,
            hybrid_axis_id,
        }
    }

    /// The `(type,id)` index for the button/primary face. `ThreeState`
    /// inputs (DX/DY) live in the axis id space even though their class is
    /// three-valued (`AXIS_DX`/`AXIS_DY` in the DualShock mapping).
    pub fn button_index(&self) -> u16 {
        let t = match self.class {
            SignalClass::Button | SignalClass::Hybrid | SignalClass::Dummy => TYPE_BUTTON,
            _ => TYPE_AXIS,
        };
        (t as u16) << 8 | self.button_id as u16
    }

    /// The `(type,id)` index for the axis face of a hybrid input. Panics if
    /// called on a non-hybrid input — callers must check `class` first.
    pub fn hybrid_index(&self) -> u16 {
        debug_assert!(matches!(self.class, SignalClass::Hybrid));
        (TYPE_AXIS as u16) << 8 | self.hybrid_axis_id as u16
    }

    /// Minimum/maximum value rules.
    pub fn min_max(&self) -> (i16, i16) {
        match self.class {
            SignalClass::Button => (0, 1),
            SignalClass::ThreeState => (-1, 1),
            SignalClass::Dummy => (0, 0),
            SignalClass::Axis
            | SignalClass::Accelerometer
            | SignalClass::Gyroscope
            | SignalClass::Touchpad => (JOYSTICK_MIN, JOYSTICK_MAX),
            // Button face mirrors Button, axis face mirrors Axis; callers
            // asking for the hybrid's overall range get the axis range,
            // which is the superset.
            SignalClass::Hybrid => (JOYSTICK_MIN, JOYSTICK_MAX),
        }
    }

    pub fn button_min_max(&self) -> (i16, i16) {
        match self.class {
            SignalClass::Hybrid => (0, 1),
            _ => self.min_max(),
        }
    }
}

/// Saturate to the `±JOYSTICK_MAX` range.
pub fn joystick_limit(n: i32) -> i16 {
    if n >= JOYSTICK_MAX as i32 {
        JOYSTICK_MAX
    } else if n <= JOYSTICK_MIN as i32 {
        JOYSTICK_MIN
    } else {
        n as i16
    }
}

pub struct SignalTable {
    by_name: HashMap<String, Arc<ControllerInput>>,
    by_signal: HashMap<ControllerSignal, Arc<ControllerInput>>,
    by_index: HashMap<u16, Arc<ControllerInput>>,
}

impl SignalTable {
    /// Build the canonical DualShock-style inventory: button ids
    /// 0..15, axis ids 0..17, with L2 at (BUTTON 6, AXIS 2) and R2 at
    /// (BUTTON 7, AXIS 5).
    pub fn new() -> Self {
        use ControllerSignal::*;
        use SignalClass::*;

        let mut inputs = vec![
            ControllerInput::new("x", X, Button, 0),
            ControllerInput::new("circle", CIRCLE, Button, 1),
            ControllerInput::new("triangle", TRIANGLE, Button, 2),
            ControllerInput::new("square", SQUARE, Button, 3),
            ControllerInput::new("l1", L1, Button, 4),
            ControllerInput::new("r1", R1, Button, 5),
            ControllerInput::hybrid("l2", L2, 6, 2),
            ControllerInput::hybrid("r2", R2, 7, 5),
            ControllerInput::new("share", SHARE, Button, 8),
            ControllerInput::new("options", OPTIONS, Button, 9),
            ControllerInput::new("ps", PS, Button, 10),
            ControllerInput::new("l3", L3, Button, 11),
            ControllerInput::new("r3", R3, Button, 12),
            ControllerInput::new("touchpad", TOUCHPAD, Button, 13),
            ControllerInput::new("touchpad_active", TOUCHPAD_ACTIVE, Button, 14),
            ControllerInput::new("touchpad_active_2", TOUCHPAD_ACTIVE_2, Button, 15),
            ControllerInput::new("lx", LX, Axis, 0),
            ControllerInput::new("ly", LY, Axis, 1),
            ControllerInput::new("rx", RX, Axis, 3),
            ControllerInput::new("ry", RY, Axis, 4),
            ControllerInput::new("dx", DX, ThreeState, 6),
            ControllerInput::new("dy", DY, ThreeState, 7),
            ControllerInput::new("accx", ACCX, Accelerometer, 8),
            ControllerInput::new("accy", ACCY, Accelerometer, 9),
            ControllerInput::new("accz", ACCZ, Accelerometer, 10),
            ControllerInput::new("gyrx", GYRX, Gyroscope, 11),
            ControllerInput::new("gyry", GYRY, Gyroscope, 12),
            ControllerInput::new("gyrz", GYRZ, Gyroscope, 13),
            ControllerInput::new("touchpad_x", TOUCHPAD_X, Touchpad, 14),
            ControllerInput::new("touchpad_y", TOUCHPAD_Y, Touchpad, 15),
            ControllerInput::new("touchpad_x_2", TOUCHPAD_X_2, Touchpad, 16),
            ControllerInput::new("touchpad_y_2", TOUCHPAD_Y_2, Touchpad, 17),
            ControllerInput::new("nothing", NOTHING, Dummy, 0),
            ControllerInput::new("none", NONE, Dummy, 0),
        ];

        // dx/dy are three-state axes, but their index lives in the axis
        // table (ids 6/7), same as DX/DY in the original mapping.
        for i in inputs.iter_mut() {
            if matches!(i.signal, DX | DY) {
                i.class = ThreeState;
            }
        }

        let mut by_name = HashMap::new();
        let mut by_signal = HashMap::new();
        let mut by_index = HashMap::new();

        for input in inputs.drain(..) {
            let arc = Arc::new(input);
            by_name.insert(arc.name.clone(), arc.clone());
            by_signal.insert(arc.signal, arc.clone());
            by_index.insert(arc.button_index(), arc.clone());
            if matches!(arc.class, SignalClass::Hybrid) {
                by_index.insert(arc.hybrid_index(), arc.clone());
            }
        }

        Self {
            by_name,
            by_signal,
            by_index,
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<ControllerInput>> {
        self.by_name.get(name).cloned()
    }

    pub fn get_by_signal(&self, signal: ControllerSignal) -> Arc<ControllerInput> {
        self.by_signal
            .get(&signal)
            .cloned()
            .expect("every ControllerSignal variant is registered at construction")
    }

    pub fn get_by_event(&self, event: &DeviceEvent) -> Option<Arc<ControllerInput>> {
        self.by_index.get(&event.index()).cloned()
    }

    /// True iff `event`'s `(type,id)` matches either face of `signal`.
    pub fn matches(&self, event: &DeviceEvent, signal: ControllerSignal) -> bool {
        let input = self.get_by_signal(signal);
        event.index() == input.button_index()
            || (matches!(input.class, SignalClass::Hybrid) && event.index() == input.hybrid_index())
    }

    pub fn joystick_limit(&self, n: i32) -> i16 {
        joystick_limit(n)
    }
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joystick_limit_saturates() {
        assert_eq!(joystick_limit(1_000_000), JOYSTICK_MAX);
        assert_eq!(joystick_limit(-1_000_000), JOYSTICK_MIN);
        assert_eq!(joystick_limit(10), 10);
    }

    #[test]
    fn hybrid_has_two_indices() {
        let table = SignalTable::new();
        let l2 = table.get_by_signal(ControllerSignal::L2);
        assert_ne!(l2.button_index(), l2.hybrid_index());
        assert!(table.by_index.contains_key(&l2.button_index()));
        assert!(table.by_index.contains_key(&l2.hybrid_index()));
    }

    #[test]
    fn get_by_event_resolves_both_hybrid_faces() {
        let table = SignalTable::new();
        let button_ev = DeviceEvent::new(0, 1, TYPE_BUTTON, 6);
        let axis_ev = DeviceEvent::new(0, 100, TYPE_AXIS, 2);
        assert_eq!(
            table.get_by_event(&button_ev).unwrap().signal,
            ControllerSignal::L2
        );
        assert_eq!(
            table.get_by_event(&axis_ev).unwrap().signal,
            ControllerSignal::L2
        );
    }

    #[test]
    fn matches_checks_both_faces() {
        let table = SignalTable::new();
        let axis_ev = DeviceEvent::new(0, 100, TYPE_AXIS, 2);
        assert!(table.matches(&axis_ev, ControllerSignal::L2));
        assert!(!table.matches(&axis_ev, ControllerSignal::R2));
    }
}
