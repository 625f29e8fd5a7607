//! Command & Condition Tables (C4).

use std::collections::HashMap;

use crate::device::DeviceEvent;
use crate::signal::{ControllerSignal, SignalClass, SignalTable};

/// Named pair `(name, ControllerInput)`, immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameCommand {
    pub name: String,
    pub input: ControllerSignal,
}

impl GameCommand {
    pub fn new(name: &str, input: ControllerSignal) -> Self {
        Self {
            name: name.to_string(),
            input,
        }
    }
}

/// Tracks the most recently observed value for every `(type,id)` wire slot,
/// giving transient conditions something to poll live.
#[derive(Debug, Default)]
pub struct ControllerState {
    values: HashMap<u16, i16>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, event: &DeviceEvent) {
        self.values.insert(event.index(), event.value);
    }

    /// For a `Hybrid` input (e.g. L2/R2), the digital press and the analog
    /// pull arrive on separate wire slots; this reads whichever face last
    /// reported the larger magnitude, so both a digital "is it pressed"
    /// condition and an analog "how far is it pulled" condition see a live
    /// value.
    pub fn get(&self, signals: &SignalTable, signal: ControllerSignal) -> i16 {
        let input = signals.get_by_signal(signal);
        let button = self.values.get(&input.button_index()).copied().unwrap_or(0);
        if !matches!(input.class, SignalClass::Hybrid) {
            return button;
        }
        let axis = self.values.get(&input.hybrid_index()).copied().unwrap_or(0);
        if (axis as i32).abs() >= (button as i32).abs() {
            axis
        } else {
            button
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdType {
    /// `|x| >= threshold`
    Above,
    /// `|x| < threshold`
    Below,
    /// `x >= threshold` (signed)
    Greater,
    /// `x < threshold` (signed)
    Less,
    /// `sqrt(x^2+y^2) >= threshold`, requires exactly 2 inputs
    Distance,
    /// `sqrt(x^2+y^2) < threshold`, requires exactly 2 inputs
    DistanceBelow,
}

impl ThresholdType {
    pub fn is_distance(&self) -> bool {
        matches!(self, ThresholdType::Distance | ThresholdType::DistanceBelow)
    }
}

fn test_single(value: i16, threshold: i16, kind: ThresholdType) -> bool {
    match kind {
        ThresholdType::Above => (value as i32).abs() >= threshold as i32,
        ThresholdType::Below => (value as i32).abs() < threshold as i32,
        ThresholdType::Greater => value >= threshold,
        ThresholdType::Less => value < threshold,
        ThresholdType::Distance | ThresholdType::DistanceBelow => {
            unreachable!("distance thresholds are evaluated across the whole list, not per-input")
        }
    }
}

fn test_list(
    commands: &[GameCommand],
    threshold: i16,
    kind: ThresholdType,
    signals: &SignalTable,
    state: &ControllerState,
) -> bool {
    if kind.is_distance() {
        assert_eq!(commands.len(), 2, "Distance threshold requires exactly 2 inputs");
        let x = state.get(signals, commands[0].input) as f64;
        let y = state.get(signals, commands[1].input) as f64;
        let dist = (x * x + y * y).sqrt();
        return match kind {
            ThresholdType::Distance => dist >= threshold as f64,
            ThresholdType::DistanceBelow => dist < threshold as f64,
            _ => unreachable!(),
        };
    }
    commands
        .iter()
        .all(|c| test_single(state.get(signals, c.input), threshold, kind))
}

/// A boolean predicate over game-commands' current values.
///
/// Each modifier holds its own copy so that persistent state stays private
/// to the modifier that owns it.
#[derive(Debug, Clone)]
pub struct GameCondition {
    pub name: String,
    pub while_list: Vec<GameCommand>,
    pub clear_on_list: Vec<GameCommand>,
    pub threshold: i16,
    pub threshold_type: ThresholdType,
    pub clear_threshold: i16,
    pub clear_threshold_type: ThresholdType,
    persistent_state: bool,
}

impl GameCondition {
    pub fn new(
        name: &str,
        while_list: Vec<GameCommand>,
        clear_on_list: Vec<GameCommand>,
        threshold: i16,
        threshold_type: ThresholdType,
        clear_threshold: i16,
        clear_threshold_type: ThresholdType,
    ) -> Self {
        assert!(!while_list.is_empty(), "while_list must be nonempty");
        Self {
            name: name.to_string(),
            while_list,
            clear_on_list,
            threshold,
            threshold_type,
            clear_threshold,
            clear_threshold_type,
            persistent_state: false,
        }
    }

    pub fn is_persistent(&self) -> bool {
        !self.clear_on_list.is_empty()
    }

    /// `true` iff the condition currently holds.
    pub fn in_condition(&self, signals: &SignalTable, state: &ControllerState) -> bool {
        if self.is_persistent() {
            self.persistent_state
        } else {
            test_list(&self.while_list, self.threshold, self.threshold_type, signals, state)
        }
    }

    /// Called for every `DeviceEvent` processed by a modifier owning this
    /// condition. No-op for transient conditions.
    pub fn update_state(&mut self, signals: &SignalTable, state: &ControllerState) {
        if !self.is_persistent() {
            return;
        }
        if !self.persistent_state
            && test_list(&self.while_list, self.threshold, self.threshold_type, signals, state)
        {
            self.persistent_state = true;
        } else if self.persistent_state
            && test_list(
                &self.clear_on_list,
                self.clear_threshold,
                self.clear_threshold_type,
                signals,
                state,
            )
        {
            self.persistent_state = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{TYPE_AXIS, TYPE_BUTTON};

    fn ev(event_type: u8, id: u8, value: i16) -> DeviceEvent {
        DeviceEvent::new(0, value, event_type, id)
    }

    #[test]
    fn transient_condition_polls_live_state() {
        let signals = SignalTable::new();
        let mut state = ControllerState::new();
        let cond = GameCondition::new(
            "aiming",
            vec![GameCommand::new("aim", ControllerSignal::L2)],
            vec![],
            16000,
            ThresholdType::Above,
            0,
            ThresholdType::Above,
        );
        assert!(!cond.in_condition(&signals, &state));
        state.update(&ev(TYPE_AXIS, 2, 20000));
        assert!(cond.in_condition(&signals, &state));
    }

    #[test]
    fn persistent_condition_latches() {
        let signals = SignalTable::new();
        let mut state = ControllerState::new();
        let mut cond = GameCondition::new(
            "sprinting",
            vec![GameCommand::new("sprint", ControllerSignal::L3)],
            vec![GameCommand::new("stop", ControllerSignal::R3)],
            1,
            ThresholdType::Above,
            1,
            ThresholdType::Above,
        );

        assert!(!cond.in_condition(&signals, &state));

        state.update(&ev(TYPE_BUTTON, 11, 1));
        cond.update_state(&signals, &state);
        assert!(cond.in_condition(&signals, &state));

        // Pressing sprint again must not clear it (monotonicity).
        state.update(&ev(TYPE_BUTTON, 11, 1));
        cond.update_state(&signals, &state);
        assert!(cond.in_condition(&signals, &state));

        state.update(&ev(TYPE_BUTTON, 12, 1));
        cond.update_state(&signals, &state);
        assert!(!cond.in_condition(&signals, &state));
    }

    #[test]
    fn distance_requires_two_inputs() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let result = std::panic::catch_unwind(|| {
            test_list(
                &[GameCommand::new("x", ControllerSignal::LX)],
                1000,
                ThresholdType::Distance,
                &signals,
                &state,
            )
        });
        assert!(result.is_err());
    }
}
