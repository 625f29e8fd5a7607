//! Sequence Engine (C5) — composable ordered `(hold, release, delay)` event
//! lists, playable blocking or time-sliced.

use crate::device::{DeviceEvent, DeviceSink, TYPE_AXIS, TYPE_BUTTON};
use crate::signal::{ControllerSignal, SignalClass, SignalTable, JOYSTICK_MAX, JOYSTICK_MIN};

/// Default macro timings, overridable per sequence builder call.
pub const DEFAULT_PRESS_TIME_US: u32 = 60_000;
pub const DEFAULT_RELEASE_TIME_US: u32 = 40_000;

#[derive(Debug, Clone, Default)]
pub struct Sequence {
    events: Vec<DeviceEvent>,
    current_step: usize,
    wait_until: u64,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    /// `add_hold` then `add_release` using the default macro timings.
    pub fn add_press(&mut self, signals: &SignalTable, input: ControllerSignal, value: i16) {
        self.add_hold(signals, input, value, DEFAULT_PRESS_TIME_US);
        self.add_release(signals, input, DEFAULT_RELEASE_TIME_US);
    }

    pub fn add_hold(&mut self, signals: &SignalTable, input: ControllerSignal, value: i16, hold_us: u32) {
        let ci = signals.get_by_signal(input);
        if matches!(ci.class, SignalClass::Hybrid) {
            let axis_value = if value == 0 { JOYSTICK_MAX } else { value };
            self.events.push(DeviceEvent::new(0, value, TYPE_BUTTON, ci.button_id));
            self.events
                .push(DeviceEvent::new(hold_us, axis_value, TYPE_AXIS, ci.hybrid_axis_id));
        } else {
            let event_type = wire_type(ci.class);
            self.events.push(DeviceEvent::new(hold_us, value, event_type, ci.button_id));
        }
    }

    pub fn add_release(&mut self, signals: &SignalTable, input: ControllerSignal, release_us: u32) {
        let ci = signals.get_by_signal(input);
        if matches!(ci.class, SignalClass::Hybrid) {
            self.events.push(DeviceEvent::new(0, 0, TYPE_BUTTON, ci.button_id));
            self.events
                .push(DeviceEvent::new(release_us, JOYSTICK_MIN, TYPE_AXIS, ci.hybrid_axis_id));
        } else {
            let event_type = wire_type(ci.class);
            self.events.push(DeviceEvent::new(release_us, 0, event_type, ci.button_id));
        }
    }

    pub fn add_delay(&mut self, us: u32) {
        self.events.push(DeviceEvent::delay(us));
    }

    pub fn add_sequence(&mut self, other: &Sequence) {
        self.events.extend_from_slice(&other.events);
    }

    /// Blocking playback: apply each event to `sink`, sleeping `time`
    /// microseconds after each (delay sentinels sleep without applying).
    pub fn send(&self, sink: &mut dyn DeviceSink) {
        for ev in &self.events {
            if !ev.is_delay_sentinel() {
                sink.apply_event(*ev);
            }
            if ev.time > 0 {
                spin_sleep::sleep(std::time::Duration::from_micros(ev.time as u64));
            }
        }
    }

    /// Time-sliced playback: advance as far as `elapsed_us` (measured from
    /// when this cycle's playback began) permits. Returns `true` once the
    /// whole sequence has played and resets internal state for the next
    /// cycle.
    pub fn send_parallel(&mut self, elapsed_us: u64, sink: &mut dyn DeviceSink) -> bool {
        while self.current_step < self.events.len() {
            let ev = self.events[self.current_step];
            if ev.is_delay_sentinel() {
                self.wait_until += ev.time as u64;
                self.current_step += 1;
                continue;
            }
            if elapsed_us < self.wait_until {
                return false;
            }
            sink.apply_event(ev);
            self.wait_until += ev.time as u64;
            self.current_step += 1;
        }
        if elapsed_us < self.wait_until {
            return false;
        }
        self.current_step = 0;
        self.wait_until = 0;
        true
    }
}

fn wire_type(class: SignalClass) -> u8 {
    match class {
        SignalClass::Button | SignalClass::Hybrid | SignalClass::Dummy => TYPE_BUTTON,
        _ => TYPE_AXIS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingSink {
        applied: RefCell<Vec<DeviceEvent>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                applied: RefCell::new(Vec::new()),
            }
        }
    }

    impl DeviceSink for RecordingSink {
        fn apply_event(&mut self, event: DeviceEvent) {
            self.applied.borrow_mut().push(event);
        }
    }

    #[test]
    fn delay_sentinel_never_applied() {
        let signals = SignalTable::new();
        let mut seq = Sequence::new();
        seq.add_press(&signals, ControllerSignal::X, 1);
        seq.add_delay(500_000);

        let mut sink = RecordingSink::new();
        let mut elapsed = 0u64;
        loop {
            if seq.send_parallel(elapsed, &mut sink) {
                break;
            }
            elapsed += 1000;
        }
        assert!(sink
            .applied
            .borrow()
            .iter()
            .all(|e| !e.is_delay_sentinel()));
    }

    #[test]
    fn send_parallel_paces_with_elapsed_time() {
        let signals = SignalTable::new();
        let mut seq = Sequence::new();
        seq.add_hold(&signals, ControllerSignal::X, 1, 100_000);
        seq.add_release(&signals, ControllerSignal::X, 50_000);

        let mut sink = RecordingSink::new();
        assert!(!seq.send_parallel(0, &mut sink));
        assert_eq!(sink.applied.borrow().len(), 1);
        assert!(!seq.send_parallel(50_000, &mut sink));
        assert_eq!(sink.applied.borrow().len(), 1);
        assert!(!seq.send_parallel(100_000, &mut sink));
        assert_eq!(sink.applied.borrow().len(), 2);
        assert!(seq.send_parallel(150_000, &mut sink));
    }

    #[test]
    fn hybrid_press_emits_button_and_axis_events() {
        let signals = SignalTable::new();
        let mut seq = Sequence::new();
        seq.add_hold(&signals, ControllerSignal::L2, 1, 10_000);
        assert_eq!(seq.events().len(), 2);
        assert_eq!(seq.events()[0].event_type, TYPE_BUTTON);
        assert_eq!(seq.events()[1].event_type, TYPE_AXIS);
        assert_eq!(seq.events()[1].value, JOYSTICK_MAX);
    }
}
