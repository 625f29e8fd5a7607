//! Event Pipeline (C8) — `sniffify`: the per-event gate between the raw
//! controller source and the active modifier stack, plus pause/resume
//! edge detection on the raw signal.

use crate::command::ControllerState;
use crate::device::{DeviceEvent, DeviceSink};
use crate::engine::Engine;
use crate::modifier::Injector;
use crate::signal::{ControllerSignal, SignalTable};

pub struct Pipeline {
    signals: std::sync::Arc<SignalTable>,
    prior_options: i16,
    prior_ps: i16,
    prior_share: i16,
}

impl Pipeline {
    pub fn new(signals: std::sync::Arc<SignalTable>) -> Self {
        Self {
            signals,
            prior_options: 0,
            prior_ps: 0,
            prior_share: 0,
        }
    }

    /// Entry point: one raw event in, at most one event out. Pause toggles
    /// are checked on the raw signal before any modifier sees the event,
    /// and never on a remapped one.
    pub fn sniffify(
        &mut self,
        event: DeviceEvent,
        engine: &Engine,
        state: &ControllerState,
        sink: &mut dyn DeviceSink,
        injector: &mut dyn Injector,
    ) -> Option<DeviceEvent> {
        self.handle_pause_toggle(event, engine, sink);

        if engine.is_paused() {
            return None;
        }

        engine.remap_and_tweak(event, state, sink, injector)
    }

    fn handle_pause_toggle(&mut self, event: DeviceEvent, engine: &Engine, sink: &mut dyn DeviceSink) {
        let is_options = self.signals.matches(&event, ControllerSignal::OPTIONS);
        let is_ps = self.signals.matches(&event, ControllerSignal::PS);
        let is_share = self.signals.matches(&event, ControllerSignal::SHARE);

        if is_options || is_ps {
            let prior = if is_options { self.prior_options } else { self.prior_ps };
            let rising = prior == 0 && event.value != 0;
            if is_options {
                self.prior_options = event.value;
            } else {
                self.prior_ps = event.value;
            }
            if rising {
                engine.set_paused(true);
                engine.set_pause_primer(false);
                sink.apply_event(event);
                tracing::info!("pause toggle: paused");
            }
            return;
        }

        if is_share {
            let rising = self.prior_share == 0 && event.value != 0;
            let falling = self.prior_share != 0 && event.value == 0;
            self.prior_share = event.value;

            if rising && engine.is_paused() && engine.is_game_ready() {
                engine.set_pause_primer(true);
            } else if falling && engine.pause_primer() {
                engine.set_paused(false);
                engine.set_pause_primer(false);
                tracing::info!("pause toggle: resumed");
            }
            sink.apply_event(DeviceEvent { value: 0, ..event });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TYPE_BUTTON;

    struct NullInjector;
    impl Injector for NullInjector {
        fn fake_pipelined_event(&mut self, _event: DeviceEvent, _source: &str) {}
    }
    struct RecordingSink {
        applied: Vec<DeviceEvent>,
    }
    impl DeviceSink for RecordingSink {
        fn apply_event(&mut self, event: DeviceEvent) {
            self.applied.push(event);
        }
    }

    fn options_event(value: i16) -> DeviceEvent {
        DeviceEvent::new(0, value, TYPE_BUTTON, 9)
    }
    fn share_event(value: i16) -> DeviceEvent {
        DeviceEvent::new(0, value, TYPE_BUTTON, 8)
    }

    #[test]
    fn options_rising_edge_pauses() {
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        let mut pipeline = Pipeline::new(signals);
        let state = ControllerState::new();
        let mut sink = RecordingSink { applied: Vec::new() };
        let mut injector = NullInjector;

        assert!(!engine.is_paused());
        let out = pipeline.sniffify(options_event(1), &engine, &state, &mut sink, &mut injector);
        assert!(out.is_none());
        assert!(engine.is_paused());
    }

    #[test]
    fn events_are_swallowed_while_paused() {
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        engine.set_paused(true);
        let mut pipeline = Pipeline::new(signals);
        let state = ControllerState::new();
        let mut sink = RecordingSink { applied: Vec::new() };
        let mut injector = NullInjector;

        let ev = DeviceEvent::new(0, 1, TYPE_BUTTON, 0);
        assert!(pipeline.sniffify(ev, &engine, &state, &mut sink, &mut injector).is_none());
    }

    #[test]
    fn share_primes_then_resumes_on_falling_edge() {
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        engine.set_paused(true);
        engine.set_game_ready(true);
        let mut pipeline = Pipeline::new(signals);
        let state = ControllerState::new();
        let mut sink = RecordingSink { applied: Vec::new() };
        let mut injector = NullInjector;

        pipeline.sniffify(share_event(1), &engine, &state, &mut sink, &mut injector);
        assert!(engine.pause_primer());
        assert!(engine.is_paused());

        pipeline.sniffify(share_event(0), &engine, &state, &mut sink, &mut injector);
        assert!(!engine.is_paused());
        assert!(!engine.pause_primer());

        // Outgoing SHARE value is always zeroed, on both edges.
        assert!(sink.applied.iter().all(|e| e.value == 0));
    }

    #[test]
    fn share_without_game_ready_does_not_prime() {
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        engine.set_paused(true);
        let mut pipeline = Pipeline::new(signals);
        let state = ControllerState::new();
        let mut sink = RecordingSink { applied: Vec::new() };
        let mut injector = NullInjector;

        pipeline.sniffify(share_event(1), &engine, &state, &mut sink, &mut injector);
        assert!(!engine.pause_primer());
    }
}
