//! Sequence modifier: a state machine that plays a time-sliced [`Sequence`]
//! once triggered, optionally repeating.

use crate::command::GameCommand;
use crate::device::DeviceEvent;
use crate::sequence::Sequence;

use super::{matches_any, ModifierCtx, ModifierKind, ModifierMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Untriggered,
    Starting,
    InSequence,
    Ending,
}

pub struct SequenceModifier {
    repeat_sequence: Sequence,
    trigger: Vec<GameCommand>,
    start_delay_us: u64,
    cycle_delay_us: u64,
    block_while: Vec<GameCommand>,
    lock_all: bool,

    state: State,
    phase_elapsed_us: u64,
    sequence_elapsed_us: u64,
}

impl SequenceModifier {
    pub fn new(
        repeat_sequence: Sequence,
        trigger: Vec<GameCommand>,
        start_delay_us: u64,
        cycle_delay_us: u64,
        block_while: Vec<GameCommand>,
        lock_all: bool,
    ) -> Self {
        Self {
            repeat_sequence,
            trigger,
            start_delay_us,
            cycle_delay_us,
            block_while,
            lock_all,
            state: State::Untriggered,
            phase_elapsed_us: 0,
            sequence_elapsed_us: 0,
        }
    }
}

impl ModifierKind for SequenceModifier {
    fn begin(&mut self, meta: ModifierMeta, _ctx: &mut ModifierCtx) {
        self.state = State::Untriggered;
        self.phase_elapsed_us = 0;
        self.sequence_elapsed_us = 0;
        if self.trigger.is_empty() && meta.in_condition {
            self.state = State::Starting;
        }
    }

    fn update(&mut self, _meta: ModifierMeta, ctx: &mut ModifierCtx, dt_us: u64) {
        match self.state {
            State::Untriggered => {}
            State::Starting => {
                self.phase_elapsed_us += dt_us;
                if self.phase_elapsed_us >= self.start_delay_us {
                    self.state = State::InSequence;
                    self.sequence_elapsed_us = 0;
                }
            }
            State::InSequence => {
                self.sequence_elapsed_us += dt_us;
                if self.repeat_sequence.send_parallel(self.sequence_elapsed_us, ctx.sink) {
                    self.state = State::Ending;
                    self.phase_elapsed_us = 0;
                }
            }
            State::Ending => {
                self.phase_elapsed_us += dt_us;
                if self.phase_elapsed_us >= self.cycle_delay_us {
                    self.state = State::Untriggered;
                    self.phase_elapsed_us = 0;
                }
            }
        }
    }

    fn tweak(&mut self, meta: ModifierMeta, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        if self.state == State::Untriggered
            && !self.trigger.is_empty()
            && meta.in_condition
            && matches_any(ctx.signals, &self.trigger, &event)
        {
            self.state = State::Starting;
            self.phase_elapsed_us = 0;
        }

        if self.state == State::InSequence {
            if self.lock_all || matches_any(ctx.signals, &self.block_while, &event) {
                tracing::trace!(modifier = meta.name, "sequence: dropped event while in-sequence");
                return None;
            }
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ControllerState;
    use crate::device::{DeviceSink, TYPE_BUTTON};
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
    fn untriggered_starts_immediately_with_empty_trigger() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let mut sink = NullSink;
        let mut injector = NullInjector;
        let kind = SequenceModifier::new(Sequence::new(), vec![], 0, 0, vec![], false);
        let mut m = Modifier::new("macro", "plays a macro", Box::new(kind));
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
        m._begin(&mut ctx);
        m._update(&mut ctx, 1, false);
    }

    #[test]
    fn triggered_sequence_blocks_while_in_sequence() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let mut sink = NullSink;
        let mut injector = NullInjector;
        let mut seq = Sequence::new();
        seq.add_hold(&signals, ControllerSignal::X, 1, 10_000);
        let trigger = vec![GameCommand::new("start", ControllerSignal::R1)];
        let kind = SequenceModifier::new(seq, trigger, 0, 0, vec![], true);
        let mut m = Modifier::new("macro", "plays a macro", Box::new(kind));
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
        m._begin(&mut ctx);
        let trigger_ev = DeviceEvent::new(0, 1, TYPE_BUTTON, 5);
        m._tweak(&mut ctx, trigger_ev);
        m._update(&mut ctx, 0, false); // Starting -> InSequence (start_delay=0)
        let other_ev = DeviceEvent::new(0, 1, TYPE_BUTTON, 1);
        assert!(m._tweak(&mut ctx, other_ev).is_none());
    }
}
