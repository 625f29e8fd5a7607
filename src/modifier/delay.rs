//! Delay modifier: hold matched events and replay them after `delay_seconds`.

use std::collections::VecDeque;

use crate::device::DeviceEvent;

use super::{matches_any, ModifierCtx, ModifierKind, ModifierMeta};

pub struct DelayModifier {
    delay_us: u64,
    now_us: u64,
    queue: VecDeque<(u64, DeviceEvent)>,
}

impl DelayModifier {
    /// `delay_seconds` must be positive; the loader rejects non-positive
    /// values before a modifier of this kind is ever constructed.
    pub fn new(delay_seconds: f64) -> Self {
        Self {
            delay_us: (delay_seconds * 1_000_000.0) as u64,
            now_us: 0,
            queue: VecDeque::new(),
        }
    }
}

impl ModifierKind for DelayModifier {
    fn update(&mut self, meta: ModifierMeta, ctx: &mut ModifierCtx, dt_us: u64) {
        self.now_us += dt_us;
        while let Some(&(enqueued_at, _)) = self.queue.front() {
            if self.now_us.saturating_sub(enqueued_at) < self.delay_us {
                break;
            }
            let (_, event) = self.queue.pop_front().unwrap();
            ctx.injector.fake_pipelined_event(event, meta.name);
        }
    }

    fn tweak(&mut self, meta: ModifierMeta, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        if !matches_any(ctx.signals, meta.applies_to, &event) {
            return Some(event);
        }
        self.queue.push_back((self.now_us, event));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ControllerState, GameCommand};
    use crate::device::{DeviceSink, TYPE_BUTTON};
    use crate::modifier::{Injector, Modifier};
    use crate::signal::{ControllerSignal, SignalTable};
    use std::cell::RefCell;

    struct RecordingInjector {
        seen: RefCell<Vec<(DeviceEvent, String)>>,
    }
    impl Injector for RecordingInjector {
        fn fake_pipelined_event(&mut self, event: DeviceEvent, source: &str) {
            self.seen.borrow_mut().push((event, source.to_string()));
        }
    }
    struct NullSink;
    impl DeviceSink for NullSink {
        fn apply_event(&mut self, _event: DeviceEvent) {}
    }

    #[test]
    fn replays_after_delay_preserving_order() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let mut sink = NullSink;
        let mut injector = RecordingInjector { seen: RefCell::new(Vec::new()) };
        let mut m = Modifier::new("lag", "delay input", Box::new(DelayModifier::new(0.1)));
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
        assert!(m._tweak(&mut ctx, DeviceEvent::new(0, 1, TYPE_BUTTON, 0)).is_none());
        assert!(m._tweak(&mut ctx, DeviceEvent::new(0, 0, TYPE_BUTTON, 0)).is_none());
        m._update(&mut ctx, 50_000, false);
        assert!(injector.seen.borrow().is_empty());
        m._update(&mut ctx, 60_000, false);
        let seen = injector.seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0.value, 1);
        assert_eq!(seen[1].0.value, 0);
    }
}
