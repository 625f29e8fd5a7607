//! Repeat modifier: presses/releases its commands on a configured duty
//! cycle for `num_cycles` repetitions, then idles `cycle_delay` before the
//! next run.

use crate::command::GameCommand;
use crate::device::DeviceEvent;

use super::{matches_any, ModifierCtx, ModifierKind, ModifierMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Cycling,
    WaitingCycleDelay,
}

pub struct RepeatModifier {
    time_on_us: u64,
    time_off_us: u64,
    num_cycles: u32,
    cycle_delay_us: u64,
    force_on: Vec<i16>,
    force_off: Vec<i16>,
    block_while: Vec<GameCommand>,

    phase: Phase,
    press_time_us: u64,
    is_on: bool,
    repeat_count: u32,
    cycle_wait_us: u64,
}

impl RepeatModifier {
    pub fn new(
        time_on_us: u64,
        time_off_us: u64,
        num_cycles: u32,
        cycle_delay_us: u64,
        force_on: Vec<i16>,
        force_off: Vec<i16>,
        block_while: Vec<GameCommand>,
    ) -> Self {
        if time_on_us == 0 || time_off_us == 0 {
            tracing::warn!("repeat modifier configured with a zero time_on/time_off; it will fire every tick");
        }
        Self {
            time_on_us,
            time_off_us,
            num_cycles: num_cycles.max(1),
            cycle_delay_us,
            force_on,
            force_off,
            block_while,
            phase: Phase::Cycling,
            press_time_us: 0,
            is_on: false,
            repeat_count: 0,
            cycle_wait_us: 0,
        }
    }

    fn apply(&self, meta: &ModifierMeta, ctx: &mut ModifierCtx, values: &[i16]) {
        for (cmd, &value) in meta.applies_to.iter().zip(values.iter()) {
            let input = ctx.signals.get_by_signal(cmd.input);
            let idx = input.button_index();
            let event = DeviceEvent::new(0, value, (idx >> 8) as u8, (idx & 0xff) as u8);
            ctx.sink.apply_event(event);
        }
    }
}

impl ModifierKind for RepeatModifier {
    fn begin(&mut self, _meta: ModifierMeta, _ctx: &mut ModifierCtx) {
        self.phase = Phase::Cycling;
        self.press_time_us = 0;
        self.is_on = false;
        self.repeat_count = 0;
        self.cycle_wait_us = 0;
    }

    fn update(&mut self, meta: ModifierMeta, ctx: &mut ModifierCtx, dt_us: u64) {
        match self.phase {
            Phase::WaitingCycleDelay => {
                self.cycle_wait_us += dt_us;
                if self.cycle_wait_us >= self.cycle_delay_us {
                    self.phase = Phase::Cycling;
                    self.press_time_us = 0;
                    self.is_on = false;
                    self.repeat_count = 0;
                }
            }
            Phase::Cycling => {
                self.press_time_us += dt_us;
                let period = if self.is_on { self.time_on_us } else { self.time_off_us };
                if self.press_time_us < period {
                    return;
                }
                self.press_time_us = 0;
                if self.is_on {
                    let force_off = self.force_off.clone();
                    self.apply(&meta, ctx, &force_off);
                    self.is_on = false;
                    self.repeat_count += 1;
                    if self.repeat_count >= self.num_cycles {
                        self.phase = Phase::WaitingCycleDelay;
                        self.cycle_wait_us = 0;
                    }
                } else {
                    let force_on = self.force_on.clone();
                    self.apply(&meta, ctx, &force_on);
                    self.is_on = true;
                }
            }
        }
    }

    fn tweak(&mut self, meta: ModifierMeta, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        if self.is_on && matches_any(ctx.signals, &self.block_while, &event) {
            tracing::trace!(modifier = meta.name, "repeat: dropped event during on-cycle block_while");
            return None;
        }
        Some(event)
    }
}
