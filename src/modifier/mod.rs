//! Modifier Types (C6) — the eight effectful transforms a vote installs.
//!
//! Deep inheritance in the original is flattened into one [`Modifier`]
//! wrapper (shared timer/sequence/condition plumbing) around a
//! kind-specific [`ModifierKind`] trait object (one implementation per
//! kind), per the "tagged union or small trait" design note.

pub mod delay;
pub mod disable;
pub mod invert;
pub mod parent;
pub mod remap_mod;
pub mod repeat;
pub mod scaling;
pub mod sequence_mod;

use crate::command::{ControllerState, GameCommand, GameCondition};
use crate::device::{DeviceEvent, DeviceSink};
use crate::remap::RemapTable;
use crate::sequence::Sequence;
use crate::signal::SignalTable;
use crate::touchpad::TouchpadTracker;

/// Callback a kind uses to re-inject a synthetic event into the pipeline
/// without re-entering its own `tweak` (`fake_pipelined_event`).
///
/// A cheap, cloneable handle (backed by a channel in the concrete engine
/// implementation) rather than `&mut Engine`, so it can cross the lock
/// boundary: callbacks run with the engine's shared state lock released.
pub trait Injector: Send {
    fn fake_pipelined_event(&mut self, event: DeviceEvent, source: &str);
}

/// Read-only view of the fields every kind needs to decide which events it
/// owns. Borrowed from the enclosing [`Modifier`] for the duration of one
/// callback.
pub struct ModifierMeta<'a> {
    pub name: &'a str,
    pub applies_to: &'a [GameCommand],
    /// `conditions` empty or all pass, evaluated against the current
    /// `ControllerState` (`in_condition()`).
    pub in_condition: bool,
    /// `unless_conditions` nonempty and all pass (`in_unless()`).
    pub in_unless: bool,
}

/// Everything a kind needs to read controller state or produce effects.
///
/// `remap_table` and `touchpad` are engine-wide singletons: every
/// Remap-kind modifier composes into the same table rather than owning a
/// private one, so cascading installs across modifiers compose.
pub struct ModifierCtx<'a> {
    pub signals: &'a SignalTable,
    pub state: &'a ControllerState,
    pub sink: &'a mut dyn DeviceSink,
    pub injector: &'a mut dyn Injector,
    pub remap_table: &'a mut RemapTable,
    pub touchpad: &'a mut TouchpadTracker,
}

/// Per-kind behavior. Default bodies are no-ops/pass-through.
pub trait ModifierKind: Send {
    fn begin(&mut self, _meta: ModifierMeta, _ctx: &mut ModifierCtx) {}
    fn update(&mut self, _meta: ModifierMeta, _ctx: &mut ModifierCtx, _dt_us: u64) {}
    fn finish(&mut self, _meta: ModifierMeta, _ctx: &mut ModifierCtx) {}
    fn remap(&mut self, _meta: ModifierMeta, _ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        Some(event)
    }
    fn tweak(&mut self, _meta: ModifierMeta, _ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        Some(event)
    }
}

/// Shared wrapper around a [`ModifierKind`]: timer bookkeeping, condition
/// lists, and `begin_sequence`/`finish_sequence` playback common to every
/// kind.
pub struct Modifier {
    pub name: String,
    pub description: String,
    pub groups: Vec<String>,
    pub applies_to: Vec<GameCommand>,
    pub conditions: Vec<GameCondition>,
    pub unless_conditions: Vec<GameCondition>,
    pub begin_sequence: Sequence,
    pub finish_sequence: Sequence,
    pub lock_while_busy: bool,
    pub allow_as_child: bool,
    pub unlisted: bool,
    /// Set by the loader for Remap-kind modifiers so the engine knows which
    /// active modifiers to re-`_begin` after a `clear_all` on eviction: the
    /// shared remap table is wiped and only remap modifiers need to
    /// reinstall their contribution.
    pub is_remap: bool,
    /// Set by the engine at insertion time from the winner message.
    pub lifespan_us: u64,
    running_us: u64,
    pause_time_accumulator: u64,
    in_sequence: bool,
    kind: Box<dyn ModifierKind>,
}

impl Modifier {
    pub fn new(name: &str, description: &str, kind: Box<dyn ModifierKind>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            groups: Vec::new(),
            applies_to: Vec::new(),
            conditions: Vec::new(),
            unless_conditions: Vec::new(),
            begin_sequence: Sequence::new(),
            finish_sequence: Sequence::new(),
            lock_while_busy: false,
            allow_as_child: true,
            unlisted: false,
            is_remap: false,
            lifespan_us: 0,
            running_us: 0,
            pause_time_accumulator: 0,
            in_sequence: false,
            kind,
        }
    }

    fn meta(&self, signals: &SignalTable, state: &ControllerState) -> ModifierMeta<'_> {
        ModifierMeta {
            name: &self.name,
            applies_to: &self.applies_to,
            in_condition: self.in_condition(signals, state),
            in_unless: self.in_unless(signals, state),
        }
    }

    /// `running - pause_time_accumulator`.
    pub fn lifetime(&self) -> u64 {
        self.running_us.saturating_sub(self.pause_time_accumulator)
    }

    pub fn lifespan(&self) -> u64 {
        self.lifespan_us
    }

    pub fn in_sequence(&self) -> bool {
        self.in_sequence
    }

    /// True iff `conditions` is empty or every one currently holds.
    pub fn in_condition(&self, signals: &SignalTable, state: &ControllerState) -> bool {
        self.conditions.is_empty() || self.conditions.iter().all(|c| c.in_condition(signals, state))
    }

    /// True iff `unless_conditions` is nonempty and every one currently holds.
    pub fn in_unless(&self, signals: &SignalTable, state: &ControllerState) -> bool {
        !self.unless_conditions.is_empty()
            && self.unless_conditions.iter().all(|c| c.in_condition(signals, state))
    }

    pub fn _begin(&mut self, ctx: &mut ModifierCtx) {
        self.running_us = 0;
        self.pause_time_accumulator = 0;
        let meta = self.meta(ctx.signals, ctx.state);
        self.kind.begin(meta, ctx);
        if !self.begin_sequence.is_empty() {
            self.in_sequence = self.lock_while_busy;
            self.begin_sequence.send(ctx.sink);
            self.in_sequence = false;
        }
    }

    pub fn _update(&mut self, ctx: &mut ModifierCtx, dt_us: u64, was_paused: bool) {
        self.running_us += dt_us;
        if was_paused {
            self.pause_time_accumulator += dt_us;
        }
        let meta = self.meta(ctx.signals, ctx.state);
        self.kind.update(meta, ctx, dt_us);
    }

    pub fn _finish(&mut self, ctx: &mut ModifierCtx) {
        if !self.finish_sequence.is_empty() {
            self.in_sequence = self.lock_while_busy;
            self.finish_sequence.send(ctx.sink);
            self.in_sequence = false;
        }
        let meta = self.meta(ctx.signals, ctx.state);
        self.kind.finish(meta, ctx);
    }

    /// `remap(event)` is only meaningfully implemented by the Remap kind;
    /// the engine still calls it on every active modifier, which is why
    /// the default body on [`ModifierKind`] passes through.
    pub fn remap(&mut self, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        let meta = self.meta(ctx.signals, ctx.state);
        self.kind.remap(meta, ctx, event)
    }

    pub fn _tweak(&mut self, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        for c in self.conditions.iter_mut() {
            c.update_state(ctx.signals, ctx.state);
        }
        for c in self.unless_conditions.iter_mut() {
            c.update_state(ctx.signals, ctx.state);
        }
        let meta = self.meta(ctx.signals, ctx.state);
        self.kind.tweak(meta, ctx, event)
    }
}

/// True iff `event`'s wire slot matches one of `applies_to`'s inputs.
pub(crate) fn matches_any(signals: &SignalTable, applies_to: &[GameCommand], event: &DeviceEvent) -> bool {
    applies_to.iter().any(|c| signals.matches(event, c.input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TYPE_BUTTON;
    use crate::signal::ControllerSignal;

    struct NullInjector;
    impl Injector for NullInjector {
        fn fake_pipelined_event(&mut self, _event: DeviceEvent, _source: &str) {}
    }

    struct NullSink;
    impl DeviceSink for NullSink {
        fn apply_event(&mut self, _event: DeviceEvent) {}
    }

    struct CountingKind {
        begins: u32,
    }
    impl ModifierKind for CountingKind {
        fn begin(&mut self, _meta: ModifierMeta, _ctx: &mut ModifierCtx) {
            self.begins += 1;
        }
    }

    #[test]
    fn lifetime_tracks_pause_accumulator() {
        let signals = SignalTable::new();
        let state = ControllerState::new();
        let mut sink = NullSink;
        let mut injector = NullInjector;
        let mut remap_table = RemapTable::new(std::sync::Arc::new(SignalTable::new()));
        let mut touchpad = TouchpadTracker::new();
        let mut m = Modifier::new("t", "test", Box::new(CountingKind { begins: 0 }));
        let mut ctx = ModifierCtx {
            signals: &signals,
            state: &state,
            sink: &mut sink,
            injector: &mut injector,
            remap_table: &mut remap_table,
            touchpad: &mut touchpad,
        };
        m._begin(&mut ctx);
        m._update(&mut ctx, 1000, false);
        m._update(&mut ctx, 1000, true);
        assert_eq!(m.lifetime(), 1000);
    }

    #[test]
    fn matches_any_checks_applies_to() {
        let signals = SignalTable::new();
        let applies = vec![GameCommand::new("jump", ControllerSignal::X)];
        let ev = DeviceEvent::new(0, 1, TYPE_BUTTON, 0);
        assert!(matches_any(&signals, &applies, &ev));
        let other = DeviceEvent::new(0, 1, TYPE_BUTTON, 1);
        assert!(!matches_any(&signals, &applies, &other));
    }
}
