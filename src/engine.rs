//! Engine Loop (C7) — the mod-lifecycle scheduler.
//!
//! Two mutexes split state along its actual contention boundary:
//! `queues` (active-list/pending-queue bookkeeping) is touched by both
//! the engine and control threads and must stay free of blocking sequence
//! sends; `registry` (the modifier objects themselves) is only ever
//! touched by the engine thread, so locking it while running
//! `_begin`/`_update`/`_finish` outside `queues` keeps callbacks running
//! with that shared lock released, without requiring unsafe code.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::command::ControllerState;
use crate::device::DeviceSink;
use crate::modifier::{Injector, Modifier, ModifierCtx};
use crate::remap::RemapTable;
use crate::signal::SignalTable;
use crate::touchpad::TouchpadTracker;

#[derive(Debug, Clone)]
struct PendingStart {
    name: String,
    lifespan_us: u64,
}

#[derive(Default)]
struct Queues {
    active_order: Vec<String>,
    to_start: Vec<PendingStart>,
    to_stop: Vec<String>,
}

/// One entry of the status reply's `mods` list.
#[derive(Debug, Clone)]
pub struct ModStatus {
    pub name: String,
    pub desc: String,
    pub groups: Vec<String>,
    pub lifespan_seconds: f64,
}

pub struct Engine {
    signals: std::sync::Arc<SignalTable>,
    queues: Mutex<Queues>,
    registry: Mutex<HashMap<String, Modifier>>,
    remap_table: Mutex<RemapTable>,
    touchpad: Mutex<TouchpadTracker>,

    pub num_active: AtomicUsize,
    pub time_per_modifier_us: AtomicUsize,
    keep_going: AtomicBool,
    paused_prior: AtomicBool,
    pause: AtomicBool,
    pause_primer: AtomicBool,
    game_ready: AtomicBool,
}

impl Engine {
    pub fn new(signals: std::sync::Arc<SignalTable>, num_active: usize, time_per_modifier_us: u64) -> Self {
        Self {
            remap_table: Mutex::new(RemapTable::new(signals.clone())),
            signals,
            queues: Mutex::new(Queues::default()),
            registry: Mutex::new(HashMap::new()),
            touchpad: Mutex::new(TouchpadTracker::new()),
            num_active: AtomicUsize::new(num_active),
            time_per_modifier_us: AtomicUsize::new(time_per_modifier_us as usize),
            keep_going: AtomicBool::new(true),
            paused_prior: AtomicBool::new(false),
            pause: AtomicBool::new(false),
            pause_primer: AtomicBool::new(false),
            game_ready: AtomicBool::new(false),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.pause.store(paused, Ordering::Relaxed);
    }

    pub fn pause_primer(&self) -> bool {
        self.pause_primer.load(Ordering::Relaxed)
    }

    pub fn set_pause_primer(&self, primed: bool) {
        self.pause_primer.store(primed, Ordering::Relaxed);
    }

    pub fn is_game_ready(&self) -> bool {
        self.game_ready.load(Ordering::Relaxed)
    }

    pub fn set_game_ready(&self, ready: bool) {
        self.game_ready.store(ready, Ordering::Relaxed);
    }

    pub fn register(&self, modifier: Modifier) {
        self.registry.lock().unwrap().insert(modifier.name.clone(), modifier);
    }

    pub fn keep_going(&self) -> bool {
        self.keep_going.load(Ordering::Relaxed)
    }

    pub fn has_modifier(&self, name: &str) -> bool {
        self.registry.lock().unwrap().contains_key(name)
    }

    pub fn modifier_names(&self) -> Vec<String> {
        self.registry.lock().unwrap().keys().cloned().collect()
    }

    // ---- Game Loader Facade support (called from loader.rs) ----

    pub fn install_remap(&self, batch: Vec<(crate::signal::ControllerSignal, crate::remap::RemapRecord)>) {
        self.remap_table.lock().unwrap().install_cascading(batch);
    }

    pub fn clear_remaps(&self) {
        self.remap_table.lock().unwrap().clear_all();
    }

    // ---- Command ingestion (called from the control thread) ----

    pub fn winner(&self, name: &str, time_seconds: Option<f64>) {
        if !self.registry.lock().unwrap().contains_key(name) {
            tracing::warn!(name, "winner: unknown modifier");
            return;
        }
        let lifespan_us = (time_seconds.unwrap_or_else(|| self.time_per_modifier_us.load(Ordering::Relaxed) as f64 / 1_000_000.0)
            * 1_000_000.0) as u64;

        let mut q = self.queues.lock().unwrap();
        if q.active_order.contains(&name.to_string()) {
            if let Some(m) = self.registry.lock().unwrap().get_mut(name) {
                m.lifespan_us += lifespan_us;
            }
        } else if let Some(pending) = q.to_start.iter_mut().find(|p| p.name == name) {
            pending.lifespan_us += lifespan_us;
        } else {
            q.to_start.push(PendingStart {
                name: name.to_string(),
                lifespan_us,
            });
        }
        q.to_stop.retain(|n| n != name);
    }

    pub fn remove(&self, name: &str) {
        let mut q = self.queues.lock().unwrap();
        if let Some(pos) = q.to_start.iter().position(|p| p.name == name) {
            q.to_start.remove(pos);
            return;
        }
        if q.active_order.contains(&name.to_string()) && !q.to_stop.iter().any(|n| n == name) {
            q.to_stop.push(name.to_string());
        }
    }

    pub fn reset(&self) {
        let mut q = self.queues.lock().unwrap();
        q.to_start.clear();
        for name in q.active_order.clone() {
            if !q.to_stop.iter().any(|n| n == &name) {
                q.to_stop.push(name);
            }
        }
    }

    pub fn set_num_active(&self, n: usize) {
        if n >= 1 {
            self.num_active.store(n, Ordering::Relaxed);
        }
    }

    pub fn exit(&self) {
        self.keep_going.store(false, Ordering::Relaxed);
    }

    pub fn active_mod_status(&self, exclude_unlisted: bool) -> Vec<ModStatus> {
        let q = self.queues.lock().unwrap();
        let registry = self.registry.lock().unwrap();
        q.active_order
            .iter()
            .filter_map(|name| registry.get(name))
            .filter(|m| !(exclude_unlisted && m.unlisted))
            .map(|m| ModStatus {
                name: m.name.clone(),
                desc: m.description.clone(),
                groups: m.groups.clone(),
                lifespan_seconds: m.lifespan() as f64 / 1_000_000.0,
            })
            .collect()
    }

    // ---- Tick ----

    /// Run one engine tick. `dt_us` is the elapsed time since the previous
    /// tick. A set `pause` flag short-circuits the whole
    /// body and just records that the next live tick was preceded by a
    /// pause, so that tick's `_update` can credit its `dt` to
    /// `pause_time_accumulator` instead of `lifetime()`.
    pub fn tick(&self, sink: &mut dyn DeviceSink, injector: &mut dyn Injector, state: &ControllerState, dt_us: u64) {
        if self.is_paused() {
            self.paused_prior.store(true, Ordering::Relaxed);
            return;
        }

        let (to_finish, to_begin) = {
            let mut q = self.queues.lock().unwrap();

            let mut to_finish = Vec::new();
            for name in std::mem::take(&mut q.to_stop) {
                q.to_start.retain(|p| p.name != name);
                if let Some(pos) = q.active_order.iter().position(|n| n == &name) {
                    q.active_order.remove(pos);
                    to_finish.push(name);
                }
            }

            let mut to_begin = Vec::new();
            for pending in std::mem::take(&mut q.to_start) {
                if q.active_order.contains(&pending.name) {
                    continue;
                }
                q.active_order.push(pending.name.clone());
                to_begin.push(pending);
            }

            (to_finish, to_begin)
        };

        let was_paused = self.paused_prior.swap(false, Ordering::Relaxed);

        let signals = self.signals.clone();
        let mut remap_table = self.remap_table.lock().unwrap();
        let mut touchpad = self.touchpad.lock().unwrap();
        let mut registry = self.registry.lock().unwrap();

        let mut ctx = ModifierCtx {
            signals: &signals,
            state,
            sink,
            injector,
            remap_table: &mut remap_table,
            touchpad: &mut touchpad,
        };

        let mut any_remap_finished = false;
        for name in &to_finish {
            if let Some(m) = registry.get_mut(name) {
                m._finish(&mut ctx);
                any_remap_finished |= m.is_remap;
            }
        }

        for pending in &to_begin {
            if let Some(m) = registry.get_mut(&pending.name) {
                m.lifespan_us = pending.lifespan_us;
                m._begin(&mut ctx);
            }
        }

        // A finished Remap modifier's contribution must be purged from the
        // shared table; every other still-active remap modifier then
        // reinstalls: a finished remap modifier wipes the shared table,
        // so every other still-active remap modifier must reinstall its
        // contribution.
        if any_remap_finished {
            ctx.remap_table.clear_all();
            let active_names: Vec<String> = {
                let q = self.queues.lock().unwrap();
                q.active_order.clone()
            };
            for name in &active_names {
                if to_begin.iter().any(|p| &p.name == name) {
                    continue; // already begun above, post-clear
                }
                if let Some(m) = registry.get_mut(name) {
                    if m.is_remap {
                        m._begin(&mut ctx);
                    }
                }
            }
        }

        let active_names: Vec<String> = {
            let q = self.queues.lock().unwrap();
            q.active_order.clone()
        };
        for name in &active_names {
            if let Some(m) = registry.get_mut(name) {
                m._update(&mut ctx, dt_us, was_paused);
            }
        }

        drop(registry);
        drop(touchpad);
        drop(remap_table);

        self.evict_one(sink, injector, state);
    }

    fn evict_one(&self, sink: &mut dyn DeviceSink, injector: &mut dyn Injector, state: &ControllerState) {
        let num_active = self.num_active.load(Ordering::Relaxed);
        let evictee = {
            let mut q = self.queues.lock().unwrap();
            let registry = self.registry.lock().unwrap();

            let candidate = if q.active_order.len() > num_active {
                q.active_order
                    .iter()
                    .filter_map(|n| registry.get(n).map(|m| (n.clone(), m.lifetime())))
                    .max_by_key(|(_, lifetime)| *lifetime)
                    .map(|(n, _)| n)
            } else {
                q.active_order
                    .iter()
                    .find(|n| registry.get(*n).map(|m| m.lifetime() > m.lifespan()).unwrap_or(false))
                    .cloned()
            };

            if let Some(name) = &candidate {
                q.active_order.retain(|n| n != name);
            }
            candidate
        };

        let Some(name) = evictee else { return };

        let signals = self.signals.clone();
        let mut remap_table = self.remap_table.lock().unwrap();
        let mut touchpad = self.touchpad.lock().unwrap();
        let mut registry = self.registry.lock().unwrap();
        let mut ctx = ModifierCtx {
            signals: &signals,
            state,
            sink,
            injector,
            remap_table: &mut remap_table,
            touchpad: &mut touchpad,
        };
        let was_remap = if let Some(m) = registry.get_mut(&name) {
            m._finish(&mut ctx);
            m.is_remap
        } else {
            false
        };
        if was_remap {
            ctx.remap_table.clear_all();
            let active_names: Vec<String> = self.queues.lock().unwrap().active_order.clone();
            for other in active_names {
                if let Some(m) = registry.get_mut(&other) {
                    if m.is_remap {
                        m._begin(&mut ctx);
                    }
                }
            }
        }
    }

    // ---- Event Pipeline support (driven from pipeline.rs) ----

    /// Remap pass then tweak pass, in activation order, short-circuiting on
    /// the first modifier that drops the event.
    pub fn remap_and_tweak(
        &self,
        event: crate::device::DeviceEvent,
        state: &ControllerState,
        sink: &mut dyn DeviceSink,
        injector: &mut dyn Injector,
    ) -> Option<crate::device::DeviceEvent> {
        let active_names = self.queues.lock().unwrap().active_order.clone();
        let signals = self.signals.clone();
        let mut remap_table = self.remap_table.lock().unwrap();
        let mut touchpad = self.touchpad.lock().unwrap();
        let mut registry = self.registry.lock().unwrap();
        let mut ctx = ModifierCtx {
            signals: &signals,
            state,
            sink,
            injector,
            remap_table: &mut remap_table,
            touchpad: &mut touchpad,
        };

        let mut current = Some(event);
        for name in &active_names {
            let Some(ev) = current else { break };
            current = registry.get_mut(name).and_then(|m| m.remap(&mut ctx, ev));
        }
        for name in &active_names {
            let Some(ev) = current else { break };
            current = registry.get_mut(name).and_then(|m| m._tweak(&mut ctx, ev));
        }
        current
    }

    /// `fake_pipelined_event`: tweak-only pass (injections are
    /// already in post-remap coordinates), restricted to modifiers after
    /// `source` in activation order, or all of them if `source` isn't found
    /// (e.g. called from a `finish` callback after the source already left
    /// the active list).
    pub fn fake_pipelined_event(
        &self,
        event: crate::device::DeviceEvent,
        source: &str,
        state: &ControllerState,
        sink: &mut dyn DeviceSink,
        injector: &mut dyn Injector,
    ) {
        let active_names = self.queues.lock().unwrap().active_order.clone();
        let start = active_names.iter().position(|n| n == source).map(|i| i + 1).unwrap_or(0);

        let signals = self.signals.clone();
        let mut remap_table = self.remap_table.lock().unwrap();
        let mut touchpad = self.touchpad.lock().unwrap();
        let mut registry = self.registry.lock().unwrap();
        let mut ctx = ModifierCtx {
            signals: &signals,
            state,
            sink,
            injector,
            remap_table: &mut remap_table,
            touchpad: &mut touchpad,
        };

        let mut current = Some(event);
        for name in &active_names[start..] {
            let Some(ev) = current else { break };
            current = registry.get_mut(name).and_then(|m| m._tweak(&mut ctx, ev));
        }
        if let Some(ev) = current {
            ctx.sink.apply_event(ev);
        }
    }
}
