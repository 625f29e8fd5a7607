//! Chaos engine runtime — reads gamepad input, rewrites it through the
//! active modifier stack, and forwards the result to the console while a
//! control channel lets an external chat-transport collaborator drive
//! which modifiers are active.
//!
//! Usage:
//!   chaos-engine --game game.toml [OPTIONS]

mod command;
mod config;
mod control;
mod device;
mod engine;
mod error;
mod hid;
mod loader;
mod modifier;
mod pipeline;
mod remap;
mod sequence;
mod signal;
mod touchpad;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};

use command::ControllerState;
use control::{CommandFrame, ControlChannel};
use device::{DeviceEvent, DeviceSink, DeviceSource};
use engine::Engine;
use hid::{GilrsSource, LoggingSink};
use modifier::Injector;
use pipeline::Pipeline;
use signal::SignalTable;

/// Chaos: an in-line gamepad-signal rewriter driven by vote-installed,
/// time-bounded modifiers.
#[derive(Parser, Debug)]
#[command(name = "chaos-engine")]
#[command(about = "In-line gamepad-signal rewriter engine")]
struct Args {
    /// Path to the game's TOML command/condition/modifier description.
    #[arg(long)]
    game: PathBuf,

    /// Poll rate for the physical gamepad, in Hz.
    #[arg(long, default_value_t = 250)]
    poll_hz: u32,

    /// Engine tick rate, in Hz.
    #[arg(long, default_value_t = 60)]
    tick_hz: u32,

    /// Number of concurrently active modifiers before the game file loads;
    /// the game file's own `num_active` always takes over once it loads.
    #[arg(long)]
    num_active: Option<usize>,

    /// Seconds a modifier lives once voted in, before the game file loads;
    /// the game file's own `time_per_modifier` always takes over once it
    /// loads.
    #[arg(long)]
    time_per_modifier: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let signals = Arc::new(SignalTable::new());
    let engine = Engine::new(
        signals.clone(),
        args.num_active.unwrap_or(3),
        (args.time_per_modifier.unwrap_or(30.0) * 1_000_000.0) as u64,
    );

    let (game_name, mut control_channel) = load_game(&args.game, &signals, &engine)?;
    engine.set_game_ready(true);

    let source = GilrsSource::new(signals.clone(), args.poll_hz);
    let sink = LoggingSink;

    let (frame_tx, frame_rx) = bounded::<CommandFrame>(64);
    spawn_stdin_reader(frame_tx);

    run(engine, signals, source, sink, frame_rx, &mut control_channel, args.tick_hz);

    tracing::info!(game = %game_name, "exiting");
    Ok(())
}

fn load_game(path: &PathBuf, signals: &Arc<SignalTable>, engine: &Engine) -> Result<(String, ControlChannel)> {
    let (meta, errors) = config::load_game(path, signals.clone(), engine).with_context(|| format!("loading game file {}", path.display()))?;

    let mut control_channel = ControlChannel::new(meta.name.clone());
    control_channel.set_config_errors(errors.count());
    if !errors.is_empty() {
        for err in errors.errors() {
            tracing::warn!(%err, "game config error");
        }
    }
    tracing::info!(game = %meta.name, errors = errors.count(), "game loaded");
    Ok((meta.name, control_channel))
}

/// Reads newline-delimited JSON `CommandFrame`s from stdin on a background
/// thread, the same shape as the gamepad-polling worker in `hid.rs`.
fn spawn_stdin_reader(frame_tx: Sender<CommandFrame>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<CommandFrame>(line) {
                Ok(frame) => {
                    if frame_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "malformed command frame"),
            }
        }
    });
}

/// Channel-backed `Injector`: `fake_pipelined_event` calls made from inside
/// a modifier callback queue their event instead of recursing back into the
/// engine, so a sequence or repeat modifier can synthesize presses without
/// re-entering locks already held by the caller.
struct QueueInjector {
    pending: Vec<(DeviceEvent, String)>,
}

impl QueueInjector {
    fn new() -> Self {
        Self { pending: Vec::new() }
    }

    fn drain(&mut self) -> Vec<(DeviceEvent, String)> {
        std::mem::take(&mut self.pending)
    }
}

impl Injector for QueueInjector {
    fn fake_pipelined_event(&mut self, event: DeviceEvent, source: &str) {
        self.pending.push((event, source.to_string()));
    }
}

fn run(
    engine: Engine,
    signals: Arc<SignalTable>,
    mut source: GilrsSource,
    mut sink: LoggingSink,
    frame_rx: Receiver<CommandFrame>,
    control_channel: &mut ControlChannel,
    tick_hz: u32,
) {
    let mut pipeline = Pipeline::new(signals.clone());
    let mut state = ControllerState::new();
    let mut injector = QueueInjector::new();

    let period = Duration::from_secs_f64(1.0 / tick_hz as f64);
    let mut last_tick = Instant::now();
    let mut was_paused = engine.is_paused();
    let stdout = std::io::stdout();

    while engine.keep_going() {
        let tick_start = Instant::now();

        for frame in frame_rx.try_iter() {
            for out in control_channel.handle(&frame, &engine, &signals) {
                emit(&stdout, &out);
            }
        }

        while let Some(event) = source.poll_event() {
            state.update(&event);
            if let Some(rewritten) = pipeline.sniffify(event, &engine, &state, &mut sink, &mut injector) {
                sink.apply_event(rewritten);
            }
            drain_injected(&engine, &state, &mut sink, &mut injector);
        }

        let paused = engine.is_paused();
        if paused != was_paused {
            was_paused = paused;
            emit(&stdout, &ControlChannel::pause_frame_json(paused));
        }

        let dt_us = last_tick.elapsed().as_micros() as u64;
        last_tick = Instant::now();
        engine.tick(&mut sink, &mut injector, &state, dt_us);
        drain_injected(&engine, &state, &mut sink, &mut injector);

        let elapsed = tick_start.elapsed();
        if elapsed < period {
            spin_sleep::sleep(period - elapsed);
        } else {
            tracing::trace!(?elapsed, budget = ?period, "tick overran its period");
        }
    }
}

/// Drains events a modifier synthesized during the tick just run, feeding
/// each back through the tweak-only pass via `engine.fake_pipelined_event`.
/// A synthesized event can itself cause further injections (a sequence
/// modifier chaining presses), so this keeps draining until the queue is
/// empty rather than taking a single pass.
fn drain_injected(engine: &Engine, state: &ControllerState, sink: &mut dyn DeviceSink, injector: &mut QueueInjector) {
    loop {
        let batch = injector.drain();
        if batch.is_empty() {
            break;
        }
        for (event, source) in batch {
            engine.fake_pipelined_event(event, &source, state, sink, injector);
        }
    }
}

fn emit(stdout: &std::io::Stdout, line: &str) {
    let mut handle = stdout.lock();
    if writeln!(handle, "{line}").is_err() {
        tracing::warn!("failed to write status frame to stdout");
    }
}
