//! Control Channel (C9) — decodes JSON command frames from the external
//! chat-transport collaborator and dispatches them to the Engine; emits
//! JSON status frames back.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config;
use crate::engine::Engine;
use crate::signal::SignalTable;

/// One incoming frame: any subset of fields may be present; each is
/// processed independently, in the order listed here, matching receive
/// order for fields that interact (`winner` before `reset` would be
/// unusual but is still handled safely since `reset` only touches the
/// active/pending queues).
#[derive(Debug, Deserialize, Default)]
pub struct CommandFrame {
    pub winner: Option<String>,
    pub time: Option<f64>,
    pub remove: Option<String>,
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub game: bool,
    pub newgame: Option<String>,
    pub nummods: Option<usize>,
    #[serde(default)]
    pub exit: bool,
}

#[derive(Debug, Serialize)]
pub struct PauseFrame {
    pub pause: u8,
}

#[derive(Debug, Serialize)]
pub struct ModStatusFrame {
    pub name: String,
    pub desc: String,
    pub groups: Vec<String>,
    pub lifespan: f64,
}

#[derive(Debug, Serialize)]
pub struct GameStatusFrame {
    pub game: String,
    pub errors: usize,
    pub nmods: usize,
    pub can_unpause: bool,
    pub modtime: f64,
    pub mods: Vec<ModStatusFrame>,
}

/// Decodes incoming frames and applies them to the engine; callers collect
/// the returned outgoing frames and hand them to the transport.
pub struct ControlChannel {
    game_name: String,
    config_errors: usize,
}

impl ControlChannel {
    pub fn new(game_name: String) -> Self {
        Self {
            game_name,
            config_errors: 0,
        }
    }

    pub fn set_config_errors(&mut self, count: usize) {
        self.config_errors = count;
    }

    /// Processes one decoded frame against the engine, returning any status
    /// frames that should be sent back (at most a pause toggle plus a game
    /// status reply, in that order).
    pub fn handle(&mut self, frame: &CommandFrame, engine: &Engine, signals: &Arc<SignalTable>) -> Vec<String> {
        let mut out = Vec::new();

        if let Some(name) = &frame.winner {
            engine.winner(name, frame.time);
        }
        if let Some(name) = &frame.remove {
            engine.remove(name);
        }
        if frame.reset {
            engine.reset();
        }
        if let Some(n) = frame.nummods {
            engine.set_num_active(n);
        }
        if let Some(name) = &frame.newgame {
            engine.set_paused(true);
            engine.set_pause_primer(false);
            match config::load_game(Path::new(name), signals.clone(), engine) {
                Ok((meta, errors)) => {
                    for err in errors.errors() {
                        tracing::warn!(%err, game = %name, "game config error");
                    }
                    self.game_name = meta.name;
                    self.config_errors = errors.count();
                    engine.set_game_ready(true);
                }
                Err(e) => {
                    tracing::warn!(error = %e, game = %name, "failed to load new game file");
                    self.game_name = name.clone();
                    engine.set_game_ready(false);
                }
            }
            out.push(self.game_status_json(engine));
        }
        if frame.game {
            out.push(self.game_status_json(engine));
        }
        if frame.exit {
            engine.exit();
        }

        out
    }

    /// Pause-state telemetry, emitted whenever `pipeline.rs` flips the flag.
    pub fn pause_frame_json(paused: bool) -> String {
        serde_json::to_string(&PauseFrame { pause: paused as u8 }).expect("PauseFrame always serializes")
    }

    fn game_status_json(&self, engine: &Engine) -> String {
        let mods = engine
            .active_mod_status(true)
            .into_iter()
            .map(|m| ModStatusFrame {
                name: m.name,
                desc: m.desc,
                groups: m.groups,
                lifespan: m.lifespan_seconds,
            })
            .collect::<Vec<_>>();

        let frame = GameStatusFrame {
            game: self.game_name.clone(),
            errors: self.config_errors,
            nmods: mods.len(),
            can_unpause: self.config_errors == 0 && engine.is_game_ready(),
            modtime: engine.time_per_modifier_us.load(std::sync::atomic::Ordering::Relaxed) as f64 / 1_000_000.0,
            mods,
        };
        serde_json::to_string(&frame).expect("GameStatusFrame always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalTable;

    #[test]
    fn winner_frame_dispatches_to_engine() {
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        engine.register(crate::modifier::Modifier::new("a", "mod a", Box::new(NoopKind)));

        let mut channel = ControlChannel::new("testgame".into());
        let frame: CommandFrame = serde_json::from_str(r#"{"winner":"a"}"#).unwrap();
        channel.handle(&frame, &engine, &signals);
        assert!(engine.has_modifier("a"));
    }

    #[test]
    fn game_status_reports_errors_and_can_unpause() {
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        let mut channel = ControlChannel::new("testgame".into());
        channel.set_config_errors(2);

        let frame: CommandFrame = serde_json::from_str(r#"{"game":true}"#).unwrap();
        let out = channel.handle(&frame, &engine, &signals);
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("\"errors\":2"));
        assert!(out[0].contains("\"can_unpause\":false"));
    }

    #[test]
    fn exit_clears_keep_going() {
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        let mut channel = ControlChannel::new("testgame".into());
        let frame: CommandFrame = serde_json::from_str(r#"{"exit":true}"#).unwrap();
        channel.handle(&frame, &engine, &signals);
        assert!(!engine.keep_going());
    }

    #[test]
    fn newgame_reloads_and_sets_ready_on_success() {
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        engine.set_game_ready(false);
        let mut channel = ControlChannel::new("old".into());

        let toml = r#"
            [game]
            name = "New Game"

            [[modifiers]]
            name = "invert-x"
            kind = "invert"
        "#;
        let path = std::env::temp_dir().join(format!("chaos-control-test-{}.toml", std::process::id()));
        std::fs::write(&path, toml).unwrap();

        let frame: CommandFrame = serde_json::from_str(&format!(r#"{{"newgame":"{}"}}"#, path.display())).unwrap();
        let out = channel.handle(&frame, &engine, &signals);

        let _ = std::fs::remove_file(&path);

        assert_eq!(out.len(), 1);
        assert!(engine.is_game_ready());
        assert!(engine.has_modifier("invert-x"));
        assert!(out[0].contains("\"game\":\"New Game\""));
    }

    #[test]
    fn newgame_failure_clears_ready() {
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        let mut channel = ControlChannel::new("old".into());

        let frame: CommandFrame = serde_json::from_str(r#"{"newgame":"/nonexistent/chaos-missing-game.toml"}"#).unwrap();
        channel.handle(&frame, &engine, &signals);
        assert!(!engine.is_game_ready());
    }

    struct NoopKind;
    impl crate::modifier::ModifierKind for NoopKind {}
}
