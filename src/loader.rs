//! Game Loader Facade (C10) — the minimal surface the Engine exposes to
//! configuration-loading code (`config.rs`). Resolves names against the
//! fixed signal table, builds the per-game command/condition tables,
//! composes sequences, and installs remaps and modifiers, accumulating
//! `ConfigError`s instead of failing fast.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{GameCommand, GameCondition};
use crate::device::DeviceEvent;
use crate::engine::Engine;
use crate::error::{ConfigError, ErrorLog};
use crate::modifier::Modifier;
use crate::remap::RemapRecord;
use crate::sequence::Sequence;
use crate::signal::{ControllerInput, ControllerSignal, SignalTable};

pub struct GameLoader<'e> {
    pub signals: Arc<SignalTable>,
    pub engine: &'e Engine,
    commands: HashMap<String, GameCommand>,
    conditions: HashMap<String, GameCondition>,
}

impl<'e> GameLoader<'e> {
    pub fn new(signals: Arc<SignalTable>, engine: &'e Engine) -> Self {
        Self {
            signals,
            engine,
            commands: HashMap::new(),
            conditions: HashMap::new(),
        }
    }

    pub fn get_input(&self, name: &str) -> Option<Arc<ControllerInput>> {
        self.signals.get_by_name(name)
    }

    /// Resolves a list of input names, logging `ConfigError::UnknownInput`
    /// for each miss under `section` and skipping it rather than aborting.
    pub fn add_controller_inputs(&self, section: &str, names: &[String], errors: &mut ErrorLog) -> Vec<Arc<ControllerInput>> {
        names
            .iter()
            .filter_map(|name| match self.get_input(name) {
                Some(input) => Some(input),
                None => {
                    errors.push(ConfigError::UnknownInput {
                        section: section.to_string(),
                        name: name.clone(),
                    });
                    None
                }
            })
            .collect()
    }

    pub fn define_command(&mut self, name: &str, input: ControllerSignal) {
        self.commands.insert(name.to_string(), GameCommand::new(name, input));
    }

    /// Resolves a list of command names already defined via
    /// `define_command`, logging `ConfigError::UnknownCommand` for misses.
    pub fn add_game_commands(&self, section: &str, names: &[String], errors: &mut ErrorLog) -> Vec<GameCommand> {
        names
            .iter()
            .filter_map(|name| match self.commands.get(name) {
                Some(cmd) => Some(cmd.clone()),
                None => {
                    errors.push(ConfigError::UnknownCommand {
                        section: section.to_string(),
                        name: name.clone(),
                    });
                    None
                }
            })
            .collect()
    }

    pub fn define_condition(&mut self, condition: GameCondition) {
        self.conditions.insert(condition.name.clone(), condition);
    }

    /// Returns *independent copies* so every modifier that references a
    /// condition gets its own persistent-state cell.
    pub fn add_game_conditions(&self, section: &str, names: &[String], errors: &mut ErrorLog) -> Vec<GameCondition> {
        names
            .iter()
            .filter_map(|name| match self.conditions.get(name) {
                Some(cond) => Some(cond.clone()),
                None => {
                    errors.push(ConfigError::UnknownCommand {
                        section: section.to_string(),
                        name: name.clone(),
                    });
                    None
                }
            })
            .collect()
    }

    pub fn get_modifier(&self, name: &str) -> bool {
        self.engine.has_modifier(name)
    }

    pub fn get_modifier_map(&self) -> Vec<String> {
        self.engine.modifier_names()
    }

    pub fn register_modifier(&self, modifier: Modifier) {
        self.engine.register(modifier);
    }

    pub fn set_cascading_remap(&self, batch: Vec<(ControllerSignal, RemapRecord)>) {
        self.engine.install_remap(batch);
    }

    pub fn clear_remaps(&self) {
        self.engine.clear_remaps();
    }

    pub fn event_matches(&self, event: &DeviceEvent, command: &GameCommand) -> bool {
        self.signals.matches(event, command.input)
    }
}

/// Builds a [`Sequence`] from a raw list of step specifications, the shape
/// the declarative config's `sequence` tables deserialize into.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SequenceStep {
    Press { input: ControllerSignal, value: i16 },
    Hold { input: ControllerSignal, value: i16, hold_us: u32 },
    Release { input: ControllerSignal, release_us: u32 },
    Delay { us: u32 },
}

pub fn build_sequence(signals: &SignalTable, steps: &[SequenceStep]) -> Sequence {
    let mut seq = Sequence::new();
    for step in steps {
        match *step {
            SequenceStep::Press { input, value } => seq.add_press(signals, input, value),
            SequenceStep::Hold { input, value, hold_us } => seq.add_hold(signals, input, value, hold_us),
            SequenceStep::Release { input, release_us } => seq.add_release(signals, input, release_us),
            SequenceStep::Delay { us } => seq.add_delay(us),
        }
    }
    seq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TYPE_BUTTON;

    #[test]
    fn unknown_input_is_reported_and_skipped() {
        let signals = Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        let loader = GameLoader::new(signals, &engine);
        let mut errors = ErrorLog::new();

        let inputs = loader.add_controller_inputs("test", &["x".into(), "bogus".into()], &mut errors);
        assert_eq!(inputs.len(), 1);
        assert_eq!(errors.count(), 1);
    }

    #[test]
    fn defined_command_resolves_and_matches_events() {
        let signals = Arc::new(SignalTable::new());
        let engine = Engine::new(signals.clone(), 2, 10_000_000);
        let mut loader = GameLoader::new(signals, &engine);
        loader.define_command("jump", ControllerSignal::X);
        let mut errors = ErrorLog::new();

        let cmds = loader.add_game_commands("test", &["jump".into()], &mut errors);
        assert_eq!(cmds.len(), 1);
        assert!(errors.is_empty());

        let ev = DeviceEvent::new(0, 1, TYPE_BUTTON, 0);
        assert!(loader.event_matches(&ev, &cmds[0]));
    }

    #[test]
    fn build_sequence_from_steps() {
        let signals = SignalTable::new();
        let steps = vec![
            SequenceStep::Press {
                input: ControllerSignal::X,
                value: 1,
            },
            SequenceStep::Delay { us: 1000 },
        ];
        let seq = build_sequence(&signals, &steps);
        assert!(!seq.is_empty());
    }
}
