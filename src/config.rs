//! Declarative game-description loader — reads the game's TOML file and
//! builds the command/condition/sequence/modifier tables via the Game
//! Loader Facade. One `serde`-derived struct per section, with an
//! allow-list style validation pass per modifier kind.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::command::{GameCommand, GameCondition, ThresholdType};
use crate::error::{ConfigError, ErrorLog};
use crate::loader::{build_sequence, GameLoader, SequenceStep};
use crate::modifier::delay::DelayModifier;
use crate::modifier::disable::{DisableFilter, DisableModifier};
use crate::modifier::invert::InvertModifier;
use crate::modifier::parent::{ChildFactory, ParentModifier};
use crate::modifier::remap_mod::{RemapConfig, RemapModifier};
use crate::modifier::repeat::RepeatModifier;
use crate::modifier::scaling::ScalingModifier;
use crate::modifier::sequence_mod::SequenceModifier;
use crate::modifier::{Modifier, ModifierKind};
use crate::signal::{joystick_limit, ControllerInput, ControllerSignal, SignalTable, JOYSTICK_MAX};

#[derive(Debug, Clone, Deserialize)]
pub struct GameFile {
    pub game: GameMeta,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
    #[serde(default)]
    pub sequences: Vec<SequenceSpec>,
    #[serde(default)]
    pub modifiers: Vec<ModifierSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameMeta {
    pub name: String,
    #[serde(default = "default_num_active")]
    pub num_active: usize,
    #[serde(default = "default_time_per_modifier")]
    pub time_per_modifier: f64,
}

fn default_num_active() -> usize {
    3
}
fn default_time_per_modifier() -> f64 {
    30.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub input: ControllerSignal,
}

fn default_threshold_type() -> String {
    "above".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionSpec {
    pub name: String,
    #[serde(rename = "while")]
    pub while_list: Vec<String>,
    #[serde(default)]
    pub clear_on: Vec<String>,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default = "default_threshold_type")]
    pub threshold_type: String,
    #[serde(default)]
    pub clear_threshold: f64,
    #[serde(default = "default_threshold_type")]
    pub clear_threshold_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SequenceSpec {
    pub name: String,
    pub steps: Vec<SequenceStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModifierSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub applies_to: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub unless: Vec<String>,
    pub begin_sequence: Option<String>,
    pub finish_sequence: Option<String>,
    #[serde(default)]
    pub lock_while_busy: bool,
    #[serde(default = "default_true")]
    pub allow_as_child: bool,
    #[serde(default)]
    pub unlisted: bool,
    /// Kind-specific parameters, validated by each modifier's own factory
    /// function.
    #[serde(flatten)]
    pub params: toml::value::Table,
}

fn default_true() -> bool {
    true
}

fn threshold_kind(s: &str) -> Option<ThresholdType> {
    Some(match s {
        "above" => ThresholdType::Above,
        "below" => ThresholdType::Below,
        "greater" => ThresholdType::Greater,
        "less" => ThresholdType::Less,
        "distance" => ThresholdType::Distance,
        "distance_below" => ThresholdType::DistanceBelow,
        _ => return None,
    })
}

/// `[-1,1]` proportion -> signed 16-bit threshold.
fn scaled_threshold(proportion: f64) -> i16 {
    joystick_limit((proportion * JOYSTICK_MAX as f64) as i32)
}

/// Resolves names against already-defined commands/conditions/inputs.
/// Implemented by [`GameLoader`] itself for top-level modifiers, and by an
/// owned [`Resolver`] snapshot for modifiers a parent builds lazily at
/// draw time, long after the `GameLoader` that parsed the file is gone.
trait NameResolver {
    fn get_input(&self, name: &str) -> Option<Arc<ControllerInput>>;
    fn add_game_commands(&self, section: &str, names: &[String], errors: &mut ErrorLog) -> Vec<GameCommand>;
    fn add_game_conditions(&self, section: &str, names: &[String], errors: &mut ErrorLog) -> Vec<GameCondition>;
}

impl NameResolver for GameLoader<'_> {
    fn get_input(&self, name: &str) -> Option<Arc<ControllerInput>> {
        GameLoader::get_input(self, name)
    }
    fn add_game_commands(&self, section: &str, names: &[String], errors: &mut ErrorLog) -> Vec<GameCommand> {
        GameLoader::add_game_commands(self, section, names, errors)
    }
    fn add_game_conditions(&self, section: &str, names: &[String], errors: &mut ErrorLog) -> Vec<GameCondition> {
        GameLoader::add_game_conditions(self, section, names, errors)
    }
}

/// Owned, `'static` snapshot of the name tables a [`GameLoader`] exposes,
/// cheap to clone into a [`ChildFactory`] closure that outlives the load.
#[derive(Clone)]
struct Resolver {
    signals: Arc<SignalTable>,
    commands: Arc<HashMap<String, GameCommand>>,
    conditions: Arc<HashMap<String, GameCondition>>,
}

impl NameResolver for Resolver {
    fn get_input(&self, name: &str) -> Option<Arc<ControllerInput>> {
        self.signals.get_by_name(name)
    }
    fn add_game_commands(&self, section: &str, names: &[String], errors: &mut ErrorLog) -> Vec<GameCommand> {
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
    fn add_game_conditions(&self, section: &str, names: &[String], errors: &mut ErrorLog) -> Vec<GameCondition> {
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
}

/// Shared config-time context every modifier build (top-level or a
/// parent's fixed/candidate child) needs beyond its own spec.
struct BuildEnv<'a> {
    all_specs: &'a [ModifierSpec],
    sequence_specs: &'a HashMap<String, SequenceSpec>,
    signals: &'a SignalTable,
    owned: Arc<Resolver>,
}

/// A parent's `children` list may nest another parent modifier; guard
/// against a cycle among `children` references sending this into infinite
/// recursion.
const MAX_PARENT_NESTING: usize = 6;

/// Parses the game file and builds every table via the facade, logging a
/// `ConfigError` instead of aborting for any single bad entry. Returns the
/// accumulated error log; the caller decides whether `can_unpause` based
/// on `errors.is_empty()`.
pub fn load_game(path: &Path, signals: std::sync::Arc<SignalTable>, engine: &crate::engine::Engine) -> Result<(GameMeta, ErrorLog)> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading game file {}", path.display()))?;
    let file: GameFile = toml::from_str(&text).with_context(|| format!("parsing game file {}", path.display()))?;

    let mut errors = ErrorLog::new();
    let mut loader = GameLoader::new(signals.clone(), engine);
    let mut names_seen: HashMap<&'static str, Vec<String>> = HashMap::new();

    let mut command_table: HashMap<String, GameCommand> = HashMap::new();
    for spec in &file.commands {
        if !insert_unique(&mut names_seen, "command", &spec.name) {
            errors.push(ConfigError::DuplicateName {
                what: "command",
                name: spec.name.clone(),
            });
            continue;
        }
        loader.define_command(&spec.name, spec.input);
        command_table.insert(spec.name.clone(), GameCommand::new(&spec.name, spec.input));
    }

    let mut sequence_specs: HashMap<String, SequenceSpec> = HashMap::new();
    for spec in &file.sequences {
        if sequence_specs.insert(spec.name.clone(), spec.clone()).is_some() {
            errors.push(ConfigError::DuplicateName {
                what: "sequence",
                name: spec.name.clone(),
            });
        }
    }

    let mut condition_table: HashMap<String, GameCondition> = HashMap::new();
    for spec in &file.conditions {
        if !insert_unique(&mut names_seen, "condition", &spec.name) {
            errors.push(ConfigError::DuplicateName {
                what: "condition",
                name: spec.name.clone(),
            });
            continue;
        }
        if let Some(condition) = build_condition(spec, &loader, &mut errors) {
            condition_table.insert(spec.name.clone(), condition.clone());
            loader.define_condition(condition);
        }
    }

    let env = BuildEnv {
        all_specs: &file.modifiers,
        sequence_specs: &sequence_specs,
        signals: &signals,
        owned: Arc::new(Resolver {
            signals: signals.clone(),
            commands: Arc::new(command_table),
            conditions: Arc::new(condition_table),
        }),
    };

    for spec in &file.modifiers {
        if !insert_unique(&mut names_seen, "modifier", &spec.name) {
            errors.push(ConfigError::DuplicateName {
                what: "modifier",
                name: spec.name.clone(),
            });
            continue;
        }
        if let Some(modifier) = build_modifier_from_spec(spec, &loader, &env, 0, &mut errors) {
            loader.register_modifier(modifier);
        }
    }

    engine.set_num_active(file.game.num_active);
    engine.time_per_modifier_us.store(
        (file.game.time_per_modifier * 1_000_000.0) as usize,
        std::sync::atomic::Ordering::Relaxed,
    );

    Ok((file.game, errors))
}

fn insert_unique(seen: &mut HashMap<&'static str, Vec<String>>, what: &'static str, name: &str) -> bool {
    let bucket = seen.entry(what).or_default();
    if bucket.iter().any(|n| n == name) {
        false
    } else {
        bucket.push(name.to_string());
        true
    }
}

fn build_condition(spec: &ConditionSpec, loader: &GameLoader, errors: &mut ErrorLog) -> Option<GameCondition> {
    let while_list = loader.add_game_commands(&spec.name, &spec.while_list, errors);
    let clear_on_list = loader.add_game_commands(&spec.name, &spec.clear_on, errors);

    let Some(threshold_type) = threshold_kind(&spec.threshold_type) else {
        errors.push(ConfigError::UnknownKey {
            section: spec.name.clone(),
            key: spec.threshold_type.clone(),
        });
        return None;
    };
    let Some(clear_threshold_type) = threshold_kind(&spec.clear_threshold_type) else {
        errors.push(ConfigError::UnknownKey {
            section: spec.name.clone(),
            key: spec.clear_threshold_type.clone(),
        });
        return None;
    };

    if threshold_type.is_distance() && while_list.len() != 2 {
        errors.push(ConfigError::BadDistanceArity { got: while_list.len() });
        return None;
    }
    if while_list.is_empty() {
        errors.push(ConfigError::MissingKey {
            section: spec.name.clone(),
            key: "while".into(),
        });
        return None;
    }

    Some(GameCondition::new(
        &spec.name,
        while_list,
        clear_on_list,
        scaled_threshold(spec.threshold),
        threshold_type,
        scaled_threshold(spec.clear_threshold),
        clear_threshold_type,
    ))
}

/// Builds one [`Modifier`] from its spec: dispatches to the kind-specific
/// factory, then resolves the shared wrapper fields (groups, applies_to,
/// conditions, sequences). Used for every top-level modifier and,
/// recursively, for a parent modifier's fixed children.
fn build_modifier_from_spec(spec: &ModifierSpec, resolver: &dyn NameResolver, env: &BuildEnv<'_>, depth: usize, errors: &mut ErrorLog) -> Option<Modifier> {
    let kind: Box<dyn ModifierKind> = if spec.kind == "sequence" {
        check_allowed_keys(spec, SEQUENCE_KEYS, errors);
        build_sequence_modifier(spec, resolver, env.sequence_specs, env.signals, errors)?
    } else if spec.kind == "parent" {
        check_allowed_keys(spec, PARENT_KEYS, errors);
        build_parent(spec, resolver, env, depth, errors)?
    } else {
        match modifier_factories().get(spec.kind.as_str()) {
            Some(factory) => factory(spec, resolver, errors)?,
            None => {
                errors.push(ConfigError::UnknownModifierKind { kind: spec.kind.clone() });
                return None;
            }
        }
    };

    let mut modifier = Modifier::new(&spec.name, &spec.description, kind);
    modifier.groups = spec.groups.clone();
    modifier.applies_to = resolver.add_game_commands(&spec.name, &spec.applies_to, errors);
    modifier.conditions = resolver.add_game_conditions(&spec.name, &spec.conditions, errors);
    modifier.unless_conditions = resolver.add_game_conditions(&spec.name, &spec.unless, errors);
    modifier.lock_while_busy = spec.lock_while_busy;
    modifier.allow_as_child = spec.allow_as_child;
    modifier.unlisted = spec.unlisted;
    modifier.is_remap = spec.kind == "remap";

    if let Some(seq_name) = &spec.begin_sequence {
        match env.sequence_specs.get(seq_name) {
            Some(seq_spec) => modifier.begin_sequence = build_sequence(env.signals, &seq_spec.steps),
            None => errors.push(ConfigError::UnknownCommand {
                section: spec.name.clone(),
                name: seq_name.clone(),
            }),
        }
    }
    if let Some(seq_name) = &spec.finish_sequence {
        match env.sequence_specs.get(seq_name) {
            Some(seq_spec) => modifier.finish_sequence = build_sequence(env.signals, &seq_spec.steps),
            None => errors.push(ConfigError::UnknownCommand {
                section: spec.name.clone(),
                name: seq_name.clone(),
            }),
        }
    }

    Some(modifier)
}

type ModifierFactory = fn(&ModifierSpec, &dyn NameResolver, &mut ErrorLog) -> Option<Box<dyn ModifierKind>>;

/// Name-keyed mapping from kind-string to constructor, populated once at
/// startup. `sequence` and `parent` need more context than this signature
/// carries (sequence tables, the rest of the modifier list) and are
/// special-cased in `build_modifier_from_spec` instead.
fn modifier_factories() -> HashMap<&'static str, ModifierFactory> {
    let mut m: HashMap<&'static str, ModifierFactory> = HashMap::new();
    m.insert("disable", build_disable);
    m.insert("invert", build_invert);
    m.insert("scaling", build_scaling);
    m.insert("delay", build_delay);
    m.insert("remap", build_remap);
    m.insert("repeat", build_repeat);
    m
}

const DISABLE_KEYS: &[&str] = &["filter", "threshold"];
const INVERT_KEYS: &[&str] = &[];
const SCALING_KEYS: &[&str] = &["amplitude", "offset"];
const DELAY_KEYS: &[&str] = &["delay_seconds"];
const REMAP_KEYS: &[&str] = &["remap", "random_remap"];
const REPEAT_KEYS: &[&str] = &["force_on", "force_off", "time_on", "time_off", "num_cycles", "cycle_delay", "block_while"];
const SEQUENCE_KEYS: &[&str] = &["trigger", "block_while", "lock_all", "sequence", "start_delay", "cycle_delay"];
const PARENT_KEYS: &[&str] = &["random", "value", "children"];

/// Rejects any `params` key not in `allowed` for this modifier's kind,
/// matching the original's per-constructor config allow-list.
fn check_allowed_keys(spec: &ModifierSpec, allowed: &[&str], errors: &mut ErrorLog) {
    for key in spec.params.keys() {
        if !allowed.contains(&key.as_str()) {
            errors.push(ConfigError::UnknownKey {
                section: spec.name.clone(),
                key: key.clone(),
            });
        }
    }
}

fn get_str<'a>(spec: &'a ModifierSpec, key: &str) -> Option<&'a str> {
    spec.params.get(key).and_then(|v| v.as_str())
}
fn get_f64(spec: &ModifierSpec, key: &str, default: f64) -> f64 {
    spec.params.get(key).and_then(|v| v.as_float()).unwrap_or(default)
}
fn get_u64(spec: &ModifierSpec, key: &str, default: u64) -> u64 {
    spec.params.get(key).and_then(|v| v.as_integer()).map(|v| v as u64).unwrap_or(default)
}
fn get_bool(spec: &ModifierSpec, key: &str, default: bool) -> bool {
    spec.params.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}
fn get_str_array(spec: &ModifierSpec, key: &str) -> Vec<String> {
    spec.params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn build_disable(spec: &ModifierSpec, _resolver: &dyn NameResolver, errors: &mut ErrorLog) -> Option<Box<dyn ModifierKind>> {
    check_allowed_keys(spec, DISABLE_KEYS, errors);
    let filter = match get_str(spec, "filter") {
        None | Some("all") => DisableFilter::All,
        Some("above") => DisableFilter::Above(get_f64(spec, "threshold", 0.0) as i16),
        Some("below") => DisableFilter::Below(get_f64(spec, "threshold", 0.0) as i16),
        Some(other) => {
            errors.push(ConfigError::UnknownKey {
                section: spec.name.clone(),
                key: other.to_string(),
            });
            return None;
        }
    };
    Some(Box::new(DisableModifier::new(filter)))
}

fn build_invert(spec: &ModifierSpec, _resolver: &dyn NameResolver, errors: &mut ErrorLog) -> Option<Box<dyn ModifierKind>> {
    check_allowed_keys(spec, INVERT_KEYS, errors);
    Some(Box::new(InvertModifier))
}

fn build_scaling(spec: &ModifierSpec, _resolver: &dyn NameResolver, errors: &mut ErrorLog) -> Option<Box<dyn ModifierKind>> {
    check_allowed_keys(spec, SCALING_KEYS, errors);
    Some(Box::new(ScalingModifier {
        amplitude: get_f64(spec, "amplitude", 1.0),
        offset: get_f64(spec, "offset", 0.0),
    }))
}

fn build_delay(spec: &ModifierSpec, _resolver: &dyn NameResolver, errors: &mut ErrorLog) -> Option<Box<dyn ModifierKind>> {
    check_allowed_keys(spec, DELAY_KEYS, errors);
    let delay_seconds = get_f64(spec, "delay_seconds", 0.0);
    if delay_seconds <= 0.0 {
        errors.push(ConfigError::NonPositiveDelay(delay_seconds));
        return None;
    }
    Some(Box::new(DelayModifier::new(delay_seconds)))
}

fn build_remap(spec: &ModifierSpec, resolver: &dyn NameResolver, errors: &mut ErrorLog) -> Option<Box<dyn ModifierKind>> {
    check_allowed_keys(spec, REMAP_KEYS, errors);
    let has_fixed = spec.params.contains_key("remap");
    let has_random = spec.params.contains_key("random_remap");
    if has_fixed && has_random {
        errors.push(ConfigError::RemapAndRandomRemap);
        return None;
    }

    if has_random {
        let names = get_str_array(spec, "random_remap");
        let sources: Vec<ControllerSignal> = names
            .iter()
            .filter_map(|n| resolver.get_input(n).map(|i| i.signal))
            .collect();
        return Some(Box::new(RemapModifier::new(RemapConfig::Random(sources))));
    }

    let table = spec.params.get("remap").and_then(|v| v.as_table());
    let Some(table) = table else {
        errors.push(ConfigError::MissingKey {
            section: spec.name.clone(),
            key: "remap".into(),
        });
        return None;
    };

    let mut entries = Vec::new();
    for (from_name, to_value) in table {
        let Some(from) = resolver.get_input(from_name) else {
            errors.push(ConfigError::UnknownInput {
                section: spec.name.clone(),
                name: from_name.clone(),
            });
            continue;
        };
        let Some(to_name) = to_value.as_str() else {
            continue;
        };
        let Some(to) = resolver.get_input(to_name) else {
            errors.push(ConfigError::UnknownInput {
                section: spec.name.clone(),
                name: to_name.to_string(),
            });
            continue;
        };
        use crate::signal::SignalClass::{Accelerometer, Gyroscope, Touchpad};
        if matches!(to.class, Accelerometer | Gyroscope | Touchpad) {
            errors.push(ConfigError::UnsupportedRemapClass {
                from: from_name.clone(),
                to: to_name.to_string(),
            });
            continue;
        }
        entries.push((from.signal, crate::remap::RemapRecord { to: to.signal, ..crate::remap::RemapRecord::identity(from.signal) }));
    }
    Some(Box::new(RemapModifier::new(RemapConfig::Fixed(entries))))
}

fn build_repeat(spec: &ModifierSpec, resolver: &dyn NameResolver, errors: &mut ErrorLog) -> Option<Box<dyn ModifierKind>> {
    check_allowed_keys(spec, REPEAT_KEYS, errors);
    let force_on: Vec<i16> = spec.params.get("force_on").and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|v| v.as_integer()).map(|v| v as i16).collect()).unwrap_or_else(|| vec![1]);
    let force_off: Vec<i16> = spec.params.get("force_off").and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|v| v.as_integer()).map(|v| v as i16).collect()).unwrap_or_else(|| vec![0]);
    let time_on = get_f64(spec, "time_on", 0.2);
    if time_on <= 0.0 {
        tracing::warn!(modifier = %spec.name, "repeat modifier has time_on <= 0, cycle will never gate high");
    }
    let block_while = resolver.add_game_commands(&spec.name, &get_str_array(spec, "block_while"), errors);
    Some(Box::new(RepeatModifier::new(
        (time_on * 1_000_000.0) as u64,
        (get_f64(spec, "time_off", 0.2) * 1_000_000.0) as u64,
        get_u64(spec, "num_cycles", 1) as u32,
        (get_f64(spec, "cycle_delay", 0.0) * 1_000_000.0) as u64,
        force_on,
        force_off,
        block_while,
    )))
}

fn build_sequence_modifier(
    spec: &ModifierSpec,
    resolver: &dyn NameResolver,
    sequence_specs: &HashMap<String, SequenceSpec>,
    signals: &SignalTable,
    errors: &mut ErrorLog,
) -> Option<Box<dyn ModifierKind>> {
    let trigger_names = get_str_array(spec, "trigger");
    let trigger = resolver.add_game_commands(&spec.name, &trigger_names, errors);
    let block_while = resolver.add_game_commands(&spec.name, &get_str_array(spec, "block_while"), errors);
    let lock_all = get_bool(spec, "lock_all", false);

    let repeat_sequence = match get_str(spec, "sequence") {
        Some(seq_name) => match sequence_specs.get(seq_name) {
            Some(seq_spec) => build_sequence(signals, &seq_spec.steps),
            None => {
                errors.push(ConfigError::UnknownCommand {
                    section: spec.name.clone(),
                    name: seq_name.to_string(),
                });
                return None;
            }
        },
        None => {
            errors.push(ConfigError::MissingKey {
                section: spec.name.clone(),
                key: "sequence".into(),
            });
            return None;
        }
    };

    Some(Box::new(SequenceModifier::new(
        repeat_sequence,
        trigger,
        (get_f64(spec, "start_delay", 0.0) * 1_000_000.0) as u64,
        (get_f64(spec, "cycle_delay", 0.0) * 1_000_000.0) as u64,
        block_while,
        lock_all,
    )))
}

/// A harmless stand-in for a candidate child that somehow fails to rebuild
/// at draw time. Should not trigger: a candidate's spec already built
/// successfully once as a standalone modifier above.
struct NoopKind;
impl ModifierKind for NoopKind {}

/// Populates a Parent modifier's fixed children (resolved eagerly, from
/// the `children` key) and, in random mode, its candidate pool (every
/// other registered modifier with `allow_as_child == true`, excluding
/// other parent modifiers).
fn build_parent(spec: &ModifierSpec, resolver: &dyn NameResolver, env: &BuildEnv<'_>, depth: usize, errors: &mut ErrorLog) -> Option<Box<dyn ModifierKind>> {
    let random = get_bool(spec, "random", false);
    let value = get_u64(spec, "value", 0) as usize;

    if depth >= MAX_PARENT_NESTING {
        errors.push(ConfigError::CyclicParentReference { name: spec.name.clone() });
        return Some(Box::new(ParentModifier::new(Vec::new(), Vec::new(), random, value)));
    }

    let mut fixed_children = Vec::new();
    for name in get_str_array(spec, "children") {
        match env.all_specs.iter().find(|s| s.name == name && s.name != spec.name) {
            Some(child_spec) => {
                if let Some(child) = build_modifier_from_spec(child_spec, resolver, env, depth + 1, errors) {
                    fixed_children.push(child);
                }
            }
            None => errors.push(ConfigError::UnknownCommand {
                section: spec.name.clone(),
                name: name.clone(),
            }),
        }
    }

    let candidate_pool: Vec<ChildFactory> = if random {
        env.all_specs
            .iter()
            .filter(|s| s.name != spec.name && s.kind != "parent" && s.allow_as_child)
            .map(|candidate| child_factory(candidate.clone(), env))
            .collect()
    } else {
        Vec::new()
    };

    Some(Box::new(ParentModifier::new(fixed_children, candidate_pool, random, value)))
}

/// Builds a [`ChildFactory`] that rebuilds `spec` from scratch on every
/// call, so each draw from the candidate pool gets its own fresh
/// `ModifierKind` state rather than sharing one instance across draws.
fn child_factory(spec: ModifierSpec, env: &BuildEnv<'_>) -> ChildFactory {
    let owned = env.owned.clone();
    let all_specs: Arc<Vec<ModifierSpec>> = Arc::new(env.all_specs.to_vec());
    let sequence_specs: Arc<HashMap<String, SequenceSpec>> = Arc::new(env.sequence_specs.clone());

    Arc::new(move || {
        let child_env = BuildEnv {
            all_specs: &all_specs,
            sequence_specs: &sequence_specs,
            signals: &owned.signals,
            owned: owned.clone(),
        };
        let mut scratch = ErrorLog::new();
        build_modifier_from_spec(&spec, owned.as_ref(), &child_env, 1, &mut scratch).unwrap_or_else(|| Modifier::new(&spec.name, &spec.description, Box::new(NoopKind)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> tempfile_path::TempPath {
        tempfile_path::write(contents)
    }

    mod tempfile_path {
        use std::io::Write;
        pub struct TempPath(pub std::path::PathBuf);
        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }
        pub fn write(contents: &str) -> TempPath {
            let path = std::env::temp_dir().join(format!("chaos-config-test-{}.toml", std::process::id()));
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(contents.as_bytes()).unwrap();
            TempPath(path)
        }
    }

    #[test]
    fn loads_minimal_game_file() {
        let toml = r#"
            [game]
            name = "Test Game"
            num_active = 2

            [[commands]]
            name = "jump"
            input = "X"

            [[modifiers]]
            name = "invert-jump"
            kind = "invert"
            applies_to = ["jump"]
        "#;
        let path = write_temp(toml);
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = crate::engine::Engine::new(signals.clone(), 3, 10_000_000);

        let (meta, errors) = load_game(&path.0, signals, &engine).unwrap();
        assert_eq!(meta.name, "Test Game");
        assert!(errors.is_empty());
        assert!(engine.has_modifier("invert-jump"));
    }

    #[test]
    fn unknown_modifier_kind_is_reported() {
        let toml = r#"
            [game]
            name = "Test Game"

            [[modifiers]]
            name = "bogus"
            kind = "not_a_real_kind"
        "#;
        let path = write_temp(toml);
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = crate::engine::Engine::new(signals.clone(), 3, 10_000_000);

        let (_meta, errors) = load_game(&path.0, signals, &engine).unwrap();
        assert_eq!(errors.count(), 1);
        assert!(!engine.has_modifier("bogus"));
    }

    #[test]
    fn duplicate_modifier_name_is_reported() {
        let toml = r#"
            [game]
            name = "Test Game"

            [[modifiers]]
            name = "dup"
            kind = "invert"

            [[modifiers]]
            name = "dup"
            kind = "invert"
        "#;
        let path = write_temp(toml);
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = crate::engine::Engine::new(signals.clone(), 3, 10_000_000);

        let (_meta, errors) = load_game(&path.0, signals, &engine).unwrap();
        assert_eq!(errors.count(), 1);
    }

    #[test]
    fn unknown_key_in_modifier_params_is_reported() {
        let toml = r#"
            [game]
            name = "Test Game"

            [[modifiers]]
            name = "bad-scaling"
            kind = "scaling"
            amplitude = 2.0
            bogus_key = true
        "#;
        let path = write_temp(toml);
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = crate::engine::Engine::new(signals.clone(), 3, 10_000_000);

        let (_meta, errors) = load_game(&path.0, signals, &engine).unwrap();
        assert_eq!(errors.count(), 1);
        assert!(engine.has_modifier("bad-scaling"));
    }

    #[test]
    fn parent_random_pool_draws_from_other_modifiers() {
        let toml = r#"
            [game]
            name = "Test Game"

            [[commands]]
            name = "jump"
            input = "X"

            [[modifiers]]
            name = "invert-jump"
            kind = "invert"
            applies_to = ["jump"]

            [[modifiers]]
            name = "scale-jump"
            kind = "scaling"
            applies_to = ["jump"]
            amplitude = 2.0

            [[modifiers]]
            name = "combo"
            kind = "parent"
            random = true
            value = 1
        "#;
        let path = write_temp(toml);
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = crate::engine::Engine::new(signals.clone(), 3, 10_000_000);

        let (_meta, errors) = load_game(&path.0, signals, &engine).unwrap();
        assert!(errors.is_empty());
        assert!(engine.has_modifier("combo"));
    }

    #[test]
    fn parent_fixed_children_resolve_by_name() {
        let toml = r#"
            [game]
            name = "Test Game"

            [[commands]]
            name = "jump"
            input = "X"

            [[modifiers]]
            name = "invert-jump"
            kind = "invert"
            applies_to = ["jump"]

            [[modifiers]]
            name = "combo"
            kind = "parent"
            children = ["invert-jump"]
        "#;
        let path = write_temp(toml);
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = crate::engine::Engine::new(signals.clone(), 3, 10_000_000);

        let (_meta, errors) = load_game(&path.0, signals, &engine).unwrap();
        assert!(errors.is_empty());
        assert!(engine.has_modifier("combo"));
    }

    #[test]
    fn parent_unknown_child_name_is_reported() {
        let toml = r#"
            [game]
            name = "Test Game"

            [[modifiers]]
            name = "combo"
            kind = "parent"
            children = ["does-not-exist"]
        "#;
        let path = write_temp(toml);
        let signals = std::sync::Arc::new(SignalTable::new());
        let engine = crate::engine::Engine::new(signals.clone(), 3, 10_000_000);

        let (_meta, errors) = load_game(&path.0, signals, &engine).unwrap();
        assert_eq!(errors.count(), 1);
    }
}
