//! Config-time error taxonomy.
//!
//! Runtime drops are ordinary control flow (`Option`/`bool`, never an
//! `Err`); only configuration load errors are typed and counted here so the
//! engine can stay paused and report `can_unpause=false` instead of
//! aborting.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required key '{key}' in {section}")]
    MissingKey { section: String, key: String },

    #[error("unknown key '{key}' in {section}")]
    UnknownKey { section: String, key: String },

    #[error("unknown modifier kind '{kind}'")]
    UnknownModifierKind { kind: String },

    #[error("duplicate {what} name '{name}'")]
    DuplicateName { what: &'static str, name: String },

    #[error("unknown input '{name}' referenced in {section}")]
    UnknownInput { section: String, name: String },

    #[error("unknown command '{name}' referenced in {section}")]
    UnknownCommand { section: String, name: String },

    #[error("numeric value out of range for '{field}': {value}")]
    BadRange { field: String, value: String },

    #[error("remap target for '{from}' has unsupported cross-class destination '{to}' (accelerometer/gyroscope/touchpad targets are rejected)")]
    UnsupportedRemapClass { from: String, to: String },

    #[error("Distance/DistanceBelow threshold type requires exactly 2 inputs, got {got}")]
    BadDistanceArity { got: usize },

    #[error("non-positive delay_seconds: {0}")]
    NonPositiveDelay(f64),

    #[error("zero scale divisor for '{0}'")]
    ZeroScale(String),

    #[error("modifier declares both a fixed remap table and random_remap")]
    RemapAndRandomRemap,

    #[error("parent modifier '{name}' nests children too deeply (cyclic 'children' reference?)")]
    CyclicParentReference { name: String },
}

/// Accumulates config errors instead of failing the load fast.
#[derive(Debug, Default, Clone)]
pub struct ErrorLog {
    errors: Vec<ConfigError>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: ConfigError) {
        tracing::warn!("config error: {err}");
        self.errors.push(err);
    }

    pub fn count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_log_accumulates() {
        let mut log = ErrorLog::new();
        assert!(log.is_empty());
        log.push(ConfigError::NonPositiveDelay(0.0));
        log.push(ConfigError::ZeroScale("accel".into()));
        assert_eq!(log.count(), 2);
        assert!(!log.is_empty());
    }
}
