//! Per-device transition rules keyed by controller state and device sub-state.
//!
//! A table file is TOML with one `[[rule]]` per transition:
//!
//! ```toml
//! [[rule]]
//! controller_state = 2
//! device_state = 1
//! next_device_state = 2
//! device = 0
//! invoke = { skill = "Belt1", method = "Start", parameter = "fast" }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use shared::domain::{DeviceId, Invocation};
use thiserror::Error;

use crate::state::{ControllerState, INITIAL_CONTROL_STATE, MAX_CONTROL_STATE};

#[derive(Debug, Error)]
pub enum TransitionTableError {
    #[error("failed to read transition table {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid transition table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rule {index}: controller state {state} is outside 1..=5")]
    ControllerStateOutOfRange { index: usize, state: i64 },
    #[error("rule {index}: a rule that keeps the device in state {state} cannot invoke a method")]
    RepeatingInvocation { index: usize, state: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvocationTemplate {
    pub skill: String,
    pub method: String,
    #[serde(default)]
    pub parameter: String,
}

impl InvocationTemplate {
    pub fn to_invocation(&self) -> Invocation {
        Invocation::new(&self.skill, &self.method, &self.parameter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransitionRule {
    pub controller_state: i64,
    pub device_state: i64,
    pub next_device_state: i64,
    /// Restricts the rule to one device.
    #[serde(default)]
    pub device: Option<DeviceId>,
    /// Restricts the rule to an active recipe.
    #[serde(default)]
    pub recipe: Option<String>,
    #[serde(default)]
    pub invoke: Option<InvocationTemplate>,
}

impl TransitionRule {
    fn matches(&self, controller: &ControllerState, device: DeviceId, device_state: i64) -> bool {
        self.controller_state == controller.current_state
            && self.device_state == device_state
            && self.device.map_or(true, |only| only == device)
            && self
                .recipe
                .as_deref()
                .map_or(true, |recipe| controller.active_recipe() == Some(recipe))
    }
}

#[derive(Debug, Deserialize)]
struct TableFile {
    #[serde(default, rename = "rule")]
    rules: Vec<TransitionRule>,
}

/// An empty table leaves every device where it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    rules: Vec<TransitionRule>,
}

impl TransitionTable {
    pub fn new(rules: Vec<TransitionRule>) -> Result<Self, TransitionTableError> {
        for (index, rule) in rules.iter().enumerate() {
            if !(INITIAL_CONTROL_STATE..=MAX_CONTROL_STATE).contains(&rule.controller_state) {
                return Err(TransitionTableError::ControllerStateOutOfRange {
                    index,
                    state: rule.controller_state,
                });
            }
            // Rules are evaluated on every loop iteration.
            if rule.invoke.is_some() && rule.device_state == rule.next_device_state {
                return Err(TransitionTableError::RepeatingInvocation {
                    index,
                    state: rule.device_state,
                });
            }
        }
        Ok(Self { rules })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, TransitionTableError> {
        let file: TableFile = toml::from_str(raw)?;
        Self::new(file.rules)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TransitionTableError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TransitionTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule that applies to `device` in its current sub-state.
    pub fn evaluate(
        &self,
        controller: &ControllerState,
        device: DeviceId,
        device_state: i64,
    ) -> Option<&TransitionRule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(controller, device, device_state))
    }
}

#[cfg(test)]
#[path = "tests/fsm_tests.rs"]
mod tests;
