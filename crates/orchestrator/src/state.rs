use std::collections::BTreeMap;

use serde::Serialize;
use shared::domain::{CallResult, DeviceId, Verb};

pub const INITIAL_CONTROL_STATE: i64 = 1;
pub const MAX_CONTROL_STATE: i64 = 5;
pub const INITIAL_DEVICE_STATE: i64 = 1;
/// Recipe value meaning no recipe has been claimed yet.
pub const NO_RECIPE: &str = "none";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkillObservation {
    pub state: Option<String>,
    pub last_call: Option<(Verb, CallResult)>,
}

/// Everything the control loop decides on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerState {
    pub current_state: i64,
    pub current_recipe: String,
    pub device_states: BTreeMap<DeviceId, i64>,
    pub observed_skills: BTreeMap<DeviceId, BTreeMap<String, SkillObservation>>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            current_state: INITIAL_CONTROL_STATE,
            current_recipe: NO_RECIPE.to_string(),
            device_states: BTreeMap::new(),
            observed_skills: BTreeMap::new(),
        }
    }
}

impl ControllerState {
    /// Returns `false` and leaves the state alone when `target` is out of range.
    pub fn change_control_state(&mut self, target: i64) -> bool {
        if !(INITIAL_CONTROL_STATE..=MAX_CONTROL_STATE).contains(&target) {
            return false;
        }
        self.current_state = target;
        true
    }

    /// The first recipe claimed wins; later claims return `false`.
    pub fn claim_recipe(&mut self, name: &str) -> bool {
        if self.current_recipe != NO_RECIPE {
            return false;
        }
        self.current_recipe = name.to_string();
        true
    }

    pub fn active_recipe(&self) -> Option<&str> {
        (self.current_recipe != NO_RECIPE).then_some(self.current_recipe.as_str())
    }

    /// Registering an already known device keeps its sub-state.
    pub fn register_device(&mut self, device: DeviceId) -> bool {
        if self.device_states.contains_key(&device) {
            return false;
        }
        self.device_states.insert(device, INITIAL_DEVICE_STATE);
        true
    }

    pub fn observe_state(&mut self, device: DeviceId, skill: &str, state: &str) {
        self.observation(device, skill).state = Some(state.to_string());
    }

    pub fn observe_call(&mut self, device: DeviceId, skill: &str, verb: Verb, result: CallResult) {
        self.observation(device, skill).last_call = Some((verb, result));
    }

    fn observation(&mut self, device: DeviceId, skill: &str) -> &mut SkillObservation {
        self.observed_skills
            .entry(device)
            .or_default()
            .entry(skill.to_string())
            .or_default()
    }
}
