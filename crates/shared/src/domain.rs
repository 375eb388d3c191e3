use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(DeviceId);

/// Lifecycle state of a single skill as reported by its controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillState {
    Ready,
    Executing,
    Suspended,
    Stopped,
}

impl SkillState {
    pub const ALL: [SkillState; 4] = [
        SkillState::Ready,
        SkillState::Executing,
        SkillState::Suspended,
        SkillState::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillState::Ready => "Ready",
            SkillState::Executing => "Executing",
            SkillState::Suspended => "Suspended",
            SkillState::Stopped => "Stopped",
        }
    }

    /// Exact match only: "NotReady" or "Executing2" are not states.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == raw)
    }
}

impl fmt::Display for SkillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Start,
    Stop,
    Suspend,
    Resume,
    Reset,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::Start, Verb::Stop, Verb::Suspend, Verb::Resume, Verb::Reset];

    /// Name used on the bridge wire, e.g. `START`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Verb::Start => "START",
            Verb::Stop => "STOP",
            Verb::Suspend => "SUSPEND",
            Verb::Resume => "RESUME",
            Verb::Reset => "RESET",
        }
    }

    /// Name used for invocable methods, e.g. `Start`.
    pub fn method_name(&self) -> &'static str {
        match self {
            Verb::Start => "Start",
            Verb::Stop => "Stop",
            Verb::Suspend => "Suspend",
            Verb::Resume => "Resume",
            Verb::Reset => "Reset",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|verb| verb.wire_name() == raw)
    }

    pub fn from_method_name(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|verb| verb.method_name() == raw)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallResult {
    Ok,
    Failed,
}

impl CallResult {
    pub fn wire_name(&self) -> &'static str {
        match self {
            CallResult::Ok => "OK",
            CallResult::Failed => "FAILED",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "OK" => Some(CallResult::Ok),
            "FAILED" => Some(CallResult::Failed),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CallResult::Ok)
    }
}

impl fmt::Display for CallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Every method a skill exposes to invokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkillMethod {
    Verb(Verb),
    ReportCapabilities,
    ToggleSensorReporting,
    /// Canned demo method that works without a connected controller.
    DispenseMaterial,
}

impl SkillMethod {
    pub fn from_name(raw: &str) -> Option<Self> {
        if let Some(verb) = Verb::from_method_name(raw) {
            return Some(SkillMethod::Verb(verb));
        }
        match raw {
            "ReportCapabilities" => Some(SkillMethod::ReportCapabilities),
            "ToggleSensorReporting" => Some(SkillMethod::ToggleSensorReporting),
            "DispenseMaterial" => Some(SkillMethod::DispenseMaterial),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SkillMethod::Verb(verb) => verb.method_name(),
            SkillMethod::ReportCapabilities => "ReportCapabilities",
            SkillMethod::ToggleSensorReporting => "ToggleSensorReporting",
            SkillMethod::DispenseMaterial => "DispenseMaterial",
        }
    }
}

impl fmt::Display for SkillMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single method call addressed to a skill, with its one string argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub skill: String,
    pub method: String,
    #[serde(default)]
    pub parameter: String,
}

impl Invocation {
    pub fn new(
        skill: impl Into<String>,
        method: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        Self {
            skill: skill.into(),
            method: method.into(),
            parameter: parameter.into(),
        }
    }

    /// Builds an invocation from a `<Skill>_<Method>` browse name.
    pub fn from_browse_name(browse_name: &str, parameter: impl Into<String>) -> Option<Self> {
        let (skill, method) = browse_name.split_once('_')?;
        if skill.is_empty() || method.is_empty() {
            return None;
        }
        Some(Self::new(skill, method, parameter))
    }

    pub fn browse_name(&self) -> String {
        format!("{}_{}", self.skill, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_state_parse_is_exact() {
        assert_eq!(SkillState::parse("Ready"), Some(SkillState::Ready));
        assert_eq!(SkillState::parse("Suspended"), Some(SkillState::Suspended));
        assert_eq!(SkillState::parse("NotReady"), None);
        assert_eq!(SkillState::parse("ready"), None);
        assert_eq!(SkillState::parse("Executing "), None);
    }

    #[test]
    fn verb_names_map_both_ways() {
        for verb in Verb::ALL {
            assert_eq!(Verb::from_wire(verb.wire_name()), Some(verb));
            assert_eq!(Verb::from_method_name(verb.method_name()), Some(verb));
        }
        assert_eq!(Verb::from_wire("Start"), None);
        assert_eq!(Verb::from_method_name("START"), None);
    }

    #[test]
    fn skill_method_covers_non_verb_methods() {
        assert_eq!(
            SkillMethod::from_name("Suspend"),
            Some(SkillMethod::Verb(Verb::Suspend))
        );
        assert_eq!(
            SkillMethod::from_name("ToggleSensorReporting"),
            Some(SkillMethod::ToggleSensorReporting)
        );
        assert_eq!(SkillMethod::from_name("Launch"), None);
    }

    #[test]
    fn invocation_from_browse_name_splits_at_first_underscore() {
        let invocation = Invocation::from_browse_name("Belt1_Start", "5").expect("invocation");
        assert_eq!(invocation, Invocation::new("Belt1", "Start", "5"));
        assert_eq!(invocation.browse_name(), "Belt1_Start");
        assert!(Invocation::from_browse_name("Belt1", "").is_none());
        assert!(Invocation::from_browse_name("_Start", "").is_none());
    }
}
