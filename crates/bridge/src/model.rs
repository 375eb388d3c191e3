use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use shared::{domain::SkillState, protocol::SkillSummary};

/// Access to the skill state properties of a device's model.
///
/// States are kept as the raw strings the controller reported; interpretation
/// happens at the gate.
pub trait DeviceModel: Send + Sync {
    fn skill_names(&self) -> Vec<String>;
    fn skill_state(&self, skill: &str) -> Option<String>;
    /// Returns `false` when the skill is not part of the model.
    fn set_skill_state(&self, skill: &str, state: &str) -> bool;

    fn summaries(&self) -> Vec<SkillSummary> {
        self.skill_names()
            .into_iter()
            .filter_map(|name| {
                let state = self.skill_state(&name)?;
                Some(SkillSummary { name, state })
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDeviceModel {
    skills: RwLock<BTreeMap<String, String>>,
}

impl InMemoryDeviceModel {
    /// Every skill starts out `Ready`.
    pub fn with_skills<I, S>(skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let skills = skills
            .into_iter()
            .map(|name| (name.into(), SkillState::Ready.as_str().to_string()))
            .collect();
        Self {
            skills: RwLock::new(skills),
        }
    }
}

impl DeviceModel for InMemoryDeviceModel {
    fn skill_names(&self) -> Vec<String> {
        self.skills
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn skill_state(&self, skill: &str) -> Option<String> {
        self.skills
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(skill)
            .cloned()
    }

    fn set_skill_state(&self, skill: &str, state: &str) -> bool {
        let mut skills = self.skills.write().unwrap_or_else(PoisonError::into_inner);
        match skills.get_mut(skill) {
            Some(current) => {
                *current = state.to_string();
                true
            }
            None => false,
        }
    }
}
