use std::{sync::Arc, time::Duration};

use shared::domain::{Invocation, SkillMethod, Verb};
use tracing::{debug, error, info, warn};

use crate::{
    channel::{SendOutcome, SkillChannel},
    error::DispatchError,
    link::DeviceLink,
};

pub const NOT_READY_MESSAGE: &str = "Skillbridge is not ready for a method, reason unknown.";
pub const DISPENSED_MESSAGE: &str = "Product Dispensed";
pub const DEFAULT_DEMO_DELAY: Duration = Duration::from_secs(3);

/// Turns method invocations into verb calls on the device's skill bridge and
/// reports the outcome as text.
#[derive(Clone)]
pub struct DeviceMethodDispatcher {
    link: Arc<DeviceLink>,
    demo_delay: Duration,
}

impl DeviceMethodDispatcher {
    pub fn new(link: Arc<DeviceLink>) -> Self {
        Self {
            link,
            demo_delay: DEFAULT_DEMO_DELAY,
        }
    }

    pub fn with_demo_delay(mut self, demo_delay: Duration) -> Self {
        self.demo_delay = demo_delay;
        self
    }

    pub fn link(&self) -> &Arc<DeviceLink> {
        &self.link
    }

    pub async fn dispatch(&self, invocation: &Invocation) -> Result<String, DispatchError> {
        info!(
            device = %self.link.name(),
            skill = %invocation.skill,
            method = %invocation.method,
            "method called"
        );
        let method = SkillMethod::from_name(&invocation.method);

        let Some(channel) = self.link.channel().await else {
            if method == Some(SkillMethod::DispenseMaterial) {
                tokio::time::sleep(self.demo_delay).await;
                return Ok(DISPENSED_MESSAGE.to_string());
            }
            warn!(
                device = %self.link.name(),
                method = %invocation.method,
                "skill bridge is not ready or the method is invalid"
            );
            return Ok(NOT_READY_MESSAGE.to_string());
        };

        match method {
            Some(SkillMethod::Verb(verb)) => Ok(self.send(&channel, verb, invocation).await),
            Some(SkillMethod::ReportCapabilities) => {
                debug!(method = %invocation.method, "unimplemented method called");
                Ok("Unimplemented Method called : ReportCapabilities".to_string())
            }
            Some(SkillMethod::ToggleSensorReporting) => {
                debug!(method = %invocation.method, "unimplemented method called");
                Ok("Unimplemented method called: ToggleSensorReporting".to_string())
            }
            Some(SkillMethod::DispenseMaterial) | None => Err(DispatchError::UnknownMethod {
                skill: invocation.skill.clone(),
                method: invocation.method.clone(),
            }),
        }
    }

    async fn send(&self, channel: &SkillChannel, verb: Verb, invocation: &Invocation) -> String {
        let method = verb.method_name();
        match channel
            .send_verb(verb, &invocation.skill, &invocation.parameter)
            .await
        {
            Ok(SendOutcome::Completed) => format!(
                "{} command {} sent with input arguments: {}",
                invocation.skill, method, invocation.parameter
            ),
            Ok(SendOutcome::Rejected { .. }) => {
                format!("Failed to send command: {method} due to an invalid state.")
            }
            Err(err) => {
                error!(skill = %invocation.skill, %verb, error = %err, "method error");
                format!("{method} method error: {err}")
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
