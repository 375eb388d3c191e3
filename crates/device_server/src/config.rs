use std::{path::Path, time::Duration};

use ::config::{Config, Environment, File};
use anyhow::Context;
use serde::Deserialize;

const SETTINGS_FILE: &str = "device_server.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http_bind: String,
    pub bridge_bind: String,
    pub device_name: String,
    pub skills: Vec<String>,
    pub call_timeout_ms: u64,
    pub demo_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_bind: "127.0.0.1:8080".into(),
            bridge_bind: "127.0.0.1:5000".into(),
            device_name: "device0".into(),
            skills: vec!["Belt1".into()],
            call_timeout_ms: 30_000,
            demo_delay_ms: 3_000,
        }
    }
}

impl Settings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn demo_delay(&self) -> Duration {
        Duration::from_millis(self.demo_delay_ms)
    }
}

/// Defaults, then `device_server.toml` if present, then `APP__*` variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(SETTINGS_FILE), environment())
}

fn environment() -> Environment {
    Environment::with_prefix("APP")
        .prefix_separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("skills")
}

fn load_settings_from(file: &Path, env: Environment) -> anyhow::Result<Settings> {
    let settings: Settings = Config::builder()
        .add_source(File::from(file).required(false))
        .add_source(env)
        .build()
        .with_context(|| format!("failed to read settings from '{}'", file.display()))?
        .try_deserialize()
        .context("invalid device server settings")?;

    anyhow::ensure!(!settings.skills.is_empty(), "at least one skill must be configured");
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
