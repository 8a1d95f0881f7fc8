use std::{fs, io, path::Path};

use anyhow::Context;
use serde::Deserialize;
use tab_mirror::DEFAULT_EVENT_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_filter: String,
    pub event_capacity: usize,
    pub stop_on_violation: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            stop_on_violation: false,
        }
    }
}

/// Defaults, then the TOML file at `path` if it exists, then the environment.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Settings>(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    };
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("MIRROR_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    for key in ["MIRROR_EVENT_CAPACITY", "APP__EVENT_CAPACITY"] {
        if let Some(parsed) = lookup(key).and_then(|v| v.parse::<usize>().ok()) {
            settings.event_capacity = parsed;
        }
    }

    for key in ["MIRROR_STOP_ON_VIOLATION", "APP__STOP_ON_VIOLATION"] {
        if let Some(parsed) = lookup(key).and_then(|v| parse_flag(&v)) {
            settings.stop_on_violation = parsed;
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
