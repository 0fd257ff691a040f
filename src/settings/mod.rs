// src/settings/mod.rs
pub mod credentials;
pub mod io;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session_policy::SessionPolicyConfig;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
pub const ENV_API_URL: &str = "LABELGRID_API_URL";
pub const ENV_PAUSE_MS: &str = "LABELGRID_PAUSE_MS";
pub const ENV_TIMEOUT_SECS: &str = "LABELGRID_TIMEOUT_SECS";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(String),
    #[error("Settings file is malformed: {0}")]
    Parse(String),
    #[error("Keyring error: {0}")]
    Keyring(String),
}

impl From<std::io::Error> for SettingsError {
    fn from(err: std::io::Error) -> Self {
        SettingsError::Io(err.to_string())
    }
}

impl From<keyring::Error> for SettingsError {
    fn from(err: keyring::Error) -> Self {
        SettingsError::Keyring(err.to_string())
    }
}

#[derive(Resource, Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConsoleSettings {
    pub api_base_url: String,
    /// Pause between two images of a sequential run.
    pub inter_image_pause_ms: u64,
    pub request_timeout_secs: u64,
    /// Pre-filled in the upload panel.
    pub last_project_id: String,
    pub session_policy: SessionPolicyConfig,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            inter_image_pause_ms: 500,
            request_timeout_secs: 120,
            last_project_id: String::new(),
            session_policy: SessionPolicyConfig::default(),
        }
    }
}

impl ConsoleSettings {
    /// Settings file, then environment (including any `.env` already loaded).
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings: Self = io::load_settings_from_file()?;
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        io::save_settings_to_file(self)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(ms) = lookup(ENV_PAUSE_MS).and_then(|v| v.trim().parse().ok()) {
            self.inter_image_pause_ms = ms;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS).and_then(|v| v.trim().parse().ok()) {
            self.request_timeout_secs = secs;
        }
    }

    pub fn inter_image_pause(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.inter_image_pause_ms)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
