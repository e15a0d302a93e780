use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const ENV_API_BASE_URL: &str = "CALLSIGHT_API_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "CALLSIGHT_REQUEST_TIMEOUT_MS";
pub const ENV_SIMULATION_STEP_MS: &str = "CALLSIGHT_SIMULATION_STEP_MS";
pub const ENV_PLAYBACK: &str = "CALLSIGHT_PLAYBACK";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    #[default]
    Device,
    Virtual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallsightSettings {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub simulation_step_ms: u64,
    pub playback: PlaybackMode,
}

impl Default for CallsightSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: 30_000,
            simulation_step_ms: 200,
            playback: PlaybackMode::Device,
        }
    }
}

impl CallsightSettings {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_API_BASE_URL) {
            if !value.trim().is_empty() {
                self.api_base_url = value.trim().to_string();
            }
        }
        if let Ok(value) = std::env::var(ENV_REQUEST_TIMEOUT_MS) {
            if let Ok(ms) = value.trim().parse::<u64>() {
                self.request_timeout_ms = ms;
            }
        }
        if let Ok(value) = std::env::var(ENV_SIMULATION_STEP_MS) {
            if let Ok(ms) = value.trim().parse::<u64>() {
                self.simulation_step_ms = ms;
            }
        }
        if let Ok(value) = std::env::var(ENV_PLAYBACK) {
            match value.trim().to_ascii_lowercase().as_str() {
                "device" => self.playback = PlaybackMode::Device,
                "virtual" => self.playback = PlaybackMode::Virtual,
                _ => {}
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Read(std::io::Error),
    #[error("failed to write settings file: {0}")]
    Write(std::io::Error),
    #[error("failed to parse settings JSON: {0}")]
    Parse(serde_json::Error),
    #[error("cannot resolve app data directory")]
    AppData,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new() -> Result<Self, SettingsError> {
        let proj_dirs =
            ProjectDirs::from("com", "callsight", "core").ok_or(SettingsError::AppData)?;
        let path = proj_dirs.config_dir().join("settings.json");
        Ok(Self { path })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<CallsightSettings, SettingsError> {
        if !self.path.exists() {
            return Ok(CallsightSettings::default());
        }
        let raw = fs::read_to_string(&self.path).map_err(SettingsError::Read)?;
        serde_json::from_str(&raw).map_err(SettingsError::Parse)
    }

    pub fn save(&self, settings: &CallsightSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Write)?;
        }
        let raw = serde_json::to_string_pretty(settings).map_err(SettingsError::Parse)?;
        fs::write(&self.path, raw).map_err(SettingsError::Write)?;
        Ok(())
    }
}
