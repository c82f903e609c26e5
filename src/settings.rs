use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::db::Unit;
use crate::decode::preprocess::PreprocessOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecoderSettings {
    pub strategy_timeout_secs: u64,
    pub preprocess: PreprocessOptions,
}

impl DecoderSettings {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs.max(1))
    }
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            strategy_timeout_secs: 20,
            preprocess: PreprocessOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisionSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key, never the key.
    pub api_key_env: String,
    pub max_tokens: u32,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.anthropic.com/v1/messages".into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            max_tokens: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UserSettings {
    decoder: DecoderSettings,
    vision: VisionSettings,
    default_unit: Unit,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn decoder(&self) -> DecoderSettings {
        self.read().decoder.clone()
    }

    pub fn vision(&self) -> VisionSettings {
        self.read().vision.clone()
    }

    pub fn default_unit(&self) -> Unit {
        self.read().default_unit
    }

    pub fn update_vision(&self, settings: VisionSettings) -> Result<()> {
        let mut guard = self.write();
        guard.vision = settings;
        self.persist(&guard)
    }

    pub fn update_default_unit(&self, unit: Unit) -> Result<()> {
        let mut guard = self.write();
        guard.default_unit = unit;
        self.persist(&guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
