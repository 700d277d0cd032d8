use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::timer::state::{DEFAULT_MINUTES, MAX_MINUTES, MIN_MINUTES};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const DATA_DIR_ENV: &str = "POMODORO_DATA_DIR";
pub const DEBUG_ENV: &str = "POMODORO_DEBUG";
pub const HISTORY_KEY: &str = "pomodoroHistory";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Duration the timer is armed with at startup.
    pub default_minutes: u32,
    pub tick_interval_ms: u64,
    pub storage: StorageBackend,
    pub history_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_minutes: DEFAULT_MINUTES,
            tick_interval_ms: 1000,
            storage: StorageBackend::default(),
            history_key: HISTORY_KEY.into(),
        }
    }
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    fn sanitized(mut self) -> Self {
        if !(MIN_MINUTES..=MAX_MINUTES).contains(&self.default_minutes) {
            log_warn!(
                "default_minutes {} outside {MIN_MINUTES}..={MAX_MINUTES}; using {DEFAULT_MINUTES}",
                self.default_minutes
            );
            self.default_minutes = DEFAULT_MINUTES;
        }
        if self.history_key.trim().is_empty() {
            self.history_key = HISTORY_KEY.into();
        }
        self
    }
}

/// Directory holding settings and stored history.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    ProjectDirs::from("", "", "pomodoro")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".pomodoro"))
}

pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<Settings>(&contents)
                .unwrap_or_else(|err| {
                    log_warn!("Ignoring unreadable settings at {}: {err}", path.display());
                    Settings::default()
                })
                .sanitized()
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Changes the startup duration. Takes effect on the next launch.
    pub fn update_default_minutes(&self, minutes: u32) -> Result<Settings> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = guard.clone();
        next.default_minutes = minutes;
        let next = next.sanitized();
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
