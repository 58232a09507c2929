//! JSON configuration collaborator: account identity and target-app
//! settings. The engine treats the composed identity as opaque input to
//! the sign-in procedure.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AutomationError;

const DEFAULT_IDENTITY_SUFFIX: &str = "126.com";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub identity_prefix: String,
    pub identity_suffix: String,
    /// Rolls forward after each consumed account so the next sign-in uses a
    /// fresh identity.
    pub identity_index: u32,
    pub disable_auto_update: bool,
    pub app_exe_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            identity_prefix: String::new(),
            identity_suffix: DEFAULT_IDENTITY_SUFFIX.to_string(),
            identity_index: 1,
            disable_auto_update: true,
            app_exe_path: None,
        }
    }
}

impl Settings {
    /// Full account identity, `{prefix}{index}@{suffix}`, or `None` when no
    /// prefix has been configured yet.
    pub fn identity(&self) -> Option<String> {
        if self.identity_prefix.trim().is_empty() {
            return None;
        }
        let suffix = if self.identity_suffix.is_empty() {
            DEFAULT_IDENTITY_SUFFIX
        } else {
            &self.identity_suffix
        };
        Some(format!(
            "{}{}@{}",
            self.identity_prefix, self.identity_index, suffix
        ))
    }
}

/// Loads and persists [`Settings`] as a small JSON document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is not an error; it yields defaults so first-run
    /// works before anything was saved.
    pub fn load(&self) -> Result<Settings, AutomationError> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            AutomationError::ConfigError(format!("read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AutomationError::ConfigError(format!("parse {}: {e}", self.path.display()))
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<(), AutomationError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AutomationError::ConfigError(format!("create {}: {e}", parent.display()))
            })?;
        }
        let raw = serde_json::to_string_pretty(settings)
            .map_err(|e| AutomationError::ConfigError(format!("serialize settings: {e}")))?;
        std::fs::write(&self.path, raw).map_err(|e| {
            AutomationError::ConfigError(format!("write {}: {e}", self.path.display()))
        })?;
        info!("settings saved to {}", self.path.display());
        Ok(())
    }

    /// Advance the identity index and persist.
    pub fn increment_identity_index(&self) -> Result<u32, AutomationError> {
        let mut settings = self.load()?;
        settings.identity_index += 1;
        self.save(&settings)?;
        Ok(settings.identity_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.json"));
        let settings = store.load().unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.identity().is_none());
    }

    #[test]
    fn identity_composes_prefix_index_and_suffix() {
        let settings = Settings {
            identity_prefix: "pilot".to_string(),
            identity_index: 4,
            ..Settings::default()
        };
        assert_eq!(settings.identity().unwrap(), "pilot4@126.com");
    }

    #[test]
    fn save_load_round_trip_and_index_increment() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("settings.json"));
        let settings = Settings {
            identity_prefix: "pilot".to_string(),
            app_exe_path: Some(PathBuf::from("C:/apps/editor.exe")),
            ..Settings::default()
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);

        assert_eq!(store.increment_identity_index().unwrap(), 2);
        assert_eq!(store.load().unwrap().identity().unwrap(), "pilot2@126.com");
    }

    #[test]
    fn unparseable_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ConfigStore::new(path).load().unwrap_err();
        assert!(matches!(err, AutomationError::ConfigError(_)));
    }
}
