//! Identity-reset collaborator: regenerates the device/telemetry
//! identifiers the target application stores in its JSON state file.
//!
//! The engine only sequences this as one whole procedure; machine-level
//! GUID rewriting in OS configuration stays outside the core.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::errors::AutomationError;

const MACHINE_ID_PREFIX: &str = "auth0|user_";
const MACHINE_ID_MAX_LEN: usize = 64;

/// Freshly generated identifier set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySet {
    pub machine_id: String,
    pub mac_machine_id: String,
    pub dev_device_id: String,
    pub sqm_id: String,
}

impl IdentitySet {
    pub fn generate() -> Self {
        Self {
            machine_id: generate_machine_id(),
            mac_machine_id: Uuid::new_v4().to_string(),
            dev_device_id: Uuid::new_v4().to_string(),
            sqm_id: format!("{{{}}}", Uuid::new_v4().to_string().to_uppercase()),
        }
    }
}

/// Hex-encoded `auth0|user_` prefix followed by one UUID's worth of random
/// hex, capped at the longest id the target application accepts.
fn generate_machine_id() -> String {
    let prefix_hex: String = MACHINE_ID_PREFIX
        .as_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    let random_hex = Uuid::new_v4().simple().to_string();
    let remaining = MACHINE_ID_MAX_LEN - prefix_hex.len();
    format!("{prefix_hex}{}", &random_hex[..remaining.min(random_hex.len())])
}

/// Rewrites identity keys in the application's JSON state store, backing up
/// the previous file first.
#[derive(Debug, Clone)]
pub struct IdentityReset {
    storage_path: PathBuf,
    backup_dir: PathBuf,
}

impl IdentityReset {
    pub fn new(storage_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            backup_dir: backup_dir.into(),
        }
    }

    fn backup(&self) -> Result<Option<PathBuf>, AutomationError> {
        if !self.storage_path.exists() {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.backup_dir).map_err(|e| {
            AutomationError::ConfigError(format!("create {}: {e}", self.backup_dir.display()))
        })?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let backup_path = self.backup_dir.join(format!("storage.json.backup_{stamp}"));
        std::fs::copy(&self.storage_path, &backup_path).map_err(|e| {
            AutomationError::ConfigError(format!("backup to {}: {e}", backup_path.display()))
        })?;
        info!("state backed up to {}", backup_path.display());
        Ok(Some(backup_path))
    }

    /// Generate a fresh identity set and write it into the store. The store
    /// must already exist; a missing store means the target application has
    /// never run, which is a configuration defect.
    pub fn reset(&self) -> Result<IdentitySet, AutomationError> {
        if !self.storage_path.exists() {
            return Err(AutomationError::ConfigError(format!(
                "state file not found: {}",
                self.storage_path.display()
            )));
        }
        self.backup()?;

        let raw = std::fs::read_to_string(&self.storage_path).map_err(|e| {
            AutomationError::ConfigError(format!("read {}: {e}", self.storage_path.display()))
        })?;
        let mut state: BTreeMap<String, Value> = serde_json::from_str(&raw).map_err(|e| {
            AutomationError::ConfigError(format!("parse {}: {e}", self.storage_path.display()))
        })?;

        let ids = IdentitySet::generate();
        state.insert(
            "telemetry.machineId".to_string(),
            Value::String(ids.machine_id.clone()),
        );
        state.insert(
            "telemetry.macMachineId".to_string(),
            Value::String(ids.mac_machine_id.clone()),
        );
        state.insert(
            "telemetry.devDeviceId".to_string(),
            Value::String(ids.dev_device_id.clone()),
        );
        state.insert(
            "telemetry.sqmId".to_string(),
            Value::String(ids.sqm_id.clone()),
        );

        let raw = serde_json::to_string_pretty(&state)
            .map_err(|e| AutomationError::ConfigError(format!("serialize state: {e}")))?;
        std::fs::write(&self.storage_path, raw).map_err(|e| {
            AutomationError::ConfigError(format!("write {}: {e}", self.storage_path.display()))
        })?;
        info!("identity reset complete");
        Ok(ids)
    }
}

/// Replace the application's updater directory with a read-only marker file
/// so it can neither re-create the directory nor self-update.
pub fn block_auto_update(path: &Path) -> Result<(), AutomationError> {
    if path.is_dir() {
        std::fs::remove_dir_all(path).map_err(|e| {
            AutomationError::ConfigError(format!("remove {}: {e}", path.display()))
        })?;
    }
    if !path.exists() {
        std::fs::write(path, b"").map_err(|e| {
            AutomationError::ConfigError(format!("create {}: {e}", path.display()))
        })?;
    }
    let mut permissions = std::fs::metadata(path)
        .map_err(|e| AutomationError::ConfigError(format!("stat {}: {e}", path.display())))?
        .permissions();
    permissions.set_readonly(true);
    std::fs::set_permissions(path, permissions).map_err(|e| {
        AutomationError::ConfigError(format!("protect {}: {e}", path.display()))
    })?;
    info!("updater blocked at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_id_is_hex_prefix_plus_one_uuid_of_random_hex() {
        let id = generate_machine_id();
        let prefix_hex: String = MACHINE_ID_PREFIX
            .as_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        assert!(id.starts_with(&prefix_hex));
        // A simple-format UUID contributes exactly 32 hex chars.
        assert_eq!(id.len(), prefix_hex.len() + 32);
        assert!(id.len() <= MACHINE_ID_MAX_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sqm_id_is_braced_uppercase() {
        let ids = IdentitySet::generate();
        assert!(ids.sqm_id.starts_with('{') && ids.sqm_id.ends_with('}'));
        assert_eq!(ids.sqm_id, ids.sqm_id.to_uppercase());
    }

    #[test]
    fn reset_rewrites_ids_and_keeps_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join("storage.json");
        std::fs::write(
            &storage,
            r#"{"telemetry.machineId": "old", "window.zoomLevel": 2}"#,
        )
        .unwrap();

        let reset = IdentityReset::new(&storage, dir.path().join("backups"));
        let ids = reset.reset().unwrap();

        let state: BTreeMap<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(&storage).unwrap()).unwrap();
        assert_eq!(state["telemetry.machineId"], Value::String(ids.machine_id));
        assert_eq!(state["window.zoomLevel"], Value::from(2));
        assert!(state.contains_key("telemetry.devDeviceId"));

        // One timestamped backup of the original content.
        let backups: Vec<_> = std::fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn block_auto_update_replaces_the_directory_with_a_readonly_file() {
        let dir = tempfile::tempdir().unwrap();
        let updater = dir.path().join("app-updater");
        std::fs::create_dir(&updater).unwrap();
        std::fs::write(updater.join("pending"), b"update").unwrap();

        block_auto_update(&updater).unwrap();

        let meta = std::fs::metadata(&updater).unwrap();
        assert!(meta.is_file());
        assert!(meta.permissions().readonly());

        // Re-running against the existing marker is fine.
        block_auto_update(&updater).unwrap();
    }

    #[test]
    fn reset_without_state_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let reset = IdentityReset::new(dir.path().join("missing.json"), dir.path().join("b"));
        assert!(matches!(
            reset.reset().unwrap_err(),
            AutomationError::ConfigError(_)
        ));
    }
}
