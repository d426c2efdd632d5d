//! Controllable devices and where the list of them comes from.
//!
//! The pipeline only ever sees an immutable snapshot of [`DeviceRecord`]s.
//! A [`DeviceRegistry`] produces such snapshots: [`SnapshotRegistry`] from a
//! JSON file, [`crate::hub::HubClient`] from a live Home Assistant instance.

pub mod extract;
pub mod resolve;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

pub use extract::DeviceNameExtractor;
pub use resolve::{DEFAULT_MATCH_THRESHOLD, DeviceResolver, MatchScores, MatchSignal, Resolution};

/// Device domains the assistant can control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDomain {
    Light,
    Switch,
}

impl DeviceDomain {
    pub const ALL: [DeviceDomain; 2] = [DeviceDomain::Light, DeviceDomain::Switch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Switch => "switch",
        }
    }

    /// Parse a hub domain name; `None` for unsupported domains.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "light" => Some(Self::Light),
            "switch" => Some(Self::Switch),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional features of a light, derived from its supported color modes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub can_set_brightness: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub can_set_color_temp: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_temp_kelvin: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_temp_kelvin: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub can_set_color: bool,
}

impl Capabilities {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One controllable device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Human-readable name; the string utterances are matched against.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(alias = "type")]
    pub domain: DeviceDomain,
    /// Services the hub offers for this device's domain.
    #[serde(default)]
    pub actions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

impl DeviceRecord {
    pub fn new(name: impl Into<String>, domain: DeviceDomain) -> Self {
        Self {
            name: name.into(),
            entity_id: None,
            domain,
            actions: BTreeSet::new(),
            capabilities: None,
        }
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }
}

/// Source of device snapshots.
pub trait DeviceRegistry {
    /// The current device list, in a stable order.
    fn snapshot(&self) -> RegistryResult<Vec<DeviceRecord>>;
}

/// Registry backed by a JSON array of device records on disk.
///
/// The file is re-read on every snapshot, so edits take effect immediately.
#[derive(Debug, Clone)]
pub struct SnapshotRegistry {
    path: PathBuf,
}

impl SnapshotRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `devices` as pretty-printed JSON, creating parent directories.
    pub fn save(&self, devices: &[DeviceRecord]) -> RegistryResult<()> {
        let json = serde_json::to_string_pretty(devices).map_err(|e| RegistryError::SnapshotParse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        let write_err = |source| RegistryError::SnapshotWrite {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        std::fs::write(&self.path, json).map_err(write_err)
    }
}

impl DeviceRegistry for SnapshotRegistry {
    fn snapshot(&self) -> RegistryResult<Vec<DeviceRecord>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| RegistryError::SnapshotRead {
            path: self.path.display().to_string(),
            source,
        })?;
        let devices: Vec<DeviceRecord> =
            serde_json::from_str(&raw).map_err(|e| RegistryError::SnapshotParse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(path = %self.path.display(), devices = devices.len(), "device snapshot read");
        Ok(devices)
    }
}

/// A fixed, in-memory device list.
impl DeviceRegistry for Vec<DeviceRecord> {
    fn snapshot(&self) -> RegistryResult<Vec<DeviceRecord>> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_type_field_is_accepted() {
        let json = r#"[
            {"name": "Deckenlampe", "entity_id": "light.deckenlampe", "type": "light",
             "actions": ["turn_on", "turn_off"],
             "capabilities": {"can_set_brightness": true}},
            {"name": "Fernseher Steckdose", "domain": "switch"}
        ]"#;
        let devices: Vec<DeviceRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(devices[0].domain, DeviceDomain::Light);
        assert!(devices[0].actions.contains("turn_off"));
        assert!(devices[0].capabilities.as_ref().unwrap().can_set_brightness);
        assert_eq!(devices[1].domain, DeviceDomain::Switch);
        assert_eq!(devices[1].entity_id, None);
        assert!(devices[1].actions.is_empty());
    }

    #[test]
    fn unsupported_domain_is_rejected() {
        let json = r#"[{"name": "Thermostat", "domain": "climate"}]"#;
        assert!(serde_json::from_str::<Vec<DeviceRecord>>(json).is_err());
    }

    #[test]
    fn snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SnapshotRegistry::new(dir.path().join("devices").join("deviceList.json"));
        let devices = vec![
            DeviceRecord::new("Standlampe", DeviceDomain::Light)
                .with_entity_id("light.standlampe")
                .with_actions(["turn_on", "turn_off", "toggle"]),
            DeviceRecord::new("Playstation_Steckdose", DeviceDomain::Switch),
        ];
        registry.save(&devices).unwrap();
        assert_eq!(registry.snapshot().unwrap(), devices);
    }

    #[test]
    fn missing_snapshot_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SnapshotRegistry::new(dir.path().join("absent.json"));
        assert!(matches!(
            registry.snapshot(),
            Err(RegistryError::SnapshotRead { .. })
        ));
    }

    #[test]
    fn malformed_snapshot_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deviceList.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SnapshotRegistry::new(&path).snapshot(),
            Err(RegistryError::SnapshotParse { .. })
        ));
    }
}
