//! Threshold version registry
//!
//! Named snapshots of a full threshold config, persisted as a JSON file.
//! At most one version is active; the active snapshot is the override set
//! applied when a request supplies none of its own.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::interpretation_core::{ThresholdConfig, ThresholdOverrides};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdVersion {
    pub id: String,
    pub name: String,
    pub values: ThresholdConfig,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRegistry {
    #[serde(default)]
    pub versions: Vec<ThresholdVersion>,
    #[serde(default)]
    pub active_version_id: Option<String>,
}

impl VersionRegistry {
    /// Load from disk; a missing file is an empty registry
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read version registry {}", path.display()))?;
        let registry: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed version registry {}", path.display()))?;
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write version registry {}", path.display()))?;
        Ok(())
    }

    /// Store a full snapshot and make it active
    pub fn create_version(&mut self, values: ThresholdConfig, name: Option<&str>) -> &ThresholdVersion {
        let n = self.versions.len() + 1;
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Version {}", n),
        };
        let version = ThresholdVersion {
            id: format!("v{}", n),
            name,
            values,
            created_at: Utc::now(),
        };
        info!("Created threshold version {} ({})", version.id, version.name);
        self.active_version_id = Some(version.id.clone());
        self.versions.push(version);
        &self.versions[n - 1]
    }

    /// Activate a version by id, or return to defaults with `None`
    pub fn set_active(&mut self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => {
                if self.get(id).is_none() {
                    bail!("Unknown threshold version: {}", id);
                }
                self.active_version_id = Some(id.to_string());
            }
            None => self.active_version_id = None,
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ThresholdVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn active(&self) -> Option<&ThresholdVersion> {
        self.active_version_id.as_deref().and_then(|id| self.get(id))
    }

    /// The active snapshot as a complete override set
    pub fn active_overrides(&self) -> Option<ThresholdOverrides> {
        self.active().map(|v| v.values.to_overrides())
    }

    /// Request overrides win; otherwise the active version; otherwise defaults
    pub fn resolve(&self, request: Option<&ThresholdOverrides>) -> ThresholdConfig {
        match request {
            Some(overrides) if !overrides.is_empty() => ThresholdConfig::resolve(Some(overrides)),
            _ => ThresholdConfig::resolve(self.active_overrides().as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpretation_core::ThresholdKey;

    #[test]
    fn test_create_version_assigns_ids_and_activates() {
        let mut registry = VersionRegistry::default();
        let first = registry.create_version(ThresholdConfig::default(), None).clone();
        assert_eq!(first.id, "v1");
        assert_eq!(first.name, "Version 1");

        let tuned = ThresholdConfig {
            alignment_strong: 0.6,
            ..Default::default()
        };
        let second = registry.create_version(tuned, Some("Looser strong")).clone();
        assert_eq!(second.id, "v2");
        assert_eq!(second.name, "Looser strong");
        assert_eq!(registry.active_version_id.as_deref(), Some("v2"));
        assert_eq!(registry.resolve(None).alignment_strong, 0.6);
    }

    #[test]
    fn test_set_active_rejects_unknown_id() {
        let mut registry = VersionRegistry::default();
        registry.create_version(ThresholdConfig::default(), None);
        assert!(registry.set_active(Some("v9")).is_err());
        assert_eq!(registry.active_version_id.as_deref(), Some("v1"));

        registry.set_active(None).unwrap();
        assert!(registry.active_overrides().is_none());
        assert_eq!(registry.resolve(None), ThresholdConfig::default());
    }

    #[test]
    fn test_request_overrides_beat_active_version() {
        let mut registry = VersionRegistry::default();
        registry.create_version(
            ThresholdConfig {
                alignment_strong: 0.6,
                conf_high_stack: 0.5,
                ..Default::default()
            },
            None,
        );
        let request = ThresholdOverrides::new().with(ThresholdKey::AlignmentStrong, 0.9);
        let config = registry.resolve(Some(&request));
        assert_eq!(config.alignment_strong, 0.9);
        // Request overrides are merged over defaults, not over the active version
        assert_eq!(config.conf_high_stack, 0.7);

        let empty = ThresholdOverrides::new();
        assert_eq!(registry.resolve(Some(&empty)).conf_high_stack, 0.5);
    }

    #[test]
    fn test_registry_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry").join("thresholds.json");

        let missing = VersionRegistry::load(&path).unwrap();
        assert!(missing.versions.is_empty());

        let mut registry = VersionRegistry::default();
        registry.create_version(ThresholdConfig::default(), Some("Baseline"));
        registry.save(&path).unwrap();

        let loaded = VersionRegistry::load(&path).unwrap();
        assert_eq!(loaded, registry);
    }

    #[test]
    fn test_malformed_registry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(VersionRegistry::load(&path).is_err());
    }
}
