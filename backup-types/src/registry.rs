// SPDX-License-Identifier: GPL-3.0-only

//! Volume registry
//!
//! The registry is the in-memory form of the `backup` section of the
//! configuration. It is loaded once per run; the only mutation is recording a
//! new last-snapshot date, which marks the registry as changed so the caller
//! knows it has to be persisted.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

use crate::volume::{VolumeConfig, VolumeRole};

/// Reasons a registry entry cannot be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("item {0} not defined")]
    NotDefined(String),

    #[error("item {0} has no valid type")]
    InvalidRole(String),

    #[error("item {0} has no uuid")]
    MissingUuid(String),

    #[error("item {0} contains no subvolume name")]
    MissingSubvolume(String),

    #[error("item {name} contains no '{part}' value in the 'keep' item")]
    MissingKeep { name: String, part: &'static str },

    #[error("item {name} 'keep.{part}' value is no integer or less than {lowest}")]
    InvalidKeep {
        name: String,
        part: &'static str,
        lowest: i64,
    },

    #[error("item {name} is malformed: {reason}")]
    Malformed { name: String, reason: String },

    #[error("backup source {0} has not type source")]
    NotASource(String),

    #[error("backup destination {0} has not type destination")]
    NotADestination(String),

    #[error("no source defined for backup destination {0}")]
    NoSource(String),

    #[error("more than one source defined for backup destination {0}")]
    AmbiguousSource(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    volumes: BTreeMap<String, VolumeConfig>,
    /// Entries that could not be read at all, with the reason
    malformed: BTreeMap<String, String>,
    changed: bool,
}

impl Registry {
    pub fn new(mut volumes: BTreeMap<String, VolumeConfig>) -> Self {
        for (name, volume) in volumes.iter_mut() {
            volume.name = name.clone();
        }
        Self {
            volumes,
            malformed: BTreeMap::new(),
            changed: false,
        }
    }

    /// Register entries which failed to load; they are rejected by [`Self::check_item`]
    pub fn with_malformed(mut self, malformed: BTreeMap<String, String>) -> Self {
        self.malformed = malformed;
        self
    }

    pub fn volumes(&self) -> &BTreeMap<String, VolumeConfig> {
        &self.volumes
    }

    /// True once a last-snapshot date was changed since loading
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn get(&self, name: &str) -> Option<&VolumeConfig> {
        self.volumes.get(name)
    }

    /// Validate a single entry regardless of its role
    pub fn check_item(&self, name: &str) -> Result<&VolumeConfig, ValidationError> {
        if let Some(reason) = self.malformed.get(name) {
            return Err(ValidationError::Malformed {
                name: name.to_string(),
                reason: reason.clone(),
            });
        }
        let volume = self
            .volumes
            .get(name)
            .ok_or_else(|| ValidationError::NotDefined(name.to_string()))?;
        if volume.role == VolumeRole::Unknown {
            return Err(ValidationError::InvalidRole(name.to_string()));
        }
        if volume.uuid.trim().is_empty() {
            return Err(ValidationError::MissingUuid(name.to_string()));
        }
        if volume.subvolume.is_empty() {
            return Err(ValidationError::MissingSubvolume(name.to_string()));
        }
        // keep is optional, but a given keep item must be complete
        if let Some(keep) = volume.keep {
            for (part, value, lowest) in [
                ("day", keep.day, 1),
                ("month", keep.month, 0),
                ("year", keep.year, 0),
            ] {
                let Some(value) = value else {
                    return Err(ValidationError::MissingKeep {
                        name: name.to_string(),
                        part,
                    });
                };
                if value < lowest || u32::try_from(value).is_err() {
                    return Err(ValidationError::InvalidKeep {
                        name: name.to_string(),
                        part,
                        lowest,
                    });
                }
            }
        }
        Ok(volume)
    }

    pub fn check_source(&self, name: &str) -> Result<&VolumeConfig, ValidationError> {
        let volume = self.check_item(name)?;
        if !volume.is_source() {
            return Err(ValidationError::NotASource(name.to_string()));
        }
        Ok(volume)
    }

    /// A destination is valid only if exactly one source shares its subvolume
    pub fn check_destination(&self, name: &str) -> Result<&VolumeConfig, ValidationError> {
        let volume = self.check_item(name)?;
        if !volume.is_destination() {
            return Err(ValidationError::NotADestination(name.to_string()));
        }
        match self.sources_of(&volume.subvolume).len() {
            0 => Err(ValidationError::NoSource(name.to_string())),
            1 => Ok(volume),
            _ => Err(ValidationError::AmbiguousSource(name.to_string())),
        }
    }

    /// The unique source feeding the given destination
    pub fn source_for(&self, destination: &str) -> Result<&VolumeConfig, ValidationError> {
        let volume = self.check_destination(destination)?;
        let source = self.sources_of(&volume.subvolume)[0];
        self.check_source(&source.name)
    }

    fn sources_of(&self, subvolume: &str) -> Vec<&VolumeConfig> {
        self.volumes
            .values()
            .filter(|volume| volume.subvolume == subvolume && volume.is_source())
            .collect()
    }

    /// Names of all entries (sources and destinations) living on one of the given devices
    pub fn names_on(&self, uuids: &[String]) -> Vec<String> {
        self.volumes
            .values()
            .filter(|volume| uuids.contains(&volume.uuid))
            .map(|volume| volume.name.clone())
            .collect()
    }

    /// Last snapshot dates of every entry holding the given subvolume
    pub fn last_snapshot_dates(&self, subvolume: &str) -> Vec<Option<NaiveDate>> {
        self.volumes
            .values()
            .filter(|volume| volume.subvolume == subvolume)
            .map(|volume| volume.last_snapshot)
            .collect()
    }

    pub fn set_last_snapshot(
        &mut self,
        name: &str,
        date: NaiveDate,
    ) -> Result<(), ValidationError> {
        self.check_item(name)?;
        let volume = self
            .volumes
            .get_mut(name)
            .ok_or_else(|| ValidationError::NotDefined(name.to_string()))?;
        if volume.last_snapshot != Some(date) {
            volume.last_snapshot = Some(date);
            self.changed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeepCounts, RetentionPolicy};

    fn volume(subvolume: &str, uuid: &str, role: VolumeRole) -> VolumeConfig {
        VolumeConfig {
            name: String::new(),
            subvolume: subvolume.to_string(),
            uuid: uuid.to_string(),
            role,
            last_snapshot: None,
            keep: None,
            comment: None,
        }
    }

    fn registry() -> Registry {
        let mut volumes = BTreeMap::new();
        volumes.insert("main".to_string(), volume("@data", "aaaa", VolumeRole::Source));
        volumes.insert("usb".to_string(), volume("@data", "bbbb", VolumeRole::Destination));
        volumes.insert("orphan".to_string(), volume("@misc", "cccc", VolumeRole::Destination));
        Registry::new(volumes)
    }

    #[test]
    fn resolves_source_of_destination() {
        let registry = registry();
        let source = registry.source_for("usb").expect("source");
        assert_eq!(source.name, "main");
        assert_eq!(
            registry.check_destination("orphan"),
            Err(ValidationError::NoSource("orphan".to_string()))
        );
        assert_eq!(
            registry.check_source("usb"),
            Err(ValidationError::NotASource("usb".to_string()))
        );
        assert_eq!(
            registry.check_item("nope"),
            Err(ValidationError::NotDefined("nope".to_string()))
        );
    }

    #[test]
    fn rejects_second_source_for_subvolume() {
        let mut registry = registry();
        registry
            .volumes
            .insert("backup-src".to_string(), volume("@data", "dddd", VolumeRole::Source));
        assert_eq!(
            registry.check_destination("usb"),
            Err(ValidationError::AmbiguousSource("usb".to_string()))
        );
    }

    #[test]
    fn rejects_zero_day_keep() {
        let mut volumes = BTreeMap::new();
        let mut source = volume("@data", "aaaa", VolumeRole::Source);
        source.keep = Some(RetentionPolicy::new(0, 1, 1).into());
        volumes.insert("main".to_string(), source);
        let registry = Registry::new(volumes);
        assert_eq!(
            registry.check_item("main").unwrap_err(),
            ValidationError::InvalidKeep {
                name: "main".to_string(),
                part: "day",
                lowest: 1,
            }
        );
    }

    #[test]
    fn rejects_only_the_broken_entries() {
        let mut volumes = BTreeMap::new();
        volumes.insert("main".to_string(), volume("@data", "aaaa", VolumeRole::Source));
        let mut partial = volume("@data", "bbbb", VolumeRole::Destination);
        partial.keep = Some(KeepCounts {
            day: Some(3),
            month: None,
            year: Some(1),
        });
        volumes.insert("usb".to_string(), partial);
        volumes.insert("nas".to_string(), volume("@data", "", VolumeRole::Destination));
        let malformed = BTreeMap::from([("odd".to_string(), "invalid type: integer".to_string())]);
        let registry = Registry::new(volumes).with_malformed(malformed);

        assert!(registry.check_source("main").is_ok());
        assert_eq!(
            registry.check_item("usb").unwrap_err().to_string(),
            "item usb contains no 'month' value in the 'keep' item"
        );
        assert_eq!(
            registry.check_item("nas"),
            Err(ValidationError::MissingUuid("nas".to_string()))
        );
        assert_eq!(
            registry.check_item("odd").unwrap_err().to_string(),
            "item odd is malformed: invalid type: integer"
        );
        assert_eq!(
            registry.check_item("main").map(|volume| volume.name.as_str()),
            Ok("main")
        );
    }

    #[test]
    fn tracks_changes_of_last_snapshot() {
        let mut registry = registry();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(!registry.is_changed());
        registry.set_last_snapshot("main", date).unwrap();
        assert!(registry.is_changed());
        assert_eq!(registry.get("main").unwrap().last_snapshot, Some(date));
        assert_eq!(registry.last_snapshot_dates("@data"), vec![Some(date), None]);
    }

    #[test]
    fn lists_names_on_connected_devices() {
        let registry = registry();
        let names = registry.names_on(&["bbbb".to_string(), "cccc".to_string()]);
        assert_eq!(names, vec!["orphan".to_string(), "usb".to_string()]);
    }
}
