// SPDX-License-Identifier: GPL-3.0-only

//! The JSON configuration file
//!
//! ```json
//! {
//!     "backup": {
//!         "main": {"subvolume": "@data", "uuid": "...", "type": "source"},
//!         "usb": {"subvolume": "@data", "uuid": "...", "type": "destination",
//!                 "last-snapshot": "2024-01-01", "keep": {"day": 7, "month": 6, "year": 5}}
//!     },
//!     "logging": {"filter": "info", "file": "/var/log/ubackup.log"}
//! }
//! ```
//!
//! Entries are read one by one. An entry which can not be read is only
//! rejected when it is used as a target; the other entries stay usable.
//!
//! Only `last-snapshot` values are ever written back; everything else in the
//! file, including unknown keys, is kept as it was.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use backup_contracts::{BackupError, RegistryStore};
use backup_types::{Registry, VolumeConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use tracing::info;

pub const CONFIG_FILE_NAME: &str = "ubackup.conf";

/// The optional `logging` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used without `-v` and `RUST_LOG`
    #[serde(default)]
    pub filter: Option<String>,
    /// Also write the log into this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub volumes: BTreeMap<String, VolumeConfig>,
    /// Entries which can not be read, with the reason
    pub malformed: BTreeMap<String, String>,
    pub logging: Option<LoggingConfig>,
    raw: Value,
}

/// First `ubackup.conf` beside the executable, in the working directory or in `~/.config`
pub fn default_path() -> Option<PathBuf> {
    let beside_executable = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.canonicalize().ok())
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let working_directory = std::env::current_dir().ok();
    let user_config = std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"));

    [beside_executable, working_directory, user_config]
        .into_iter()
        .flatten()
        .map(|base| base.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.exists())
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("can not read configuration {}", path.display()))?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(text)
            .with_context(|| format!("configuration file error in {}", path.display()))?;
        let Some(backup) = raw.get("backup") else {
            bail!("no backup entry in configuration");
        };
        let Some(entries) = backup.as_object() else {
            bail!("invalid backup configuration");
        };
        let mut volumes = BTreeMap::new();
        let mut malformed = BTreeMap::new();
        for (name, entry) in entries {
            match serde_json::from_value::<VolumeConfig>(entry.clone()) {
                Ok(volume) => {
                    volumes.insert(name.clone(), volume);
                }
                Err(e) => {
                    malformed.insert(name.clone(), e.to_string());
                }
            }
        }
        // A logging section in another format is ignored.
        let logging = raw
            .get("logging")
            .and_then(|logging| serde_json::from_value(logging.clone()).ok());

        Ok(Self {
            path: path.to_path_buf(),
            volumes,
            malformed,
            logging,
            raw,
        })
    }

    pub fn registry(&self) -> Registry {
        Registry::new(self.volumes.clone()).with_malformed(self.malformed.clone())
    }

    /// A store writing updates of `registry` back into this file
    pub fn store(&self) -> JsonStore {
        JsonStore {
            path: self.path.clone(),
            raw: self.raw.clone(),
        }
    }
}

/// Writes last snapshot dates back into the configuration file
pub struct JsonStore {
    path: PathBuf,
    raw: Value,
}

impl JsonStore {
    /// The file content with the registry's last snapshot dates merged in
    pub fn render(&self, registry: &Registry) -> Result<String> {
        let mut raw = self.raw.clone();
        let backup = raw
            .get_mut("backup")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow!("invalid backup configuration"))?;
        for (name, volume) in registry.volumes() {
            let (Some(date), Some(Value::Object(entry))) =
                (volume.last_snapshot, backup.get_mut(name))
            else {
                continue;
            };
            entry.insert(
                "last-snapshot".to_string(),
                Value::String(date.format("%Y-%m-%d").to_string()),
            );
        }

        let mut out = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
        raw.serialize(&mut serializer)?;
        out.push(b'\n');
        Ok(String::from_utf8(out)?)
    }
}

#[async_trait]
impl RegistryStore for JsonStore {
    async fn persist(&self, registry: &Registry) -> backup_contracts::Result<()> {
        if !registry.is_changed() {
            return Ok(());
        }
        let text = self
            .render(registry)
            .map_err(|e| BackupError::failure(format!("{e:#}")))?;
        info!("write configuration file {}", self.path.display());
        tokio::fs::write(&self.path, text).await?;
        Ok(())
    }
}
