// SPDX-License-Identifier: GPL-3.0-only

//! Device inspection through `lsblk`
//!
//! The block device list is never cached: a backup run prefers a correct,
//! up-to-date view over saving a process spawn.

use std::path::PathBuf;

use async_trait::async_trait;
use backup_contracts::{DeviceInspector, Result as BackupResult};
use backup_types::{DeviceInfo, FilesystemKind};
use serde::Deserialize;
use tracing::debug;
use which::which;

use crate::cmd;
use crate::error::{Result, SysError};

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    uuid: Option<String>,
    fstype: Option<String>,
    mountpoint: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// Parse `lsblk --json --output uuid,fstype,mountpoint`, flattening partitions
pub fn parse_lsblk(json: &str) -> Result<Vec<DeviceInfo>> {
    let output: LsblkOutput = serde_json::from_str(json)
        .map_err(|e| SysError::Parse(format!("lsblk json structure unknown: {e}")))?;

    let mut devices = Vec::new();
    let mut stack: Vec<LsblkDevice> = output.blockdevices;
    while let Some(device) = stack.pop() {
        stack.extend(device.children);
        let Some(uuid) = device.uuid.filter(|uuid| !uuid.is_empty()) else {
            continue;
        };
        devices.push(DeviceInfo {
            uuid,
            filesystem: FilesystemKind::from_fs_type(device.fstype.as_deref()),
            mount_point: device.mountpoint.map(PathBuf::from),
        });
    }
    Ok(devices)
}

/// [`DeviceInspector`] backed by the `lsblk` tool
#[derive(Debug, Clone)]
pub struct LsblkInspector {
    binary_path: PathBuf,
}

impl LsblkInspector {
    pub fn new() -> Result<Self> {
        let binary_path = which("lsblk").map_err(|_| SysError::ToolNotFound("lsblk"))?;
        Ok(Self { binary_path })
    }

    async fn list(&self) -> Result<Vec<DeviceInfo>> {
        let stdout = cmd::run(
            &self.binary_path,
            &cmd::args(["--json", "--output", "uuid,fstype,mountpoint"]),
        )
        .await?;
        let devices = parse_lsblk(&stdout)?;
        debug!("lsblk reports {} devices with a filesystem uuid", devices.len());
        Ok(devices)
    }
}

#[async_trait]
impl DeviceInspector for LsblkInspector {
    async fn query(&self, uuid: &str) -> BackupResult<DeviceInfo> {
        let device = self
            .list()
            .await?
            .into_iter()
            .find(|device| device.uuid == uuid)
            .ok_or_else(|| SysError::DeviceNotFound(uuid.to_string()))?;
        Ok(device)
    }

    async fn connected_uuids(&self) -> BackupResult<Vec<String>> {
        let mut uuids: Vec<String> = self.list().await?.into_iter().map(|d| d.uuid).collect();
        uuids.sort();
        uuids.dedup();
        Ok(uuids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "blockdevices": [
            {"uuid": null, "fstype": null, "mountpoint": null,
             "children": [
                {"uuid": "3f1c-aa", "fstype": "btrfs", "mountpoint": "/"},
                {"uuid": "12AB-34CD", "fstype": "vfat", "mountpoint": null}
             ]},
            {"uuid": "9e0d", "fstype": "ext4", "mountpoint": "/media/usb"}
        ]
    }"#;

    #[test]
    fn flattens_partitions() {
        let devices = parse_lsblk(SAMPLE).expect("parse lsblk");
        assert_eq!(devices.len(), 3);

        let root = devices.iter().find(|d| d.uuid == "3f1c-aa").unwrap();
        assert_eq!(root.filesystem, FilesystemKind::Btrfs);
        assert_eq!(root.mount_point, Some(PathBuf::from("/")));

        let stick = devices.iter().find(|d| d.uuid == "12AB-34CD").unwrap();
        assert!(stick.filesystem.is_fat());
        assert_eq!(stick.mount_point, None);

        let usb = devices.iter().find(|d| d.uuid == "9e0d").unwrap();
        assert_eq!(usb.filesystem, FilesystemKind::Other("ext4".to_string()));
    }

    #[test]
    fn rejects_unknown_structure() {
        assert!(matches!(
            parse_lsblk(r#"{"devices": []}"#),
            Err(SysError::Parse(_))
        ));
    }
}
