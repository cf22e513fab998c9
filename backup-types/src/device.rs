// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Filesystem family of a block device, as far as the backup cares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilesystemKind {
    /// Supports native snapshots, send/receive and several concurrent mounts
    Btrfs,
    /// Stores local wall-clock time and no ownership (`vfat`, `msdos`, `exfat`)
    Fat,
    Other(String),
    /// Device reports no filesystem
    Unknown,
}

impl FilesystemKind {
    pub fn from_fs_type(fs_type: Option<&str>) -> Self {
        match fs_type {
            Some("btrfs") => Self::Btrfs,
            Some("vfat" | "msdos" | "exfat") => Self::Fat,
            Some(other) if !other.is_empty() => Self::Other(other.to_string()),
            _ => Self::Unknown,
        }
    }

    pub fn supports_native_snapshots(&self) -> bool {
        matches!(self, Self::Btrfs)
    }

    pub fn is_fat(&self) -> bool {
        matches!(self, Self::Fat)
    }
}

/// Current state of a block device, never cached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub uuid: String,
    pub filesystem: FilesystemKind,
    /// Where the device is mounted right now, if anywhere
    pub mount_point: Option<PathBuf>,
}
