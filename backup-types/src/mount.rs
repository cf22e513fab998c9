// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Requested access mode for a mounted volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
    /// Read access is needed, an existing read-write mount is fine too
    Either,
}

impl MountMode {
    /// Whether an existing mount with the given read-only flag can serve this mode
    pub fn accepts(self, read_only: bool) -> bool {
        match self {
            Self::ReadOnly => read_only,
            Self::ReadWrite => !read_only,
            Self::Either => true,
        }
    }

    /// Read-only flag for a fresh mount in this mode
    pub fn mounts_read_only(self) -> bool {
        self == Self::ReadOnly
    }
}

/// What gets mounted on the target directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountSource {
    /// The filesystem identified by its UUID
    Uuid(String),
    /// A bind mount of an existing mount point
    Bind(PathBuf),
}

/// Mount options used for every backup mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOptions {
    pub read_only: bool,
    pub bind: bool,
}

impl MountOptions {
    /// Comma separated option string for `mount --options`
    pub fn render(&self) -> String {
        let mut options = String::from("noatime,nodev,lazytime");
        if self.read_only {
            options.push_str(",ro");
        }
        if self.bind {
            options.push_str(",bind");
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_compatibility() {
        assert!(MountMode::ReadOnly.accepts(true));
        assert!(!MountMode::ReadOnly.accepts(false));
        assert!(!MountMode::ReadWrite.accepts(true));
        assert!(MountMode::Either.accepts(true));
        assert!(MountMode::Either.accepts(false));
        assert!(!MountMode::Either.mounts_read_only());
    }

    #[test]
    fn renders_options() {
        let options = MountOptions {
            read_only: true,
            bind: true,
        };
        assert_eq!(options.render(), "noatime,nodev,lazytime,ro,bind");
        let options = MountOptions {
            read_only: false,
            bind: false,
        };
        assert_eq!(options.render(), "noatime,nodev,lazytime");
    }
}
