// SPDX-License-Identifier: GPL-3.0-only

#[cfg(not(feature = "libbtrfsutil"))]
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use backup_contracts::{Result as BackupResult, SnapshotOps};
#[cfg(not(feature = "libbtrfsutil"))]
use backup_sys::cmd;
use tracing::info;
use which::which;

use crate::error::{BtrfsError, Result};
use crate::pipeline;

#[cfg(feature = "libbtrfsutil")]
use btrfsutil::subvolume::{DeleteFlags, SnapshotFlags, Subvolume};

/// Manager for BTRFS snapshot operations
#[derive(Debug, Clone)]
pub struct SubvolumeManager {
    binary_path: PathBuf,
    verbose: bool,
}

impl SubvolumeManager {
    /// Locate the `btrfs` tool; `verbose` is passed through to it
    pub fn new(verbose: bool) -> Result<Self> {
        let binary_path = which("btrfs").map_err(|_| BtrfsError::ToolNotFound)?;
        Ok(Self {
            binary_path,
            verbose,
        })
    }

    #[cfg(not(feature = "libbtrfsutil"))]
    fn verbose_args(&self) -> Vec<OsString> {
        if self.verbose {
            vec![OsString::from("--verbose")]
        } else {
            Vec::new()
        }
    }

    /// Create a snapshot of a subvolume
    #[cfg(not(feature = "libbtrfsutil"))]
    pub async fn snapshot(&self, source: &Path, dest: &Path, readonly: bool) -> Result<()> {
        let mut args = cmd::args(["subvolume", "snapshot"]);
        if readonly {
            args.push(OsString::from("-r"));
        }
        args.push(source.as_os_str().to_os_string());
        args.push(dest.as_os_str().to_os_string());
        cmd::run(&self.binary_path, &args).await?;
        Ok(())
    }

    /// Create a snapshot of a subvolume
    #[cfg(feature = "libbtrfsutil")]
    pub async fn snapshot(&self, source: &Path, dest: &Path, readonly: bool) -> Result<()> {
        let source_subvol = Subvolume::try_from(source).map_err(|e| {
            BtrfsError::SubvolumeNotFound(format!("Source {}: {}", source.display(), e))
        })?;

        let mut flags = SnapshotFlags::empty();
        if readonly {
            flags |= SnapshotFlags::READ_ONLY;
        }

        source_subvol.snapshot(dest, flags, None).map_err(|e| {
            BtrfsError::OperationFailed(format!(
                "Failed to create snapshot from {} to {}: {}",
                source.display(),
                dest.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Delete a subvolume
    #[cfg(not(feature = "libbtrfsutil"))]
    pub async fn delete(&self, path: &Path) -> Result<()> {
        let mut args = cmd::args(["subvolume", "delete"]);
        args.extend(self.verbose_args());
        args.push(path.as_os_str().to_os_string());
        cmd::run(&self.binary_path, &args).await?;
        Ok(())
    }

    /// Delete a subvolume
    #[cfg(feature = "libbtrfsutil")]
    pub async fn delete(&self, path: &Path) -> Result<()> {
        let subvol = Subvolume::try_from(path).map_err(|e| {
            BtrfsError::SubvolumeNotFound(format!("{}: {}", path.display(), e))
        })?;

        subvol.delete(DeleteFlags::empty()).map_err(|e| {
            BtrfsError::OperationFailed(format!(
                "Failed to delete subvolume at {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }
}

#[async_trait]
impl SnapshotOps for SubvolumeManager {
    async fn create_read_only(&self, subvolume: &Path, snapshot: &Path) -> BackupResult<()> {
        self.snapshot(subvolume, snapshot, true).await?;
        if !snapshot.exists() {
            return Err(BtrfsError::OperationFailed(format!(
                "make snapshot {} to {} failed",
                subvolume.display(),
                snapshot.display()
            ))
            .into());
        }
        info!("created read-only snapshot {}", snapshot.display());
        Ok(())
    }

    async fn send_receive(
        &self,
        snapshot: &Path,
        baseline: Option<&Path>,
        target_root: &Path,
    ) -> BackupResult<()> {
        pipeline::send_receive(&self.binary_path, snapshot, baseline, target_root, self.verbose)
            .await?;
        Ok(())
    }

    async fn delete(&self, snapshot: &Path) -> BackupResult<()> {
        SubvolumeManager::delete(self, snapshot).await?;
        info!("deleted snapshot {}", snapshot.display());
        Ok(())
    }
}
