// SPDX-License-Identifier: GPL-3.0-only

//! Mount lifecycle
//!
//! Every volume touched by a run is mounted on a private directory
//! `mp.XXXXXX` below one per-run directory `ubackup.XXXXXX`. The table keeps
//! at most one mount per device. A request with an incompatible mode remounts
//! the device; read-only mounts survive a plain release so later steps of the
//! run can reuse them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use backup_contracts::{BackupError, DeviceInspector, Mounter, Result, ensure_invariant};
use backup_types::{MountMode, MountOptions, MountSource};
use nix::unistd::mkdtemp;
use tracing::{debug, error, info, warn};

const BASE_TEMPLATE: &str = "ubackup.XXXXXX";
const MOUNT_TEMPLATE: &str = "mp.XXXXXX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountHandle {
    pub uuid: String,
    pub path: PathBuf,
    pub read_only: bool,
}

pub struct MountTable {
    devices: Arc<dyn DeviceInspector>,
    mounter: Arc<dyn Mounter>,
    work_parent: Option<PathBuf>,
    base: Option<PathBuf>,
    handles: BTreeMap<String, MountHandle>,
}

impl MountTable {
    pub fn new(devices: Arc<dyn DeviceInspector>, mounter: Arc<dyn Mounter>) -> Self {
        Self {
            devices,
            mounter,
            work_parent: None,
            base: None,
            handles: BTreeMap::new(),
        }
    }

    pub fn with_work_parent(mut self, parent: PathBuf) -> Self {
        self.work_parent = Some(parent);
        self
    }

    pub fn handle(&self, uuid: &str) -> Option<&MountHandle> {
        self.handles.get(uuid)
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// The per-run directory, once created
    pub fn base(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    fn work_parent(&self) -> PathBuf {
        if let Some(parent) = &self.work_parent {
            return parent.clone();
        }
        match std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from) {
            Some(runtime) if runtime.exists() => runtime,
            _ => std::env::temp_dir(),
        }
    }

    fn ensure_base(&mut self) -> Result<PathBuf> {
        if let Some(base) = &self.base {
            ensure_invariant(base.exists(), "work directory exists")?;
            return Ok(base.clone());
        }
        let base = mkdtemp(&self.work_parent().join(BASE_TEMPLATE))
            .map_err(|e| BackupError::failure(format!("can not create work directory: {e}")))?;
        info!("use temporary work directory {}", base.display());
        self.base = Some(base.clone());
        Ok(base)
    }

    /// Mount the device in the requested mode and return its mount point
    pub async fn acquire(&mut self, uuid: &str, mode: MountMode) -> Result<PathBuf> {
        ensure_invariant(!uuid.trim().is_empty(), "device uuid is not empty")?;
        let base = self.ensure_base()?;

        if let Some(handle) = self.handles.get(uuid) {
            if mode.accepts(handle.read_only) {
                debug!("reuse mount of {uuid} at {}", handle.path.display());
                return Ok(handle.path.clone());
            }
            debug!("mount of {uuid} does not allow {mode:?}, remount");
            self.release(uuid, true).await?;
        }
        ensure_invariant(!self.handles.contains_key(uuid), "device is not mounted twice")?;

        let device = self.devices.query(uuid).await?;
        let read_only = mode.mounts_read_only();
        let (source, bind) = match device.mount_point {
            // Only BTRFS can be mounted a second time at another place.
            Some(existing) if !device.filesystem.supports_native_snapshots() => {
                (MountSource::Bind(existing), true)
            }
            _ => (MountSource::Uuid(uuid.to_string()), false),
        };

        let path = mkdtemp(&base.join(MOUNT_TEMPLATE))
            .map_err(|e| BackupError::failure(format!("can not create mount directory: {e}")))?;
        let options = MountOptions { read_only, bind };
        if let Err(e) = self.mounter.mount(&source, &path, options).await {
            let _ = tokio::fs::remove_dir(&path).await;
            return Err(e);
        }
        info!(
            "mounted {uuid} at {} ({})",
            path.display(),
            options.render()
        );

        self.handles.insert(
            uuid.to_string(),
            MountHandle {
                uuid: uuid.to_string(),
                path: path.clone(),
                read_only,
            },
        );
        ensure_invariant(path.exists(), "mount point exists")?;
        Ok(path)
    }

    /// Sync, then unmount unless the mount is read-only and `forced` is not set
    pub async fn release(&mut self, uuid: &str, forced: bool) -> Result<()> {
        ensure_invariant(!uuid.trim().is_empty(), "device uuid is not empty")?;
        debug!("running sync");
        self.mounter.sync().await?;

        let Some(handle) = self.handles.get(uuid) else {
            warn!("umount of not mounted {uuid}");
            return Ok(());
        };
        if !forced && handle.read_only {
            debug!("defer umount of read-only {uuid}");
            return Ok(());
        }

        info!("umount {uuid}");
        let path = handle.path.clone();
        self.mounter.unmount(&path).await?;
        // remove_dir only removes an empty directory
        tokio::fs::remove_dir(&path).await?;
        self.handles.remove(uuid);
        Ok(())
    }

    /// Unmount everything and remove the per-run directory
    ///
    /// Tries every handle even if one fails and reports the first error.
    pub async fn release_all(&mut self) -> Result<()> {
        info!("umount all ...");
        let mut first_error = None;
        let uuids: Vec<String> = self.handles.keys().cloned().collect();
        for uuid in uuids {
            if let Err(e) = self.release(&uuid, true).await {
                error!("umount of {uuid} failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        if first_error.is_none()
            && let Some(base) = self.base.take()
        {
            tokio::fs::remove_dir(&base).await?;
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Combine the result of a step with the release of the mount it used
///
/// The step's own error wins.
pub(crate) fn settle<T>(result: Result<T>, released: Result<()>) -> Result<T> {
    let value = result?;
    released?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use backup_types::FilesystemKind;

    use super::*;
    use crate::testing::{FakeDevices, FakeMounter, TempDir};

    fn table(temp: &TempDir, devices: FakeDevices, mounter: Arc<FakeMounter>) -> MountTable {
        MountTable::new(Arc::new(devices), mounter).with_work_parent(temp.path.clone())
    }

    #[tokio::test]
    async fn reuses_compatible_mount() {
        let temp = TempDir::new();
        let backing = temp.dir("src");
        let devices = FakeDevices::default().with("src", FilesystemKind::Btrfs, None);
        let mounter = Arc::new(FakeMounter::new().with_backing("src", &backing));
        let mut mounts = table(&temp, devices, mounter.clone());

        let first = mounts.acquire("src", MountMode::ReadWrite).await.unwrap();
        let second = mounts.acquire("src", MountMode::Either).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mounter.mount_count(), 1);
        assert!(!mounts.handle("src").unwrap().read_only);

        mounts.release_all().await.unwrap();
        assert!(mounts.is_empty());
    }

    #[tokio::test]
    async fn remounts_on_incompatible_mode() {
        let temp = TempDir::new();
        let backing = temp.dir("src");
        let devices = FakeDevices::default().with("src", FilesystemKind::Btrfs, None);
        let mounter = Arc::new(FakeMounter::new().with_backing("src", &backing));
        let mut mounts = table(&temp, devices, mounter.clone());

        let read_only = mounts.acquire("src", MountMode::ReadOnly).await.unwrap();
        let read_write = mounts.acquire("src", MountMode::ReadWrite).await.unwrap();
        assert_ne!(read_only, read_write);
        assert!(!read_only.exists());
        assert_eq!(mounter.mount_count(), 2);
        assert_eq!(mounter.unmount_count(), 1);

        mounts.release_all().await.unwrap();
    }

    #[tokio::test]
    async fn defers_release_of_read_only_mount() {
        let temp = TempDir::new();
        let backing = temp.dir("src");
        let devices = FakeDevices::default().with("src", FilesystemKind::Btrfs, None);
        let mounter = Arc::new(FakeMounter::new().with_backing("src", &backing));
        let mut mounts = table(&temp, devices, mounter.clone());

        mounts.acquire("src", MountMode::ReadOnly).await.unwrap();
        mounts.release("src", false).await.unwrap();
        assert!(mounts.handle("src").is_some());
        assert_eq!(mounter.unmount_count(), 0);
        assert_eq!(mounter.sync_count(), 1);

        mounts.release("src", true).await.unwrap();
        assert!(mounts.handle("src").is_none());
        assert_eq!(mounter.unmount_count(), 1);

        // untracked devices are ignored
        mounts.release("src", true).await.unwrap();
        assert_eq!(mounter.unmount_count(), 1);

        let base = mounts.base().unwrap().to_path_buf();
        mounts.release_all().await.unwrap();
        assert!(!base.exists());
    }

    #[tokio::test]
    async fn binds_already_mounted_foreign_filesystem() {
        let temp = TempDir::new();
        let existing = temp.dir("media-usb");
        let devices = FakeDevices::default()
            .with("usb", FilesystemKind::Fat, Some(existing.clone()))
            .with("disk", FilesystemKind::Btrfs, Some(temp.dir("mnt")));
        let mounter = Arc::new(FakeMounter::new().with_backing("disk", &temp.dir("disk")));
        let mut mounts = table(&temp, devices, mounter.clone());

        mounts.acquire("usb", MountMode::ReadWrite).await.unwrap();
        mounts.acquire("disk", MountMode::ReadWrite).await.unwrap();
        let sources = mounter.sources();
        assert_eq!(
            sources,
            vec![
                MountSource::Bind(existing),
                MountSource::Uuid("disk".to_string())
            ]
        );

        mounts.release_all().await.unwrap();
    }

    #[tokio::test]
    async fn failed_mount_leaves_no_directory() {
        let temp = TempDir::new();
        let devices = FakeDevices::default().with("gone", FilesystemKind::Btrfs, None);
        let mounter = Arc::new(FakeMounter::new());
        let mut mounts = table(&temp, devices, mounter);

        let error = mounts.acquire("gone", MountMode::ReadOnly).await.unwrap_err();
        assert!(!error.is_program_fault());
        let base = mounts.base().unwrap().to_path_buf();
        assert_eq!(std::fs::read_dir(&base).unwrap().count(), 0);

        mounts.release_all().await.unwrap();
        assert!(!base.exists());
    }
}
