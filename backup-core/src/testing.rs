// SPDX-License-Identifier: GPL-3.0-only

//! In-memory collaborators for engine tests
//!
//! Volumes are plain directories. Mounting replaces the empty mount point
//! with a symlink to the volume's directory, snapshots and mirrors are
//! recursive copies.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use backup_contracts::{
    BackupError, DeviceInspector, Mirror, Mounter, RegistryStore, Result, SnapshotOps,
};
use backup_types::{DeviceInfo, FilesystemKind, MirrorOptions, MountOptions, MountSource, Registry};

static COUNTER: AtomicU64 = AtomicU64::new(1);

pub struct TempDir {
    pub path: PathBuf,
}

impl TempDir {
    pub fn new() -> Self {
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "backup-core-test-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("create temp dir");
        Self { path }
    }

    /// Create a directory (and its parents) below the temp dir
    pub fn dir(&self, relative: &str) -> PathBuf {
        let path = self.path.join(relative);
        fs::create_dir_all(&path).expect("create dir");
        path
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, content).expect("write file");
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

pub fn copy_tree(source: &Path, destination: &Path) -> std::io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Relative paths of all entries below `root`, sorted
pub fn tree_entries(root: &Path) -> Vec<String> {
    let mut entries = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(directory) = stack.pop() {
        for entry in fs::read_dir(&directory).expect("read dir") {
            let path = entry.expect("dir entry").path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            entries.push(
                path.strip_prefix(root)
                    .expect("below root")
                    .display()
                    .to_string(),
            );
        }
    }
    entries.sort();
    entries
}

#[derive(Default)]
pub struct FakeDevices {
    devices: BTreeMap<String, DeviceInfo>,
}

impl FakeDevices {
    pub fn with(
        mut self,
        uuid: &str,
        filesystem: FilesystemKind,
        mount_point: Option<PathBuf>,
    ) -> Self {
        self.devices.insert(
            uuid.to_string(),
            DeviceInfo {
                uuid: uuid.to_string(),
                filesystem,
                mount_point,
            },
        );
        self
    }
}

#[async_trait]
impl DeviceInspector for FakeDevices {
    async fn query(&self, uuid: &str) -> Result<DeviceInfo> {
        self.devices
            .get(uuid)
            .cloned()
            .ok_or_else(|| BackupError::failure(format!("volume {uuid} is not present")))
    }

    async fn connected_uuids(&self) -> Result<Vec<String>> {
        Ok(self.devices.keys().cloned().collect())
    }
}

#[derive(Default)]
struct MountLog {
    sources: Vec<MountSource>,
    mounts: usize,
    unmounts: usize,
    syncs: usize,
}

pub struct FakeMounter {
    backing: BTreeMap<String, PathBuf>,
    log: Mutex<MountLog>,
}

impl FakeMounter {
    pub fn new() -> Self {
        Self {
            backing: BTreeMap::new(),
            log: Mutex::new(MountLog::default()),
        }
    }

    /// Directory holding the content of the volume `uuid`
    pub fn with_backing(mut self, uuid: &str, directory: &Path) -> Self {
        self.backing.insert(uuid.to_string(), directory.to_path_buf());
        self
    }

    pub fn sources(&self) -> Vec<MountSource> {
        self.log.lock().unwrap().sources.clone()
    }

    pub fn mount_count(&self) -> usize {
        self.log.lock().unwrap().mounts
    }

    pub fn unmount_count(&self) -> usize {
        self.log.lock().unwrap().unmounts
    }

    pub fn sync_count(&self) -> usize {
        self.log.lock().unwrap().syncs
    }
}

#[async_trait]
impl Mounter for FakeMounter {
    async fn mount(
        &self,
        source: &MountSource,
        target: &Path,
        _options: MountOptions,
    ) -> Result<()> {
        let backing = match source {
            MountSource::Uuid(uuid) => self
                .backing
                .get(uuid)
                .cloned()
                .ok_or_else(|| BackupError::failure(format!("mount of {uuid} failed")))?,
            MountSource::Bind(path) => path.clone(),
        };
        fs::remove_dir(target)?;
        symlink(&backing, target)?;
        let mut log = self.log.lock().unwrap();
        log.sources.push(source.clone());
        log.mounts += 1;
        Ok(())
    }

    async fn unmount(&self, target: &Path) -> Result<()> {
        fs::remove_file(target)?;
        fs::create_dir(target)?;
        self.log.lock().unwrap().unmounts += 1;
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        self.log.lock().unwrap().syncs += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotCall {
    Create(String),
    SendReceive {
        snapshot: String,
        baseline: Option<String>,
    },
    Delete(String),
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Default)]
pub struct FakeSnapshots {
    calls: Mutex<Vec<SnapshotCall>>,
}

impl FakeSnapshots {
    pub fn calls(&self) -> Vec<SnapshotCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotOps for FakeSnapshots {
    async fn create_read_only(&self, subvolume: &Path, snapshot: &Path) -> Result<()> {
        copy_tree(subvolume, snapshot)?;
        self.calls
            .lock()
            .unwrap()
            .push(SnapshotCall::Create(file_name(snapshot)));
        Ok(())
    }

    async fn send_receive(
        &self,
        snapshot: &Path,
        baseline: Option<&Path>,
        target_root: &Path,
    ) -> Result<()> {
        copy_tree(snapshot, &target_root.join(file_name(snapshot)))?;
        self.calls.lock().unwrap().push(SnapshotCall::SendReceive {
            snapshot: file_name(snapshot),
            baseline: baseline.map(file_name),
        });
        Ok(())
    }

    async fn delete(&self, snapshot: &Path) -> Result<()> {
        fs::remove_dir_all(snapshot)?;
        self.calls
            .lock()
            .unwrap()
            .push(SnapshotCall::Delete(file_name(snapshot)));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMirror {
    calls: Mutex<Vec<(String, MirrorOptions)>>,
}

impl FakeMirror {
    /// Destination directory names and options of every mirror call
    pub fn calls(&self) -> Vec<(String, MirrorOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mirror for FakeMirror {
    async fn mirror(
        &self,
        source: &Path,
        destination: &Path,
        options: MirrorOptions,
    ) -> Result<()> {
        if options.delete_before {
            fs::remove_dir_all(destination)?;
        }
        copy_tree(source, destination)?;
        self.calls
            .lock()
            .unwrap()
            .push((file_name(destination), options));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStore {
    persisted: Mutex<Vec<Registry>>,
}

impl FakeStore {
    pub fn persisted(&self) -> Vec<Registry> {
        self.persisted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryStore for FakeStore {
    async fn persist(&self, registry: &Registry) -> Result<()> {
        self.persisted.lock().unwrap().push(registry.clone());
        Ok(())
    }
}
