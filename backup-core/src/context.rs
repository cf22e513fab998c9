// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use backup_contracts::{DeviceInspector, Mirror, Mounter, RegistryStore, Result, SnapshotOps};
use backup_types::{FilesystemKind, Registry, SnapshotPattern, VolumeConfig};
use chrono::{Local, NaiveDate, TimeZone};

use crate::mounts::MountTable;

/// The external collaborators a run drives
#[derive(Clone)]
pub struct Collaborators {
    pub devices: Arc<dyn DeviceInspector>,
    pub mounter: Arc<dyn Mounter>,
    pub snapshots: Arc<dyn SnapshotOps>,
    pub mirror: Arc<dyn Mirror>,
    pub store: Arc<dyn RegistryStore>,
}

/// State of one backup run, handed to every engine operation
pub struct BackupContext {
    pub registry: Registry,
    pub mounts: MountTable,
    pub devices: Arc<dyn DeviceInspector>,
    pub snapshots: Arc<dyn SnapshotOps>,
    pub mirror: Arc<dyn Mirror>,
    pub store: Arc<dyn RegistryStore>,
    /// Date part of every snapshot name created in this run
    pub run_date: NaiveDate,
}

impl BackupContext {
    pub fn new(registry: Registry, collaborators: Collaborators, run_date: NaiveDate) -> Self {
        let Collaborators {
            devices,
            mounter,
            snapshots,
            mirror,
            store,
        } = collaborators;
        Self {
            registry,
            mounts: MountTable::new(devices.clone(), mounter),
            devices,
            snapshots,
            mirror,
            store,
            run_date,
        }
    }

    /// Create the per-run mount directory below `parent` instead of the runtime directory
    pub fn with_work_parent(mut self, parent: PathBuf) -> Self {
        self.mounts = self.mounts.with_work_parent(parent);
        self
    }

    pub fn pattern(&self, volume: &VolumeConfig) -> SnapshotPattern {
        SnapshotPattern::new(volume.subvolume.as_str())
    }

    /// Name of this run's snapshot of the volume's subvolume
    pub fn snapshot_name(&self, volume: &VolumeConfig) -> String {
        self.pattern(volume).name_for(self.run_date)
    }

    /// Live source files changed at or after this instant are not compared
    /// against the snapshot: local midnight at the start of the day before
    /// the run date.
    pub fn source_cutoff(&self) -> Option<SystemTime> {
        let midnight = self.run_date.pred_opt()?.and_hms_opt(0, 0, 0)?;
        Local
            .from_local_datetime(&midnight)
            .earliest()
            .map(SystemTime::from)
    }

    pub async fn filesystem(&self, uuid: &str) -> Result<FilesystemKind> {
        Ok(self.devices.query(uuid).await?.filesystem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevices, FakeMirror, FakeMounter, FakeSnapshots, FakeStore};

    fn context(run_date: NaiveDate) -> BackupContext {
        let collaborators = Collaborators {
            devices: Arc::new(FakeDevices::default()),
            mounter: Arc::new(FakeMounter::new()),
            snapshots: Arc::new(FakeSnapshots::default()),
            mirror: Arc::new(FakeMirror::default()),
            store: Arc::new(FakeStore::default()),
        };
        BackupContext::new(Registry::default(), collaborators, run_date)
    }

    fn local_midnight(year: i32, month: u32, day: u32) -> Option<SystemTime> {
        Local
            .with_ymd_and_hms(year, month, day, 0, 0, 0)
            .earliest()
            .map(SystemTime::from)
    }

    #[test]
    fn source_cutoff_is_start_of_previous_day() {
        let ctx = context(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(ctx.source_cutoff(), local_midnight(2024, 3, 9));

        let ctx = context(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(ctx.source_cutoff(), local_midnight(2023, 12, 31));
    }
}
