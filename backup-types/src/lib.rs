// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for ubackup
//!
//! This crate defines the data shared between the backup engine and the
//! collaborators it drives:
//!
//! - **backup-contracts**: Collaborator traits take and return these types
//! - **backup-core**: The engine reads the registry and produces snapshots by these names
//! - **backup-app**: Loads the registry from the configuration file and persists it again
//!
//! Snapshot names are an on-disk contract: `<subvolume>-Snapshot-<YYYY-MM-DD>`.

pub mod device;
pub mod mirror;
pub mod mount;
pub mod registry;
pub mod snapshot;
pub mod volume;

pub use device::{DeviceInfo, FilesystemKind};
pub use mirror::{LinkHandling, MetadataPreservation, MirrorOptions};
pub use mount::{MountMode, MountOptions, MountSource};
pub use registry::{Registry, ValidationError};
pub use snapshot::{SNAPSHOT_NAME_MIDDLE, SnapshotPattern, parse_snapshot_date};
pub use volume::{KeepCounts, RetentionPolicy, VolumeConfig, VolumeRole};
