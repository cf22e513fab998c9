// SPDX-License-Identifier: GPL-3.0-only

//! Backup engine
//!
//! Everything here works against the collaborator traits of
//! `backup-contracts`; the real implementations live in `backup-sys` and
//! `backup-btrfs` and are wired together by the binary.
//!
//! A run processes its targets one after another on a single task:
//!
//! 1. create (or reuse) today's read-only snapshot on the source volume
//! 2. verify the snapshot against the live subvolume
//! 3. replicate it to the destination, natively or by mirroring files
//! 4. verify the replica against the snapshot
//!
//! After the queue the registry is persisted and old snapshots are thinned
//! out. All mounts are released whatever happened.

pub mod context;
pub mod locator;
pub mod mounts;
pub mod orchestrator;
pub mod retention;
pub mod transfer;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{BackupContext, Collaborators};
pub use mounts::{MountHandle, MountTable};
pub use orchestrator::{RunSummary, resolve_targets, run};
pub use retention::plan_thinning;
pub use verify::{CHECK_FILE_COUNT, VerifyReport};
