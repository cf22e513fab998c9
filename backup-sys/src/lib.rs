// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for the backup engine
//!
//! This crate implements the engine's collaborator contracts on top of the
//! usual command line tools:
//! - `lsblk` for device inspection
//! - `mount`, `umount` and `sync` for the mount lifecycle
//! - `rsync` for file mirroring
//!
//! All of them need root privileges.

pub mod cmd;
pub mod error;
pub mod lsblk;
pub mod mount;
pub mod rsync;

pub use error::{Result, SysError};
pub use lsblk::LsblkInspector;
pub use mount::SystemMounter;
pub use rsync::RsyncMirror;
