// SPDX-License-Identifier: GPL-3.0-only

//! BTRFS operations library for ubackup
//!
//! This library provides the native snapshot primitives the backup engine
//! needs: read-only snapshot creation, snapshot deletion and the
//! `btrfs send | btrfs receive` pipeline used to clone snapshots between
//! volumes.

pub mod error;
pub mod pipeline;
pub mod subvolume;

// Re-export commonly used types
pub use error::{BtrfsError, Result};
pub use pipeline::send_receive;
pub use subvolume::SubvolumeManager;

// Re-export btrfsutil types for convenience
#[cfg(feature = "libbtrfsutil")]
pub use btrfsutil;
