// SPDX-License-Identifier: GPL-3.0-only

pub mod error;
pub mod traits;

pub use error::{BackupError, Result, ensure_invariant};
pub use traits::{DeviceInspector, Mirror, Mounter, RegistryStore, SnapshotOps};
