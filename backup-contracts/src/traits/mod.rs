// SPDX-License-Identifier: GPL-3.0-only

pub mod device;
pub mod mirror;
pub mod mount;
pub mod registry;
pub mod snapshot;

pub use device::DeviceInspector;
pub use mirror::Mirror;
pub use mount::Mounter;
pub use registry::RegistryStore;
pub use snapshot::SnapshotOps;
