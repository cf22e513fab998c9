// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use backup_types::DeviceInfo;

use crate::Result;

/// Block device state lookup; implementations must not cache
#[async_trait]
pub trait DeviceInspector: Send + Sync {
    /// Filesystem type and current mount point of the device with this UUID
    async fn query(&self, uuid: &str) -> Result<DeviceInfo>;

    /// UUIDs of all connected block devices
    async fn connected_uuids(&self) -> Result<Vec<String>>;
}
