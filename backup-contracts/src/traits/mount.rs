// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use backup_types::{MountOptions, MountSource};

use crate::Result;

/// Raw mount primitives; a non-zero exit of the underlying tool is an error
#[async_trait]
pub trait Mounter: Send + Sync {
    async fn mount(&self, source: &MountSource, target: &Path, options: MountOptions)
    -> Result<()>;

    async fn unmount(&self, target: &Path) -> Result<()>;

    /// Flush filesystem caches to the storage devices
    async fn sync(&self) -> Result<()>;
}
