// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use backup_types::MirrorOptions;

use crate::Result;

/// File level tree synchronization
#[async_trait]
pub trait Mirror: Send + Sync {
    /// Make the content of `destination` equal to `source`
    async fn mirror(&self, source: &Path, destination: &Path, options: MirrorOptions)
    -> Result<()>;
}
