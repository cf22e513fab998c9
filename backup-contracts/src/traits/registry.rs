// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use backup_types::Registry;

use crate::Result;

/// Persistence of the volume registry
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Write the registry back; called once after all targets were processed
    async fn persist(&self, registry: &Registry) -> Result<()>;
}
