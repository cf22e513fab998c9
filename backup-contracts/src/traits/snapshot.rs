// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// Native snapshot primitives of a copy-on-write filesystem
#[async_trait]
pub trait SnapshotOps: Send + Sync {
    /// Create a read-only snapshot of `subvolume` at `snapshot`
    async fn create_read_only(&self, subvolume: &Path, snapshot: &Path) -> Result<()>;

    /// Clone `snapshot` into the directory `target_root`, incrementally
    /// against `baseline` when one is given
    async fn send_receive(
        &self,
        snapshot: &Path,
        baseline: Option<&Path>,
        target_root: &Path,
    ) -> Result<()>;

    async fn delete(&self, snapshot: &Path) -> Result<()>;
}
