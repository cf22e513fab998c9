// SPDX-License-Identifier: GPL-3.0-only

use backup_contracts::{BackupError, Result};
use backup_types::{MountMode, VolumeConfig};
use tracing::{error, info, warn};

use crate::context::BackupContext;
use crate::mounts::settle;
use crate::retention::thin_away;
use crate::transfer::{mirror_transfer, native_transfer};
use crate::verify::{VerifyReport, check_copied};

/// Outcome of a complete run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Targets whose snapshot and transfer finished
    pub completed: Vec<String>,
    /// Targets rejected before any work was done on them
    pub rejected: Vec<String>,
    pub reports: Vec<VerifyReport>,
    /// Snapshots deleted by thinning
    pub deleted: usize,
    /// The error that stopped the run
    pub aborted: Option<BackupError>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.rejected.is_empty() && self.aborted.is_none()
    }
}

/// Names of all configured volumes whose device is connected right now
pub async fn collect_all(ctx: &BackupContext) -> Result<Vec<String>> {
    let connected = ctx.devices.connected_uuids().await?;
    let names = ctx.registry.names_on(&connected);
    info!("connected are: {}", names.join(", "));
    Ok(names)
}

/// Targets of the run: the given names, or every connected volume
pub async fn resolve_targets(
    ctx: &BackupContext,
    explicit: &[String],
    all: bool,
) -> Result<Vec<String>> {
    if all {
        let names = collect_all(ctx).await?;
        if names.is_empty() {
            warn!("no configured volumes are online");
        }
        return Ok(names);
    }
    if explicit.is_empty() {
        return Err(BackupError::failure("no backup destinations given"));
    }
    Ok(explicit.to_vec())
}

/// A validated target: a source alone, or a destination with its source
fn plan_target(ctx: &BackupContext, target: &str) -> Result<(VolumeConfig, Option<VolumeConfig>)> {
    let volume = ctx.registry.check_item(target)?;
    if volume.is_destination() {
        let source = ctx.registry.source_for(target)?.clone();
        Ok((source, Some(volume.clone())))
    } else {
        Ok((ctx.registry.check_source(target)?.clone(), None))
    }
}

/// Make sure today's read-only snapshot of `source` exists
pub async fn make_snapshot(ctx: &mut BackupContext, source: &VolumeConfig) -> Result<()> {
    if !ctx.filesystem(&source.uuid).await?.supports_native_snapshots() {
        return Err(BackupError::failure(format!(
            "source volume {} has no BTRFS",
            source.name
        )));
    }
    // a snapshot follows most of the time, so a writable mount is fine
    let root = ctx.mounts.acquire(&source.uuid, MountMode::Either).await?;
    let result = snapshot_if_missing(ctx, source, root).await;
    let released = ctx.mounts.release(&source.uuid, false).await;
    settle(result, released)
}

async fn snapshot_if_missing(
    ctx: &mut BackupContext,
    source: &VolumeConfig,
    root: std::path::PathBuf,
) -> Result<()> {
    let name = ctx.snapshot_name(source);
    if root.join(&name).exists() {
        info!("skip snapshot creation, snapshot {name} exists");
        return Ok(());
    }
    let root = ctx.mounts.acquire(&source.uuid, MountMode::ReadWrite).await?;
    info!("create source snapshot {name}");
    ctx.snapshots
        .create_read_only(&root.join(&source.subvolume), &root.join(&name))
        .await?;
    info!("source snapshot {name} is created");
    Ok(())
}

/// Snapshot the target's source and, for a destination, replicate the snapshot
pub async fn backup_to(
    ctx: &mut BackupContext,
    source: &VolumeConfig,
    destination: Option<&VolumeConfig>,
    reports: &mut Vec<VerifyReport>,
) -> Result<()> {
    info!("snapshot {}", source.name);
    make_snapshot(ctx, source).await?;
    reports.push(check_copied(ctx, source, None).await?);
    ctx.registry.set_last_snapshot(&source.name, ctx.run_date)?;

    let Some(destination) = destination else {
        return Ok(());
    };
    info!("backup from {} to {}", source.name, destination.name);
    if ctx
        .filesystem(&destination.uuid)
        .await?
        .supports_native_snapshots()
    {
        native_transfer(ctx, source, destination).await?;
    } else {
        mirror_transfer(ctx, source, destination).await?;
    }
    reports.push(check_copied(ctx, source, Some(destination)).await?);
    ctx.registry
        .set_last_snapshot(&destination.name, ctx.run_date)?;
    Ok(())
}

async fn run_queue(
    ctx: &mut BackupContext,
    targets: &[String],
    summary: &mut RunSummary,
) -> Result<()> {
    info!("creating backups with date {}", ctx.run_date);
    let mut touched: Vec<VolumeConfig> = Vec::new();

    for target in targets {
        let (source, destination) = match plan_target(ctx, target) {
            Ok(plan) => plan,
            Err(e) => {
                error!("invalid backup destination {target}: {e}");
                summary.rejected.push(target.clone());
                continue;
            }
        };
        backup_to(ctx, &source, destination.as_ref(), &mut summary.reports).await?;
        summary.completed.push(target.clone());
        for volume in [Some(source), destination].into_iter().flatten() {
            if !touched.iter().any(|known| known.name == volume.name) {
                touched.push(volume);
            }
        }
    }

    if ctx.registry.is_changed() {
        info!("store last snapshot dates");
        ctx.store.persist(&ctx.registry).await?;
    }

    // Other filesystems keep a fixed number of copies: the oldest one is
    // refreshed by the next mirror.
    for volume in &touched {
        if ctx.filesystem(&volume.uuid).await?.supports_native_snapshots() {
            summary.deleted += thin_away(ctx, volume).await?;
        }
    }
    Ok(())
}

/// Process all targets in order and release every mount afterwards
pub async fn run(ctx: &mut BackupContext, targets: &[String]) -> RunSummary {
    let mut summary = RunSummary::default();
    if let Err(e) = run_queue(ctx, targets, &mut summary).await {
        error!("ABORT ON ERROR: {e}");
        summary.aborted = Some(e);
    }
    if let Err(e) = ctx.mounts.release_all().await {
        error!("cleanup failed: {e}");
        summary.aborted.get_or_insert(e);
    }
    summary
}
