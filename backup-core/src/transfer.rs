// SPDX-License-Identifier: GPL-3.0-only

//! Replication of a source snapshot onto a destination volume
//!
//! BTRFS destinations receive the snapshot itself through send/receive,
//! incrementally against the newest snapshot both volumes share. Any other
//! destination gets a file mirror of the snapshot; the oldest mirror on the
//! volume is refreshed in place and renamed afterwards, so a destination
//! only ever holds complete copies under dated names.

use std::path::Path;

use backup_contracts::{BackupError, Result, ensure_invariant};
use backup_types::{MirrorOptions, MountMode, VolumeConfig};
use tracing::{info, warn};

use crate::context::BackupContext;
use crate::locator;
use crate::mounts::settle;

/// Clone today's snapshot of `source` onto the BTRFS volume `destination`
pub async fn native_transfer(
    ctx: &mut BackupContext,
    source: &VolumeConfig,
    destination: &VolumeConfig,
) -> Result<()> {
    if !ctx.filesystem(&source.uuid).await?.supports_native_snapshots() {
        return Err(BackupError::failure(format!(
            "source volume {} has no BTRFS",
            source.name
        )));
    }
    if !ctx
        .filesystem(&destination.uuid)
        .await?
        .supports_native_snapshots()
    {
        return Err(BackupError::failure(format!(
            "destination volume {} has no BTRFS",
            destination.name
        )));
    }

    let destination_root = ctx
        .mounts
        .acquire(&destination.uuid, MountMode::ReadWrite)
        .await?;
    let result = send_if_missing(ctx, source, &destination_root).await;
    let released = ctx.mounts.release(&destination.uuid, false).await;
    settle(result, released)
}

async fn send_if_missing(
    ctx: &mut BackupContext,
    source: &VolumeConfig,
    destination_root: &Path,
) -> Result<()> {
    let name = ctx.snapshot_name(source);
    if destination_root.join(&name).exists() {
        info!("skip copy snapshot, snapshot {name} exists");
        return Ok(());
    }

    // read-only keeps the source unchanged while it is sent
    let source_root = ctx.mounts.acquire(&source.uuid, MountMode::ReadOnly).await?;
    let result = send(ctx, source, &source_root, destination_root).await;
    let released = ctx.mounts.release(&source.uuid, false).await;
    settle(result, released)
}

async fn send(
    ctx: &BackupContext,
    source: &VolumeConfig,
    source_root: &Path,
    destination_root: &Path,
) -> Result<()> {
    let name = ctx.snapshot_name(source);
    let snapshot = source_root.join(&name);
    if !snapshot.exists() {
        return Err(BackupError::failure(format!(
            "missing source snapshot {name}"
        )));
    }

    info!("copy snapshot {name}");
    let pattern = ctx.pattern(source);
    let baseline = locator::common_ancestor(source_root, destination_root, &pattern)?
        .map(|common| source_root.join(common));
    if let Some(baseline) = &baseline {
        info!("copy update to {}", baseline.display());
        ensure_invariant(baseline.exists(), "baseline snapshot exists")?;
    }

    ctx.snapshots
        .send_receive(&snapshot, baseline.as_deref(), destination_root)
        .await?;
    if !destination_root.join(&name).exists() {
        return Err(BackupError::failure(format!(
            "snapshot {name} is missing on the destination after receive"
        )));
    }
    info!("snapshot {name} is copied");
    Ok(())
}

/// Mirror the files of today's snapshot of `source` onto `destination`
pub async fn mirror_transfer(
    ctx: &mut BackupContext,
    source: &VolumeConfig,
    destination: &VolumeConfig,
) -> Result<()> {
    let filesystem = ctx.filesystem(&destination.uuid).await?;
    if filesystem.supports_native_snapshots() {
        warn!("copy files to BTRFS volume {}", destination.name);
    }
    let options = MirrorOptions::for_fat(filesystem.is_fat());

    let destination_root = ctx
        .mounts
        .acquire(&destination.uuid, MountMode::ReadWrite)
        .await?;
    let result = mirror_if_missing(ctx, source, &destination_root, options).await;
    let released = ctx.mounts.release(&destination.uuid, false).await;
    settle(result, released)
}

async fn mirror_if_missing(
    ctx: &mut BackupContext,
    source: &VolumeConfig,
    destination_root: &Path,
    options: MirrorOptions,
) -> Result<()> {
    let name = ctx.snapshot_name(source);
    if destination_root.join(&name).exists() {
        info!("skip copy files, destination {name} exists");
        return Ok(());
    }

    let source_root = ctx.mounts.acquire(&source.uuid, MountMode::ReadOnly).await?;
    let result = mirror(ctx, source, &source_root, destination_root, options).await;
    let released = ctx.mounts.release(&source.uuid, false).await;
    settle(result, released)
}

async fn mirror(
    ctx: &BackupContext,
    source: &VolumeConfig,
    source_root: &Path,
    destination_root: &Path,
    options: MirrorOptions,
) -> Result<()> {
    let name = ctx.snapshot_name(source);
    let snapshot = source_root.join(&name);
    if !snapshot.exists() {
        return Err(BackupError::failure(format!(
            "missing source snapshot {name}"
        )));
    }

    info!("copy files from snapshot {name}");
    let slot = locator::oldest_or_create(destination_root, &ctx.pattern(source), ctx.run_date)?;
    info!("rsync from {} to {}", snapshot.display(), slot.display());
    ctx.mirror.mirror(&snapshot, &slot, options).await?;

    // Only a complete copy gets the current name.
    let target = destination_root.join(&name);
    if slot != target {
        info!("rename {} to {}", slot.display(), target.display());
        tokio::fs::rename(&slot, &target).await?;
    }
    info!("files {name} are copied");
    Ok(())
}
