// SPDX-License-Identifier: GPL-3.0-only

//! Thinning of old snapshots on BTRFS volumes
//!
//! Three passes run over the snapshots, newest first: `day` keeps the
//! latest n snapshots at least a day apart, `month` then one snapshot per 30
//! days, `year` one per 365 days. Everything not kept is deleted, except
//! snapshots some volume still records as its last snapshot; those are the
//! baselines of incremental transfers.

use std::path::PathBuf;

use backup_contracts::{BackupError, Result, ensure_invariant};
use backup_types::{MountMode, RetentionPolicy, SNAPSHOT_NAME_MIDDLE, VolumeConfig};
use chrono::{Duration, NaiveDate};
use tracing::info;

use crate::context::BackupContext;
use crate::locator;
use crate::mounts::settle;

/// Snapshots to delete out of `snapshots`
///
/// Fails with a program fault, deleting nothing, if the plan would leave
/// fewer than `max(1, policy.day)` snapshots.
pub fn plan_thinning(
    mut snapshots: Vec<(PathBuf, NaiveDate)>,
    policy: RetentionPolicy,
    protected: &[NaiveDate],
) -> Result<Vec<PathBuf>> {
    let total = snapshots.len();
    snapshots.sort_by_key(|(_, date)| *date);

    let mut undecided = snapshots;
    let mut discarded: Vec<(PathBuf, NaiveDate)> = Vec::new();
    for (keep, width) in [(policy.day, 1), (policy.month, 30), (policy.year, 365)] {
        if undecided.is_empty() && !discarded.is_empty() {
            // Nothing left at the regular distance, give the discarded ones
            // another chance in this coarser pass.
            undecided = std::mem::take(&mut discarded);
            undecided.sort_by_key(|(_, date)| *date);
        }
        let mut keep = keep;
        while keep > 0
            && let Some((_, anchor)) = undecided.pop()
        {
            keep -= 1;
            let floor = anchor - Duration::days(width);
            while undecided.last().is_some_and(|(_, date)| *date > floor) {
                if let Some(item) = undecided.pop() {
                    discarded.push(item);
                }
            }
        }
    }
    discarded.append(&mut undecided);
    discarded.retain(|(_, date)| !protected.contains(date));

    let max_delete = total.saturating_sub(policy.day.max(1) as usize);
    if discarded.len() > max_delete {
        return Err(BackupError::fault(format!(
            "the delete list is too long: {} of {total} snapshots",
            discarded.len()
        )));
    }

    let mut doomed = Vec::with_capacity(discarded.len());
    for (path, _) in discarded {
        let is_snapshot = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.find(SNAPSHOT_NAME_MIDDLE))
            .is_some_and(|position| position > 0);
        ensure_invariant(is_snapshot, "only snapshots are deleted")?;
        doomed.push(path);
    }
    doomed.sort();
    Ok(doomed)
}

/// Thin out the snapshots of `volume`'s subvolume on its (BTRFS) device
pub async fn thin_away(ctx: &mut BackupContext, volume: &VolumeConfig) -> Result<usize> {
    ensure_invariant(
        ctx.filesystem(&volume.uuid).await?.supports_native_snapshots(),
        "thinning runs on BTRFS only",
    )?;
    let root = ctx.mounts.acquire(&volume.uuid, MountMode::ReadWrite).await?;
    let result = delete_old(ctx, volume, root).await;
    let released = ctx.mounts.release(&volume.uuid, false).await;
    settle(result, released)
}

async fn delete_old(ctx: &BackupContext, volume: &VolumeConfig, root: PathBuf) -> Result<usize> {
    let snapshots = locator::dated(locator::list(&root, &ctx.pattern(volume))?);

    let recorded = ctx.registry.last_snapshot_dates(&volume.subvolume);
    ensure_invariant(!recorded.is_empty(), "subvolume is registered")?;
    let protected: Vec<NaiveDate> = recorded.into_iter().flatten().collect();

    let doomed = plan_thinning(snapshots, volume.retention(), &protected)?;
    for path in &doomed {
        info!(
            "delete old snapshot {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        ctx.snapshots.delete(path).await?;
    }
    Ok(doomed.len())
}
