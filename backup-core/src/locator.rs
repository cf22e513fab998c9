// SPDX-License-Identifier: GPL-3.0-only

//! Snapshot discovery on a mounted volume

use std::fs;
use std::path::{Path, PathBuf};

use backup_contracts::{Result, ensure_invariant};
use backup_types::{SnapshotPattern, parse_snapshot_date};
use chrono::NaiveDate;
use tracing::{error, info};

/// All snapshots of the pattern's subvolume directly below `root`, sorted by name
pub fn list(root: &Path, pattern: &SnapshotPattern) -> Result<Vec<PathBuf>> {
    ensure_invariant(root.exists(), "snapshot directory exists")?;
    let mut snapshots = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str()
            && pattern.matches(name)
        {
            snapshots.push(entry.path());
        }
    }
    snapshots.sort();
    Ok(snapshots)
}

fn names(root: &Path, pattern: &SnapshotPattern) -> Result<Vec<String>> {
    Ok(list(root, pattern)?
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect())
}

/// Newest snapshot name present below both roots
pub fn common_ancestor(
    first: &Path,
    second: &Path,
    pattern: &SnapshotPattern,
) -> Result<Option<String>> {
    let first = names(first, pattern)?;
    let second = names(second, pattern)?;
    Ok(first.into_iter().filter(|name| second.contains(name)).max())
}

/// Slot to mirror the snapshot of `date` into
///
/// The slot is the snapshot of that date if present, otherwise the oldest
/// snapshot of the subvolume, which is then refreshed and renamed. Without
/// any snapshot an empty directory with the dated name is created.
pub fn oldest_or_create(
    root: &Path,
    pattern: &SnapshotPattern,
    date: NaiveDate,
) -> Result<PathBuf> {
    ensure_invariant(root.exists(), "snapshot directory exists")?;
    let current = root.join(pattern.name_for(date));
    if current.exists() {
        return Ok(current);
    }
    if let Some(oldest) = list(root, pattern)?.into_iter().min() {
        return Ok(oldest);
    }
    info!("create first backup directory {}", current.display());
    fs::create_dir(&current)?;
    Ok(current)
}

/// Attach the date suffix to every listed snapshot
///
/// Entries without a valid date are reported and left out, so they are never
/// considered for deletion.
pub fn dated(listing: Vec<PathBuf>) -> Vec<(PathBuf, NaiveDate)> {
    listing
        .into_iter()
        .filter_map(|path| {
            let date = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_snapshot_date);
            if date.is_none() {
                error!("ignore file looks like snapshot '{}'", path.display());
            }
            date.map(|date| (path, date))
        })
        .collect()
}
