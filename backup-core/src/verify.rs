// SPDX-License-Identifier: GPL-3.0-only

//! Spot checks of a copy against its origin
//!
//! Comparing whole trees would take as long as the copy itself. Instead a
//! few recently modified files are sampled, preferring recently changed
//! directories, and compared byte by byte. Problems are logged and counted,
//! they never stop a backup.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use backup_contracts::{Result, ensure_invariant};
use backup_types::{MountMode, VolumeConfig};
use tracing::{error, info};

use crate::context::BackupContext;
use crate::mounts::settle;

/// Files compared per check
pub const CHECK_FILE_COUNT: usize = 30;

/// Directory levels the sampler descends
const MAX_DEPTH: usize = 10;

/// Sub-directories are only visited while more samples than this are missing
const DESCEND_THRESHOLD: usize = 3;

/// Most recently modified files taken from one directory
const FILES_PER_DIRECTORY: usize = 3;

const COMPARE_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub compared: usize,
    pub matching: usize,
    pub differing: usize,
}

enum Work {
    Enter { directory: PathBuf, depth: usize },
    Files { directory: PathBuf },
}

fn log_sampling_error(error: &io::Error) {
    if error.kind() != ErrorKind::PermissionDenied {
        error!("unhandled error during file check: {error}");
    }
}

/// Entries of `directory` matching `keep`, oldest first
fn entries_by_mtime(
    directory: &Path,
    keep: impl Fn(&fs::FileType) -> bool,
) -> io::Result<Vec<(SystemTime, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        // file_type() and metadata() of a DirEntry do not follow symlinks
        if !keep(&entry.file_type()?) {
            continue;
        }
        entries.push((entry.metadata()?.modified()?, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

/// Pick up to `budget` regular files below `root`
///
/// Newer sub-directories are visited first, each directory contributes its
/// newest files after its sub-directories. Files modified at or after
/// `cutoff` are skipped.
pub fn sample_files(root: &Path, cutoff: Option<SystemTime>, budget: usize) -> Vec<PathBuf> {
    let mut samples = Vec::new();
    let mut stack = vec![Work::Enter {
        directory: root.to_path_buf(),
        depth: MAX_DEPTH,
    }];

    while let Some(work) = stack.pop() {
        let remaining = budget - samples.len();
        if remaining == 0 {
            break;
        }
        match work {
            Work::Enter { directory, depth } => {
                let descend = depth > 0 && remaining > DESCEND_THRESHOLD;
                let subdirectories = if descend {
                    match entries_by_mtime(&directory, |kind| kind.is_dir()) {
                        Ok(subdirectories) => subdirectories,
                        Err(e) => {
                            log_sampling_error(&e);
                            Vec::new()
                        }
                    }
                } else {
                    Vec::new()
                };
                stack.push(Work::Files { directory });
                // the newest directory ends up on top of the stack
                for (_, subdirectory) in subdirectories {
                    stack.push(Work::Enter {
                        directory: subdirectory,
                        depth: depth - 1,
                    });
                }
            }
            Work::Files { directory } => {
                let files = match entries_by_mtime(&directory, |kind| kind.is_file()) {
                    Ok(files) => files,
                    Err(e) => {
                        log_sampling_error(&e);
                        continue;
                    }
                };
                samples.extend(
                    files
                        .into_iter()
                        .rev()
                        .filter(|(modified, _)| cutoff.is_none_or(|cutoff| *modified < cutoff))
                        .take(FILES_PER_DIRECTORY.min(remaining))
                        .map(|(_, path)| path),
                );
            }
        }
    }
    samples
}

/// Byte-wise equality of two files
pub fn files_equal(left: &Path, right: &Path) -> io::Result<bool> {
    if fs::metadata(left)?.len() != fs::metadata(right)?.len() {
        return Ok(false);
    }
    let mut left = File::open(left)?;
    let mut right = File::open(right)?;
    let mut left_buffer = vec![0u8; COMPARE_CHUNK];
    let mut right_buffer = vec![0u8; COMPARE_CHUNK];
    loop {
        let read = left.read(&mut left_buffer)?;
        if read == 0 {
            // equal length, so the other file is exhausted as well
            return Ok(right.read(&mut right_buffer[..1])? == 0);
        }
        right.read_exact(&mut right_buffer[..read])?;
        if left_buffer[..read] != right_buffer[..read] {
            return Ok(false);
        }
    }
}

/// Sample files below `origin` and compare them with their counterparts below `copy`
pub fn compare_trees(origin: &Path, copy: &Path, cutoff: Option<SystemTime>) -> VerifyReport {
    let samples = sample_files(origin, cutoff, CHECK_FILE_COUNT);
    info!("compare {} files to check the backup", samples.len());

    let mut report = VerifyReport::default();
    for sample in samples {
        let Ok(relative) = sample.strip_prefix(origin) else {
            continue;
        };
        let counterpart = copy.join(relative);
        report.compared += 1;
        match files_equal(&sample, &counterpart) {
            Ok(true) => report.matching += 1,
            Ok(false) => {
                report.differing += 1;
                error!(
                    "differing backup file found: '{}' <> '{}'",
                    sample.display(),
                    counterpart.display()
                );
            }
            Err(e) => {
                report.differing += 1;
                error!(
                    "can not compare '{}' with '{}': {e}",
                    sample.display(),
                    counterpart.display()
                );
            }
        }
    }

    info!(
        "backup files compared: {} are ok, {} are different",
        report.matching, report.differing
    );
    if report.differing > 0 {
        error!("found {} differing backup files", report.differing);
    }
    report
}

/// Check today's snapshot of `source` against the live subvolume, or, with a
/// destination, the destination's copy against the snapshot
pub async fn check_copied(
    ctx: &mut BackupContext,
    source: &VolumeConfig,
    destination: Option<&VolumeConfig>,
) -> Result<VerifyReport> {
    let source_root = ctx.mounts.acquire(&source.uuid, MountMode::ReadOnly).await?;
    let result = match destination {
        Some(destination) => check_replica(ctx, source, destination, &source_root).await,
        None => {
            let origin = source_root.join(&source.subvolume);
            let snapshot = source_root.join(ctx.snapshot_name(source));
            ensure_invariant(origin.exists(), "source subvolume exists")
                .map(|()| compare_trees(&origin, &snapshot, ctx.source_cutoff()))
        }
    };
    let released = ctx.mounts.release(&source.uuid, false).await;
    let report = settle(result, released)?;
    info!("all files compared");
    Ok(report)
}

async fn check_replica(
    ctx: &mut BackupContext,
    source: &VolumeConfig,
    destination: &VolumeConfig,
    source_root: &Path,
) -> Result<VerifyReport> {
    let destination_root = ctx
        .mounts
        .acquire(&destination.uuid, MountMode::ReadOnly)
        .await?;
    let name = ctx.snapshot_name(source);
    let origin = source_root.join(&name);
    let result = ensure_invariant(origin.exists(), "source snapshot exists")
        // both sides are snapshots, nothing changes after the cutoff
        .map(|()| compare_trees(&origin, &destination_root.join(&name), None));
    let released = ctx.mounts.release(&destination.uuid, false).await;
    settle(result, released)
}
