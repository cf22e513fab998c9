// SPDX-License-Identifier: GPL-3.0-only

//! File mirroring through `rsync`

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use backup_contracts::{Mirror, Result as BackupResult};
use backup_types::{LinkHandling, MetadataPreservation, MirrorOptions};
use tracing::info;
use which::which;

use crate::cmd;
use crate::error::{Result, SysError};

/// Trailing slash so rsync copies the content of `path`, not `path` itself
fn as_tree(path: &Path) -> OsString {
    let mut tree = path.as_os_str().to_os_string();
    if !tree.to_string_lossy().ends_with('/') {
        tree.push("/");
    }
    tree
}

/// Arguments of an rsync mirror call
///
/// Without archive mode (FAT volumes) ownership and permissions are dropped,
/// only links staying inside the tree are copied and the modification time
/// window is widened so a daylight saving shift does not copy everything again.
pub fn rsync_args(
    source: &Path,
    destination: &Path,
    options: MirrorOptions,
    verbose: bool,
) -> Vec<OsString> {
    let mut args = cmd::args(["--one-file-system"]);
    if options.delete_before {
        args.push(OsString::from("--delete-before"));
    }
    match options.preserve {
        MetadataPreservation::Archive => args.push(OsString::from("--archive")),
        MetadataPreservation::TimesOnly => {
            args.extend(cmd::args(["--times", "--recursive"]));
        }
    }
    if options.links == LinkHandling::SafeOnly {
        args.push(OsString::from("--safe-links"));
    }
    if options.modify_window_secs > 0 {
        args.push(OsString::from(format!(
            "--modify-window={}",
            options.modify_window_secs
        )));
    }
    if verbose {
        args.push(OsString::from("--verbose"));
    }
    args.push(as_tree(source));
    args.push(as_tree(destination));
    args
}

/// [`Mirror`] backed by the `rsync` tool
#[derive(Debug, Clone)]
pub struct RsyncMirror {
    binary_path: PathBuf,
    verbose: bool,
}

impl RsyncMirror {
    pub fn new(verbose: bool) -> Result<Self> {
        let binary_path = which("rsync").map_err(|_| SysError::ToolNotFound("rsync"))?;
        info!("Found rsync binary at {:?}", binary_path);
        Ok(Self {
            binary_path,
            verbose,
        })
    }
}

#[async_trait]
impl Mirror for RsyncMirror {
    async fn mirror(
        &self,
        source: &Path,
        destination: &Path,
        options: MirrorOptions,
    ) -> BackupResult<()> {
        info!("rsync from {} to {}", source.display(), destination.display());
        let args = rsync_args(source, destination, options, self.verbose);
        cmd::run(&self.binary_path, &args).await?;
        Ok(())
    }
}
