// SPDX-License-Identifier: GPL-3.0-only

//! `mount`, `umount` and `sync` wrappers

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use backup_contracts::{Mounter, Result as BackupResult};
use backup_types::{MountOptions, MountSource};
use tracing::info;
use which::which;

use crate::cmd;
use crate::error::{Result, SysError};

/// Arguments of a `mount` call; `--no-mtab` keeps the backup mounts out of /etc/mtab
pub fn mount_args(
    source: &MountSource,
    target: &Path,
    options: MountOptions,
    verbose: bool,
) -> Vec<OsString> {
    let mut args = Vec::new();
    if verbose {
        args.push(OsString::from("--verbose"));
    }
    args.extend(cmd::args(["--no-mtab", "--options"]));
    args.push(OsString::from(options.render()));
    args.push(OsString::from("--target"));
    args.push(target.as_os_str().to_os_string());
    match source {
        MountSource::Uuid(uuid) => {
            args.push(OsString::from("--uuid"));
            args.push(OsString::from(uuid));
        }
        MountSource::Bind(path) => {
            args.push(OsString::from("--bind"));
            args.push(path.as_os_str().to_os_string());
        }
    }
    args
}

pub fn umount_args(target: &Path, verbose: bool) -> Vec<OsString> {
    let mut args = Vec::new();
    if verbose {
        args.push(OsString::from("--verbose"));
    }
    args.extend(cmd::args(["--lazy", "--no-mtab"]));
    args.push(target.as_os_str().to_os_string());
    args
}

/// [`Mounter`] calling the system tools
#[derive(Debug, Clone)]
pub struct SystemMounter {
    mount_path: PathBuf,
    umount_path: PathBuf,
    sync_path: PathBuf,
    verbose: bool,
}

impl SystemMounter {
    pub fn new(verbose: bool) -> Result<Self> {
        Ok(Self {
            mount_path: which("mount").map_err(|_| SysError::ToolNotFound("mount"))?,
            umount_path: which("umount").map_err(|_| SysError::ToolNotFound("umount"))?,
            sync_path: which("sync").map_err(|_| SysError::ToolNotFound("sync"))?,
            verbose,
        })
    }
}

#[async_trait]
impl Mounter for SystemMounter {
    async fn mount(
        &self,
        source: &MountSource,
        target: &Path,
        options: MountOptions,
    ) -> BackupResult<()> {
        let args = mount_args(source, target, options, self.verbose);
        cmd::run(&self.mount_path, &args).await?;
        info!("mounted {:?} on {}", source, target.display());
        Ok(())
    }

    async fn unmount(&self, target: &Path) -> BackupResult<()> {
        cmd::run(&self.umount_path, &umount_args(target, self.verbose)).await?;
        Ok(())
    }

    async fn sync(&self) -> BackupResult<()> {
        cmd::run(&self.sync_path, &[]).await?;
        Ok(())
    }
}
