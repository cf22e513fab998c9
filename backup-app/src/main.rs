// SPDX-License-Identifier: GPL-3.0-only

//! ubackup - snapshot BTRFS subvolumes and copy them to backup volumes
//!
//! Exit status is 0 only if every requested target was snapshotted, copied
//! and thinned without error.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use backup_btrfs::SubvolumeManager;
use backup_core::{BackupContext, Collaborators, resolve_targets, run};
use backup_sys::{LsblkInspector, RsyncMirror, SystemMounter};
use chrono::Local;
use clap::Parser;
use nix::unistd::geteuid;
use tracing::{error, info};

mod cli;
mod config;
mod logging;

use cli::Cli;
use config::ConfigFile;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ubackup: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(cli.verbose, config.logging.as_ref());
    info!(
        "Loaded configuration {}, ubackup {} runs",
        config.path.display(),
        env!("CARGO_PKG_VERSION")
    );

    match backup(&cli, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("ABORT ON ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<ConfigFile> {
    let path = match &cli.conf {
        Some(path) => path.clone(),
        None => config::default_path().with_context(|| {
            format!(
                "no {} found beside the program, in the working directory or in ~/.config",
                config::CONFIG_FILE_NAME
            )
        })?,
    };
    ConfigFile::load(&path)
}

async fn backup(cli: &Cli, config: &ConfigFile) -> Result<bool> {
    if !geteuid().is_root() {
        bail!("Backup mounts the volumes. So it must run as root.");
    }

    // -vv passes --verbose on to the called tools
    let tools_verbose = cli.verbose >= 2;
    let collaborators = Collaborators {
        devices: Arc::new(LsblkInspector::new()?),
        mounter: Arc::new(SystemMounter::new(tools_verbose)?),
        snapshots: Arc::new(SubvolumeManager::new(tools_verbose)?),
        mirror: Arc::new(RsyncMirror::new(tools_verbose)?),
        store: Arc::new(config.store()),
    };
    let mut ctx = BackupContext::new(config.registry(), collaborators, Local::now().date_naive());

    let targets = resolve_targets(&ctx, &cli.destinations, cli.all).await?;
    let summary = run(&mut ctx, &targets).await;
    info!(
        "finished: {} completed, {} rejected, {} snapshots deleted",
        summary.completed.len(),
        summary.rejected.len(),
        summary.deleted
    );
    Ok(summary.success())
}
