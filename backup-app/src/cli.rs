// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Backup BTRFS subvolumes
///
/// Creates a dated read-only snapshot of the source subvolume and copies it to
/// the destination volume: by `btrfs send`/`receive` onto BTRFS volumes, by
/// `rsync` onto all others. Old snapshots on BTRFS volumes are thinned out as
/// configured by `keep`.
#[derive(Debug, Parser)]
#[command(name = "ubackup", version)]
pub struct Cli {
    /// Backup to this destination, or only snapshot this source
    #[arg(value_name = "DESTINATION")]
    pub destinations: Vec<String>,

    /// Configuration file name
    #[arg(short = 'C', long = "conf", value_name = "CONFIG")]
    pub conf: Option<PathBuf>,

    /// 1: log info messages, 2: also pass verbose to the called tools
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Snapshot all online sources, backup to all online destinations
    #[arg(short, long)]
    pub all: bool,
}
