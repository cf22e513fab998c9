// SPDX-License-Identifier: GPL-3.0-only

use backup_contracts::BackupError;
use backup_sys::SysError;
use thiserror::Error;

/// Error types for BTRFS operations
#[derive(Error, Debug)]
pub enum BtrfsError {
    #[cfg(feature = "libbtrfsutil")]
    #[error("Subvolume not found: {0}")]
    SubvolumeNotFound(String),

    #[error("BTRFS operation failed: {0}")]
    OperationFailed(String),

    #[error("btrfs tool not found in PATH")]
    ToolNotFound,

    #[error("send/receive failed: send {send}, receive {receive}")]
    PipelineFailed { send: String, receive: String },

    #[error(transparent)]
    Sys(#[from] SysError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BtrfsError> for BackupError {
    fn from(err: BtrfsError) -> Self {
        BackupError::failure(err.to_string())
    }
}

/// Result type alias for BTRFS operations
pub type Result<T> = std::result::Result<T, BtrfsError>;
