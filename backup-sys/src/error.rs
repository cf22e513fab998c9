// SPDX-License-Identifier: GPL-3.0-only

use backup_contracts::BackupError;
use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),

    #[error("command failed: {command}; stderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("unexpected output: {0}")]
    Parse(String),

    #[error("volume {0} is not present")]
    DeviceNotFound(String),
}

impl From<SysError> for BackupError {
    fn from(err: SysError) -> Self {
        BackupError::failure(err.to_string())
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
