// SPDX-License-Identifier: GPL-3.0-only

use backup_types::ValidationError;
use thiserror::Error;

/// Failure of a backup step
///
/// Neither kind is retried within a run. A `ProgramFault` means an internal
/// invariant was violated and the engine itself is defective. An
/// `OperationFailure` is an expected operational problem (a device missing, a
/// tool exiting non-zero) which aborts the run but leaves already written data
/// in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackupError {
    #[error("program fault: {0}")]
    ProgramFault(String),

    #[error("{0}")]
    OperationFailure(String),
}

impl BackupError {
    pub fn fault(message: impl Into<String>) -> Self {
        Self::ProgramFault(message.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::OperationFailure(message.into())
    }

    pub fn is_program_fault(&self) -> bool {
        matches!(self, Self::ProgramFault(_))
    }
}

impl From<ValidationError> for BackupError {
    fn from(err: ValidationError) -> Self {
        Self::OperationFailure(err.to_string())
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::OperationFailure(format!("I/O error: {err}"))
    }
}

/// Result type alias for backup operations
pub type Result<T> = std::result::Result<T, BackupError>;

/// Turn a violated internal invariant into a [`BackupError::ProgramFault`]
pub fn ensure_invariant(condition: bool, what: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(BackupError::fault(format!("invariant violated: {what}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violation_is_a_program_fault() {
        assert!(ensure_invariant(true, "holds").is_ok());
        let error = ensure_invariant(false, "mount point exists").unwrap_err();
        assert!(error.is_program_fault());
        assert_eq!(
            error.to_string(),
            "program fault: invariant violated: mount point exists"
        );
    }

    #[test]
    fn validation_errors_are_operation_failures() {
        let error: BackupError = ValidationError::NoSource("usb".to_string()).into();
        assert_eq!(
            error,
            BackupError::failure("no source defined for backup destination usb")
        );
    }
}
