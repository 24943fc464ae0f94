use growthscan_core::{CoreError, DirectoryError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] growthscan_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error("strict mode failed: warnings={warning_count}, errors={error_count}")]
    StrictModeViolation {
        warning_count: usize,
        error_count: usize,
    },

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::StrictModeViolation { .. } => 5,
            Self::Serialization(_) => 4,
            Self::Directory(_) => 7,
            Self::Io(_) => 10,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(error) => Self::Validation(error),
            CoreError::Directory(error) => Self::Directory(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_failures_exit_with_seven() {
        let error = CliError::from(CoreError::Directory(DirectoryError::Empty));
        assert_eq!(error.exit_code(), 7);
    }

    #[test]
    fn invalid_weights_exit_with_two() {
        let error = CliError::from(CoreError::Validation(
            growthscan_core::ValidationError::WeightsDoNotSumToOne { sum: 0.9 },
        ));
        assert_eq!(error.exit_code(), 2);
    }
}
