use thiserror::Error;

use crate::directory::DirectoryError;

/// Validation and contract errors exposed by `growthscan-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid source '{value}', expected one of yahoo, alphavantage")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("company name for '{ticker}' cannot be empty")]
    EmptyCompanyName { ticker: String },

    #[error("weight for '{field}' must be finite and non-negative")]
    InvalidWeight { field: &'static str },
    #[error("score weights must sum to 1.0, got {sum}")]
    WeightsDoNotSumToOne { sum: f64 },

    #[error("price history must cover at least one year")]
    EmptyHistoryWindow,

    #[error("invalid value '{value}' for setting '{name}'")]
    InvalidSetting { name: &'static str, value: String },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },
    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
