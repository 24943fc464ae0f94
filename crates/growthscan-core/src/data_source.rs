//! Data source trait and request types.
//!
//! This module defines the provider contract (`DataSource`) implemented by the
//! Yahoo (primary) and Alpha Vantage (secondary) adapters.
//!
//! # Endpoints
//!
//! | Endpoint | Request | Response | Description |
//! |----------|---------|----------|-------------|
//! | Metrics | [`MetricsRequest`] | [`MetricsSnapshot`] | Company profile and the eight scored fundamentals |
//! | PriceHistory | [`HistoryRequest`] | [`PriceSeries`] | Trailing daily closes |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{MetricsSnapshot, PriceSeries, ProviderId, Symbol, ValidationError};

/// Data endpoint type used for capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Metrics,
    PriceHistory,
}

impl Endpoint {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::PriceHistory => "price_history",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported endpoint matrix for a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub metrics: bool,
    pub price_history: bool,
}

impl CapabilitySet {
    pub const fn new(metrics: bool, price_history: bool) -> Self {
        Self {
            metrics,
            price_history,
        }
    }

    pub const fn full() -> Self {
        Self::new(true, true)
    }

    pub const fn supports(self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::Metrics => self.metrics,
            Endpoint::PriceHistory => self.price_history,
        }
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    UnsupportedEndpoint,
    Unavailable,
    RateLimited,
    NotCovered,
    Timeout,
    InvalidRequest,
    Internal,
}

/// Structured source error carried into retrieval failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unsupported_endpoint(endpoint: Endpoint) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedEndpoint,
            message: format!("endpoint '{endpoint}' is not supported by this source"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn not_covered(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotCovered,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::UnsupportedEndpoint => "source.unsupported_endpoint",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::NotCovered => "source.not_covered",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(error: ValidationError) -> Self {
        Self::internal(error.to_string())
    }
}

/// Request payload for the metrics endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsRequest {
    pub symbol: Symbol,
}

impl MetricsRequest {
    pub fn new(symbol: Symbol) -> Self {
        Self { symbol }
    }
}

/// Request payload for the price history endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub years: u16,
}

impl HistoryRequest {
    pub const DEFAULT_YEARS: u16 = 5;

    pub fn new(symbol: Symbol, years: u16) -> Result<Self, ValidationError> {
        if years == 0 {
            return Err(ValidationError::EmptyHistoryWindow);
        }
        Ok(Self { symbol, years })
    }

    pub fn trailing_default(symbol: Symbol) -> Self {
        Self {
            symbol,
            years: Self::DEFAULT_YEARS,
        }
    }
}

/// Boxed future returned by every [`DataSource`] call.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// # Required Methods
///
/// | Method | Description |
/// |--------|-------------|
/// | [`id`](DataSource::id) | Unique provider identifier |
/// | [`capabilities`](DataSource::capabilities) | Supported endpoints |
/// | [`metrics`](DataSource::metrics) | Fetch company profile and fundamentals |
/// | [`price_history`](DataSource::price_history) | Fetch trailing daily closes |
///
/// Implementations must be `Send + Sync`; the retriever shares one adapter
/// across concurrent ticker fetches.
pub trait DataSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    /// Fetches the company profile and whichever of the eight metrics the
    /// provider reports. Missing fields are `None`, not errors.
    fn metrics<'a>(&'a self, req: MetricsRequest) -> SourceFuture<'a, MetricsSnapshot>;

    /// Fetches daily closes covering `req.years` trailing years.
    fn price_history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, PriceSeries>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SourceError::timeout("slow").code(), "source.timeout");
        assert_eq!(
            SourceError::not_covered("unknown ticker").code(),
            "source.not_covered"
        );
        assert_eq!(
            SourceError::unsupported_endpoint(Endpoint::PriceHistory).to_string(),
            "endpoint 'price_history' is not supported by this source (source.unsupported_endpoint)"
        );
    }

    #[test]
    fn history_window_must_be_positive() {
        let symbol = Symbol::parse("AAPL").expect("valid symbol");
        assert_eq!(
            HistoryRequest::new(symbol, 0),
            Err(ValidationError::EmptyHistoryWindow)
        );
    }
}
