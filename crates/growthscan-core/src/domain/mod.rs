//! # Domain Models
//!
//! Canonical types shared by the matcher, retriever and scorer.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated ticker |
//! | [`CompanyRecord`] | Reference directory row (ticker, name, sector) |
//! | [`Metric`] | One of the eight scored fundamentals |
//! | [`Metrics`] | Optional value per metric, as reported by a provider |
//! | [`MetricsSnapshot`] | Provider answer: profile plus metrics |
//! | [`PriceSeries`] | Time-ordered daily closes |
//! | [`MetricBundle`] | Merged per-ticker retrieval result |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Absent metrics stay `None` all the way to the scorer, which is the only
//! place defaults are applied.

mod models;
mod symbol;
mod timestamp;

pub use models::{
    CompanyProfile, CompanyRecord, Metric, MetricBundle, Metrics, MetricsSnapshot, PricePoint,
    PriceSeries,
};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
