//! # Growthscan Core
//!
//! Resolves free-text company queries against a reference directory, pulls
//! fundamentals from a primary provider with per-ticker fallback to a
//! secondary, and ranks the companies by a weighted growth score.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (Yahoo primary, Alpha Vantage secondary) |
//! | [`analysis`] | End-to-end pipeline and report |
//! | [`config`] | Environment-driven settings |
//! | [`data_source`] | Data source trait and request types |
//! | [`directory`] | Reference directory sources and cache |
//! | [`domain`] | Domain models (Symbol, CompanyRecord, Metrics, MetricBundle) |
//! | [`envelope`] | Response envelope with metadata |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`matcher`] | Conjunctive substring matching |
//! | [`provider_policy`] | Per-provider quota and timeout |
//! | [`retriever`] | Dual-provider retrieval state machine |
//! | [`scorer`] | Normalization and weighted scoring |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Rate limiting support |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use growthscan_core::{AnalysisRequest, Analyzer, ScoringConfig, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analyzer = Analyzer::from_settings(&Settings::from_env()?);
//!     let request = AnalysisRequest::from_batch("apple, berkshire hathaway", ScoringConfig::default());
//!     let report = analyzer.analyze(&request).await?;
//!
//!     for record in report.ranked() {
//!         println!("{}: {:.2}", record.symbol, record.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod analysis;
pub mod config;
pub mod data_source;
pub mod directory;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod http_client;
pub mod matcher;
pub mod provider_policy;
pub mod retriever;
pub mod scorer;
pub mod source;
pub mod throttling;

pub use adapters::{AlphaVantageAdapter, YahooAdapter, YahooSession};
pub use analysis::{AnalysisReport, AnalysisRequest, Analyzer};
pub use config::Settings;
pub use data_source::{
    CapabilitySet, DataSource, Endpoint, HistoryRequest, MetricsRequest, SourceError,
    SourceErrorKind, SourceFuture,
};
pub use directory::{
    DirectoryCache, DirectoryError, DirectorySource, FileDirectory, ReferenceDirectory,
    StaticDirectory, WikipediaDirectory,
};
pub use domain::{
    CompanyProfile, CompanyRecord, Metric, MetricBundle, Metrics, MetricsSnapshot, PricePoint,
    PriceSeries, Symbol, UtcDateTime,
};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};
pub use error::{CoreError, ValidationError};
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, StaticHttpClient,
};
pub use matcher::{match_queries, split_batch, MatchResult};
pub use provider_policy::ProviderPolicy;
pub use retriever::{
    partition, ProviderFailure, Retrieval, RetrievalFailure, Retriever, RetrieverConfig,
};
pub use scorer::{rank, ClampPolicy, ScoreRecord, ScoreWeights, Scorer, ScoringConfig, SubScores};
pub use source::ProviderId;
pub use throttling::ThrottlingQueue;
