//! Dual-provider metric retrieval.
//!
//! Each ticker walks a small state machine:
//!
//! ```text
//! NotFetched -> PrimaryFetched{complete | incomplete | failed}
//!            -> (unless complete) SecondaryMerged{ok | failed}
//!            -> Final
//! ```
//!
//! Primary values always win over secondary ones; the secondary only fills
//! gaps. Price history comes from the primary alone, and losing it only adds
//! a warning. Tickers are independent and run with bounded concurrency.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::data_source::{
    DataSource, Endpoint, HistoryRequest, MetricsRequest, SourceError, SourceFuture,
};
use crate::{Metric, MetricBundle, MetricsSnapshot, PriceSeries, ProviderId, Symbol};

/// Knobs for one retrieval run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieverConfig {
    /// Upper bound for every single provider call.
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub history_years: u16,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_concurrency: 4,
            history_years: HistoryRequest::DEFAULT_YEARS,
        }
    }
}

/// One provider's reason for not delivering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ProviderFailure {
    pub fn new(provider: ProviderId, error: &SourceError) -> Self {
        Self {
            provider,
            code: error.code(),
            message: error.message().to_owned(),
            retryable: error.retryable(),
        }
    }
}

/// A ticker for which no usable metrics could be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalFailure {
    pub symbol: Symbol,
    pub reason: String,
    pub causes: Vec<ProviderFailure>,
}

impl RetrievalFailure {
    pub fn retryable(&self) -> bool {
        self.causes.iter().any(|cause| cause.retryable)
    }
}

/// Per-ticker retrieval results, ordered by ticker.
pub type Retrieval = BTreeMap<Symbol, Result<MetricBundle, RetrievalFailure>>;

/// Splits a [`Retrieval`] into the bundles handed to the scorer and the
/// failures reported to the caller.
pub fn partition(retrieval: Retrieval) -> (BTreeMap<Symbol, MetricBundle>, Vec<RetrievalFailure>) {
    let mut bundles = BTreeMap::new();
    let mut failures = Vec::new();
    for (symbol, outcome) in retrieval {
        match outcome {
            Ok(bundle) => {
                bundles.insert(symbol, bundle);
            }
            Err(failure) => failures.push(failure),
        }
    }
    (bundles, failures)
}

enum PrimaryOutcome {
    Complete(MetricsSnapshot),
    Incomplete(MetricsSnapshot),
    Failed(SourceError),
}

enum FetchState {
    NotFetched,
    PrimaryFetched {
        primary: PrimaryOutcome,
        prices: PriceSeries,
        warnings: Vec<String>,
    },
    SecondaryMerged {
        primary: Result<MetricsSnapshot, SourceError>,
        secondary: Result<MetricsSnapshot, SourceError>,
        prices: PriceSeries,
        warnings: Vec<String>,
    },
    Final(Result<MetricBundle, RetrievalFailure>),
}

/// Fetches metric bundles from a primary provider with per-ticker fallback
/// to a secondary.
#[derive(Clone)]
pub struct Retriever {
    primary: Arc<dyn DataSource>,
    secondary: Arc<dyn DataSource>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        primary: Arc<dyn DataSource>,
        secondary: Arc<dyn DataSource>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            config,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Providers in the order they are consulted.
    pub fn source_chain(&self) -> Vec<ProviderId> {
        vec![self.primary.id(), self.secondary.id()]
    }

    /// Retrieves every ticker. Never fails as a whole: each ticker carries
    /// its own bundle or failure.
    pub async fn retrieve(&self, tickers: &BTreeSet<Symbol>) -> Retrieval {
        let started = Instant::now();
        let results = stream::iter(tickers.iter().cloned())
            .map(|symbol| async move {
                let outcome = self.retrieve_one(&symbol).await;
                (symbol, outcome)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let retrieval = results.into_iter().collect::<Retrieval>();
        let failed = retrieval.values().filter(|outcome| outcome.is_err()).count();
        info!(
            tickers = retrieval.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieval finished"
        );
        retrieval
    }

    pub async fn retrieve_one(&self, symbol: &Symbol) -> Result<MetricBundle, RetrievalFailure> {
        let mut state = FetchState::NotFetched;
        loop {
            state = match state {
                FetchState::NotFetched => self.fetch_primary(symbol).await,
                FetchState::PrimaryFetched {
                    primary: PrimaryOutcome::Complete(snapshot),
                    prices,
                    warnings,
                } => FetchState::Final(Ok(self.bundle(snapshot, None, prices, warnings))),
                FetchState::PrimaryFetched {
                    primary: PrimaryOutcome::Incomplete(snapshot),
                    prices,
                    warnings,
                } => {
                    let missing = snapshot
                        .metrics
                        .missing()
                        .iter()
                        .map(|metric| metric.as_str())
                        .collect::<Vec<_>>();
                    warn!(
                        ticker = %symbol,
                        provider = %self.primary.id(),
                        missing = ?missing,
                        "primary response incomplete; consulting secondary"
                    );
                    FetchState::SecondaryMerged {
                        primary: Ok(snapshot),
                        secondary: self.fetch_secondary(symbol).await,
                        prices,
                        warnings,
                    }
                }
                FetchState::PrimaryFetched {
                    primary: PrimaryOutcome::Failed(error),
                    prices,
                    warnings,
                } => {
                    warn!(
                        ticker = %symbol,
                        provider = %self.primary.id(),
                        code = error.code(),
                        "primary metrics failed; consulting secondary"
                    );
                    FetchState::SecondaryMerged {
                        primary: Err(error),
                        secondary: self.fetch_secondary(symbol).await,
                        prices,
                        warnings,
                    }
                }
                FetchState::SecondaryMerged {
                    primary,
                    secondary: Ok(fallback),
                    prices,
                    mut warnings,
                } => {
                    let (bundle, primary_error) = match primary {
                        Ok(snapshot) => (
                            self.bundle(snapshot, Some(fallback), prices, warnings),
                            None,
                        ),
                        Err(error) => {
                            warnings.push(format!(
                                "{} metrics unavailable ({}); using {} only",
                                self.primary.id(),
                                error.code(),
                                self.secondary.id()
                            ));
                            (
                                self.bundle_from_secondary(fallback, prices, warnings),
                                Some(error),
                            )
                        }
                    };
                    if bundle.metrics.present().is_empty() {
                        warn!(
                            ticker = %symbol,
                            provider = %self.secondary.id(),
                            "no metrics from either provider; ticker dropped"
                        );
                        let empty =
                            SourceError::not_covered(format!("no metrics reported for {symbol}"));
                        FetchState::Final(Err(self.failure(symbol, primary_error, empty)))
                    } else {
                        FetchState::Final(Ok(bundle))
                    }
                }
                FetchState::SecondaryMerged {
                    primary,
                    secondary: Err(error),
                    ..
                } => {
                    warn!(
                        ticker = %symbol,
                        provider = %self.secondary.id(),
                        code = error.code(),
                        "secondary lookup failed; ticker dropped"
                    );
                    FetchState::Final(Err(self.failure(symbol, primary.err(), error)))
                }
                FetchState::Final(outcome) => return outcome,
            };
        }
    }

    async fn fetch_primary(&self, symbol: &Symbol) -> FetchState {
        let metrics = self.bounded(
            self.primary.id(),
            symbol,
            self.primary.metrics(MetricsRequest::new(symbol.clone())),
        );
        let history = async {
            if !self.primary.capabilities().supports(Endpoint::PriceHistory) {
                return Err(SourceError::unsupported_endpoint(Endpoint::PriceHistory));
            }
            match HistoryRequest::new(symbol.clone(), self.config.history_years) {
                Ok(request) => {
                    self.bounded(self.primary.id(), symbol, self.primary.price_history(request))
                        .await
                }
                Err(error) => Err(SourceError::from(error)),
            }
        };
        let (metrics, history) = tokio::join!(metrics, history);

        let mut warnings = Vec::new();
        let prices = match history {
            Ok(prices) => prices,
            Err(error) => {
                warn!(
                    ticker = %symbol,
                    provider = %self.primary.id(),
                    code = error.code(),
                    "price history unavailable"
                );
                warnings.push(format!("price history unavailable: {error}"));
                PriceSeries::empty(symbol.clone())
            }
        };

        let primary = match metrics {
            Ok(snapshot) if snapshot.metrics.is_complete() => PrimaryOutcome::Complete(snapshot),
            Ok(snapshot) => PrimaryOutcome::Incomplete(snapshot),
            Err(error) => PrimaryOutcome::Failed(error),
        };

        FetchState::PrimaryFetched {
            primary,
            prices,
            warnings,
        }
    }

    async fn fetch_secondary(&self, symbol: &Symbol) -> Result<MetricsSnapshot, SourceError> {
        self.bounded(
            self.secondary.id(),
            symbol,
            self.secondary.metrics(MetricsRequest::new(symbol.clone())),
        )
        .await
    }

    /// Runs one provider call under the configured timeout.
    async fn bounded<T>(
        &self,
        provider: ProviderId,
        symbol: &Symbol,
        call: SourceFuture<'_, T>,
    ) -> Result<T, SourceError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::timeout(format!(
                "{provider} did not answer within {} ms",
                self.config.timeout.as_millis()
            ))),
        };
        debug!(
            ticker = %symbol,
            provider = %provider,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "provider call finished"
        );
        result
    }

    fn bundle(
        &self,
        primary: MetricsSnapshot,
        secondary: Option<MetricsSnapshot>,
        prices: PriceSeries,
        mut warnings: Vec<String>,
    ) -> MetricBundle {
        let mut provenance = primary
            .metrics
            .present()
            .into_iter()
            .map(|metric| (metric, self.primary.id()))
            .collect::<BTreeMap<Metric, ProviderId>>();

        let (metrics, profile) = match secondary {
            Some(fallback) => {
                let merged = primary.metrics.fill_gaps_from(&fallback.metrics);
                for metric in merged.present() {
                    provenance.entry(metric).or_insert(self.secondary.id());
                }
                (merged, primary.profile.fill_gaps_from(&fallback.profile))
            }
            None => (primary.metrics, primary.profile),
        };

        let missing = metrics.missing();
        if !missing.is_empty() {
            let names = missing
                .iter()
                .map(|metric| metric.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            warnings.push(format!("metrics not reported by any provider: {names}"));
        }

        MetricBundle {
            symbol: primary.symbol,
            profile,
            metrics,
            prices,
            provenance,
            warnings,
        }
    }

    fn bundle_from_secondary(
        &self,
        fallback: MetricsSnapshot,
        prices: PriceSeries,
        warnings: Vec<String>,
    ) -> MetricBundle {
        let empty = MetricsSnapshot::new(
            fallback.symbol.clone(),
            Default::default(),
            Default::default(),
        );
        self.bundle(empty, Some(fallback), prices, warnings)
    }

    fn failure(
        &self,
        symbol: &Symbol,
        primary: Option<SourceError>,
        secondary: SourceError,
    ) -> RetrievalFailure {
        let mut causes = Vec::with_capacity(2);
        let reason = match &primary {
            Some(primary_error) => {
                causes.push(ProviderFailure::new(self.primary.id(), primary_error));
                format!(
                    "{} failed ({}) and {} failed ({})",
                    self.primary.id(),
                    primary_error.message(),
                    self.secondary.id(),
                    secondary.message()
                )
            }
            None => format!(
                "{} data incomplete and {} failed ({})",
                self.primary.id(),
                self.secondary.id(),
                secondary.message()
            ),
        };
        causes.push(ProviderFailure::new(self.secondary.id(), &secondary));

        RetrievalFailure {
            symbol: symbol.clone(),
            reason,
            causes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{CapabilitySet, SourceErrorKind};
    use crate::{CompanyProfile, Metrics};

    /// Answers from a fixed table; unknown tickers are not covered.
    struct TableSource {
        id: ProviderId,
        capabilities: CapabilitySet,
        metrics: BTreeMap<String, Result<Metrics, SourceError>>,
    }

    impl TableSource {
        fn new(id: ProviderId) -> Self {
            Self {
                id,
                capabilities: CapabilitySet::full(),
                metrics: BTreeMap::new(),
            }
        }

        fn metrics_only(mut self) -> Self {
            self.capabilities = CapabilitySet::new(true, false);
            self
        }

        fn with(mut self, ticker: &str, metrics: Result<Metrics, SourceError>) -> Self {
            self.metrics.insert(ticker.to_owned(), metrics);
            self
        }
    }

    impl DataSource for TableSource {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn capabilities(&self) -> CapabilitySet {
            self.capabilities
        }

        fn metrics<'a>(&'a self, req: MetricsRequest) -> SourceFuture<'a, MetricsSnapshot> {
            let answer = self
                .metrics
                .get(req.symbol.as_str())
                .cloned()
                .unwrap_or_else(|| Err(SourceError::not_covered("unknown ticker")));
            Box::pin(async move {
                answer.map(|metrics| {
                    MetricsSnapshot::new(req.symbol, CompanyProfile::default(), metrics)
                })
            })
        }

        fn price_history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, PriceSeries> {
            assert!(self.capabilities.price_history, "history requested from {}", self.id);
            Box::pin(async move { Ok(PriceSeries::empty(req.symbol)) })
        }
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    fn complete() -> Metrics {
        Metric::ALL
            .into_iter()
            .fold(Metrics::default(), |metrics, metric| metrics.with(metric, 1.0))
    }

    fn retriever(primary: TableSource, secondary: TableSource) -> Retriever {
        Retriever::new(
            Arc::new(primary),
            Arc::new(secondary),
            RetrieverConfig::default(),
        )
    }

    #[tokio::test]
    async fn complete_primary_skips_secondary() {
        let retriever = retriever(
            TableSource::new(ProviderId::Yahoo).with("AAPL", Ok(complete())),
            TableSource::new(ProviderId::Alphavantage)
                .with("AAPL", Err(SourceError::unavailable("must not be called"))),
        );

        let bundle = retriever
            .retrieve_one(&symbol("AAPL"))
            .await
            .expect("primary alone is enough");

        assert!(!bundle.used_fallback());
        assert!(bundle.warnings.is_empty());
    }

    #[tokio::test]
    async fn failed_primary_falls_back_to_secondary_metrics() {
        let retriever = retriever(
            TableSource::new(ProviderId::Yahoo)
                .with("IBM", Err(SourceError::unavailable("yahoo down"))),
            TableSource::new(ProviderId::Alphavantage)
                .with("IBM", Ok(Metrics::default().with(Metric::Beta, 0.7))),
        );

        let bundle = retriever
            .retrieve_one(&symbol("IBM"))
            .await
            .expect("secondary rescues the ticker");

        assert_eq!(bundle.metrics.beta, Some(0.7));
        assert_eq!(
            bundle.provenance.get(&Metric::Beta),
            Some(&ProviderId::Alphavantage)
        );
        assert!(bundle.warnings.iter().any(|w| w.contains("source.unavailable")));
    }

    #[tokio::test]
    async fn empty_secondary_after_failed_primary_is_a_failure() {
        let retriever = retriever(
            TableSource::new(ProviderId::Yahoo)
                .with("IBM", Err(SourceError::unavailable("yahoo down"))),
            TableSource::new(ProviderId::Alphavantage).with("IBM", Ok(Metrics::default())),
        );

        let failure = retriever
            .retrieve_one(&symbol("IBM"))
            .await
            .expect_err("nothing to score");

        let codes = failure
            .causes
            .iter()
            .map(|cause| (cause.provider, cause.code))
            .collect::<Vec<_>>();
        assert_eq!(
            codes,
            vec![
                (ProviderId::Yahoo, "source.unavailable"),
                (ProviderId::Alphavantage, "source.not_covered"),
            ]
        );
        assert!(failure.reason.contains("no metrics reported"));
    }

    #[tokio::test]
    async fn both_providers_failing_reports_both_causes() {
        let retriever = retriever(
            TableSource::new(ProviderId::Yahoo)
                .with("ZZZ", Err(SourceError::not_covered("no such ticker"))),
            TableSource::new(ProviderId::Alphavantage)
                .with("ZZZ", Err(SourceError::rate_limited("slow down"))),
        );

        let failure = retriever
            .retrieve_one(&symbol("ZZZ"))
            .await
            .expect_err("no provider delivered");

        assert_eq!(failure.causes.len(), 2);
        assert_eq!(failure.causes[1].code, "source.rate_limited");
        assert!(failure.retryable());
        assert!(failure.reason.contains("slow down"));
    }

    #[tokio::test]
    async fn results_are_keyed_by_ticker() {
        let retriever = retriever(
            TableSource::new(ProviderId::Yahoo)
                .with("MSFT", Ok(complete()))
                .with("AAPL", Ok(complete())),
            TableSource::new(ProviderId::Alphavantage),
        );
        let tickers = [symbol("MSFT"), symbol("AAPL"), symbol("NOPE")]
            .into_iter()
            .collect::<BTreeSet<_>>();

        let retrieval = retriever.retrieve(&tickers).await;
        let keys = retrieval.keys().map(Symbol::as_str).collect::<Vec<_>>();
        assert_eq!(keys, vec!["AAPL", "MSFT", "NOPE"]);

        let (bundles, failures) = partition(retrieval);
        assert_eq!(bundles.len(), 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].causes[0].code, "source.not_covered");
    }

    #[tokio::test]
    async fn primary_without_history_is_not_asked_for_it() {
        let retriever = retriever(
            TableSource::new(ProviderId::Yahoo)
                .metrics_only()
                .with("AAPL", Ok(complete())),
            TableSource::new(ProviderId::Alphavantage),
        );

        let bundle = retriever
            .retrieve_one(&symbol("AAPL"))
            .await
            .expect("metrics are enough");

        assert!(bundle.prices.is_empty());
        assert!(bundle.warnings[0].contains("source.unsupported_endpoint"));
    }

    #[test]
    fn provider_failure_keeps_error_code() {
        let failure = ProviderFailure::new(ProviderId::Yahoo, &SourceError::timeout("slow"));

        assert_eq!(failure.code, "source.timeout");
        assert!(failure.retryable);
        assert_eq!(SourceError::timeout("slow").kind(), SourceErrorKind::Timeout);
    }
}
