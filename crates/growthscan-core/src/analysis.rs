//! End-to-end pipeline: directory → match → retrieve → score.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::adapters::{AlphaVantageAdapter, YahooAdapter};
use crate::config::Settings;
use crate::directory::{
    DirectoryCache, DirectoryError, DirectorySource, FileDirectory, ReferenceDirectory,
    WikipediaDirectory,
};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::matcher::{match_queries, split_batch, MatchResult};
use crate::provider_policy::ProviderPolicy;
use crate::retriever::{partition, RetrievalFailure, Retriever};
use crate::scorer::{rank, ScoreRecord, Scorer, ScoringConfig};
use crate::{CoreError, MetricBundle, ProviderId, Symbol};

/// Everything one analysis needs, passed explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisRequest {
    pub queries: Vec<String>,
    pub scoring: ScoringConfig,
}

impl AnalysisRequest {
    pub fn new(queries: Vec<String>, scoring: ScoringConfig) -> Self {
        Self { queries, scoring }
    }

    /// Builds a request from the comma-separated batch form.
    pub fn from_batch(text: &str, scoring: ScoringConfig) -> Self {
        Self::new(split_batch(text), scoring)
    }
}

/// Request-scoped result; partial outcomes are normal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub matches: MatchResult,
    pub bundles: BTreeMap<Symbol, MetricBundle>,
    pub failures: Vec<RetrievalFailure>,
    pub scores: BTreeMap<Symbol, ScoreRecord>,
}

impl AnalysisReport {
    pub fn ranked(&self) -> Vec<&ScoreRecord> {
        rank(&self.scores)
    }

    /// True when any query or ticker did not make it to a score.
    pub fn is_partial(&self) -> bool {
        !self.matches.unresolved_queries.is_empty() || !self.failures.is_empty()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.bundles
            .values()
            .flat_map(|bundle| {
                bundle
                    .warnings
                    .iter()
                    .map(move |warning| format!("{}: {warning}", bundle.symbol))
            })
            .collect()
    }
}

pub struct Analyzer {
    directory: Arc<DirectoryCache>,
    retriever: Retriever,
}

impl Analyzer {
    pub fn new(directory: Arc<DirectoryCache>, retriever: Retriever) -> Self {
        Self {
            directory,
            retriever,
        }
    }

    /// Wires the Yahoo primary, the Alpha Vantage secondary and the
    /// configured directory source over one shared HTTP client.
    pub fn from_settings(settings: &Settings) -> Self {
        let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
        Self::from_settings_with_client(settings, http_client)
    }

    pub fn from_settings_with_client(settings: &Settings, http_client: Arc<dyn HttpClient>) -> Self {
        let primary = YahooAdapter::with_http_client(Arc::clone(&http_client)).with_policy(
            ProviderPolicy::default_for(ProviderId::Yahoo).with_timeout(settings.provider_timeout),
        );
        let secondary = AlphaVantageAdapter::with_http_client(
            Arc::clone(&http_client),
            settings.alphavantage_api_key.clone(),
        )
        .with_policy(
            ProviderPolicy::default_for(ProviderId::Alphavantage)
                .with_timeout(settings.provider_timeout),
        );

        let source: Arc<dyn DirectorySource> = match &settings.directory_file {
            Some(path) => Arc::new(FileDirectory::new(path.clone())),
            None => Arc::new(WikipediaDirectory::new(
                settings.directory_url.clone(),
                http_client,
            )),
        };
        let directory = DirectoryCache::new(source).with_ttl(settings.directory_ttl);

        Self::new(
            Arc::new(directory),
            Retriever::new(
                Arc::new(primary),
                Arc::new(secondary),
                settings.retriever_config(),
            ),
        )
    }

    pub fn source_chain(&self) -> Vec<ProviderId> {
        self.retriever.source_chain()
    }

    pub async fn directory(&self) -> Result<Arc<ReferenceDirectory>, DirectoryError> {
        self.directory.get().await
    }

    pub async fn match_only(&self, queries: &[String]) -> Result<MatchResult, DirectoryError> {
        let directory = self.directory.get().await?;
        Ok(match_queries(queries, directory.records()))
    }

    /// Runs the full pipeline. Only an unusable directory or invalid scoring
    /// weights fail the call; everything else is reported in the result.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport, CoreError> {
        request.scoring.weights.validate()?;
        let started = Instant::now();

        let matches = self.match_only(&request.queries).await?;
        let (bundles, failures) = if matches.is_empty() {
            (BTreeMap::new(), Vec::new())
        } else {
            partition(self.retriever.retrieve(&matches.resolved_tickers).await)
        };
        let scores = Scorer::new(request.scoring).score(&bundles);

        info!(
            queries = request.queries.len(),
            resolved = matches.resolved_tickers.len(),
            unresolved = matches.unresolved_queries.len(),
            scored = scores.len(),
            failed = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );

        Ok(AnalysisReport {
            matches,
            bundles,
            failures,
            scores,
        })
    }
}
