//! End-to-end tests for the analysis pipeline
//!
//! These tests run directory loading, matching, retrieval and scoring
//! together against canned HTTP responses and in-memory directories.

use std::sync::Arc;

use growthscan_core::{
    AlphaVantageAdapter, AnalysisRequest, Analyzer, ClampPolicy, CompanyRecord, CoreError,
    DirectoryCache, DirectoryError, HttpClient, HttpResponse, ProviderId, Retriever,
    RetrieverConfig, ScoreWeights, ScoringConfig, Settings, StaticDirectory, StaticHttpClient,
    Symbol, ValidationError, YahooAdapter,
};
use serde_json::json;

fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

fn records() -> Vec<CompanyRecord> {
    [
        ("AAPL", "Apple Inc.", "Information Technology"),
        ("BRK.B", "Berkshire Hathaway", "Financials"),
        ("NVDA", "Nvidia", "Information Technology"),
    ]
    .into_iter()
    .map(|(ticker, name, sector)| {
        CompanyRecord::new(symbol(ticker), name, sector).expect("valid record")
    })
    .collect()
}

fn summary(name: &str, revenue_growth: f64) -> String {
    json!({"quoteSummary": {"result": [{
        "financialData": {
            "revenueGrowth": {"raw": revenue_growth},
            "profitMargins": {"raw": 0.2},
            "returnOnEquity": {"raw": 0.3},
            "debtToEquity": {"raw": 40.0},
            "freeCashflow": {"raw": 1.0e10}
        },
        "defaultKeyStatistics": {"forwardPE": {"raw": 25.0}, "beta": {"raw": 0.9}},
        "summaryDetail": {"dividendYield": {"raw": 0.01}},
        "price": {"longName": name, "currency": "USD"},
        "assetProfile": {"sector": "Technology"}
    }], "error": null}})
    .to_string()
}

const CHART: &str = r#"{"chart":{"result":[{"timestamp":[1704153600,1704240000],
    "indicators":{"quote":[{"close":[180.0,181.5]}]}}],"error":null}}"#;

const CONSTITUENTS: &str = r#"<html><body>
    <table class="wikitable sortable" id="constituents">
      <tr><th>Symbol</th><th>Security</th><th>GICS Sector</th><th>Headquarters</th></tr>
      <tr><td>AAPL</td><td>Apple Inc.</td><td>Information Technology</td><td>Cupertino</td></tr>
      <tr><td>BRK.B</td><td>Berkshire Hathaway</td><td>Financials</td><td>Omaha</td></tr>
    </table></body></html>"#;

fn yahoo_client() -> StaticHttpClient {
    StaticHttpClient::new()
        .route_json("getcrumb", "crumb-1")
        .route_json("quoteSummary/AAPL?", summary("Apple Inc.", 0.06))
        .route_json("quoteSummary/BRK-B?", summary("Berkshire Hathaway Inc.", 0.30))
        .route_json("chart/", CHART)
}

fn analyzer(client: Arc<StaticHttpClient>) -> Analyzer {
    let http_client: Arc<dyn HttpClient> = client;
    let retriever = Retriever::new(
        Arc::new(YahooAdapter::with_http_client(Arc::clone(&http_client))),
        Arc::new(AlphaVantageAdapter::with_http_client(http_client, "test-key")),
        RetrieverConfig::default(),
    );
    let directory = DirectoryCache::new(Arc::new(StaticDirectory::new(records())));
    Analyzer::new(Arc::new(directory), retriever)
}

// =============================================================================
// Pipeline: Happy Path with Partial Input
// =============================================================================

#[tokio::test]
async fn when_batch_mixes_known_and_unknown_companies_system_scores_the_known_ones() {
    // Given: Two resolvable queries and one that matches nothing
    let client = Arc::new(yahoo_client());
    let analyzer = analyzer(Arc::clone(&client));
    let request = AnalysisRequest::from_batch(
        "apple, Berkshire Hathaway, xyz123",
        ScoringConfig::default(),
    );

    // When: The analysis runs
    let report = analyzer.analyze(&request).await.expect("analysis runs");

    // Then: Both companies are scored and the unknown query is reported
    assert_eq!(report.matches.unresolved_queries, vec!["xyz123"]);
    assert_eq!(
        report.scores.keys().cloned().collect::<Vec<_>>(),
        vec![symbol("AAPL"), symbol("BRK.B")]
    );
    assert!(report.failures.is_empty());
    assert!(report.is_partial());

    // And: Faster growth ranks first
    let ranked = report
        .ranked()
        .into_iter()
        .map(|record| record.symbol.to_string())
        .collect::<Vec<_>>();
    assert_eq!(ranked, vec!["BRK.B", "AAPL"]);

    // And: Class shares were requested in Yahoo's dash form
    assert_eq!(client.request_count("quoteSummary/BRK-B"), 1);
    assert_eq!(client.request_count("alphavantage"), 0);
}

#[tokio::test]
async fn when_nothing_resolves_system_makes_no_provider_calls() {
    let client = Arc::new(yahoo_client());
    let analyzer = analyzer(Arc::clone(&client));
    let request = AnalysisRequest::from_batch("xyz123, berkshire xyz123", ScoringConfig::default());

    let report = analyzer.analyze(&request).await.expect("analysis runs");

    assert!(report.matches.is_empty());
    assert_eq!(report.matches.unresolved_queries.len(), 2);
    assert!(report.scores.is_empty());
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn when_bounded_scoring_is_requested_scores_stay_within_range() {
    let client = Arc::new(
        StaticHttpClient::new()
            .route_json("getcrumb", "crumb-1")
            .route_json("quoteSummary/NVDA?", summary("NVIDIA Corporation", 2.6))
            .route_json("chart/", CHART),
    );
    let analyzer = analyzer(client);

    let reference = analyzer
        .analyze(&AnalysisRequest::from_batch("nvidia", ScoringConfig::default()))
        .await
        .expect("analysis runs");
    let bounded = analyzer
        .analyze(&AnalysisRequest::from_batch("nvidia", ScoringConfig::bounded()))
        .await
        .expect("analysis runs");

    let nvda = symbol("NVDA");
    assert!(reference.scores[&nvda].normalized.revenue_growth_norm > 1.0);
    assert!((bounded.scores[&nvda].normalized.revenue_growth_norm - 1.0).abs() < 1e-12);
    assert!((0.0..=100.0).contains(&bounded.scores[&nvda].score));
    assert!(bounded.scores[&nvda].score < reference.scores[&nvda].score);
}

// =============================================================================
// Pipeline: Fatal Conditions
// =============================================================================

#[tokio::test]
async fn when_weights_are_invalid_system_rejects_before_any_io() {
    let client = Arc::new(yahoo_client());
    let analyzer = analyzer(Arc::clone(&client));
    let scoring = ScoringConfig {
        weights: ScoreWeights {
            dividend_yield: 0.5,
            ..ScoreWeights::default()
        },
        clamp: ClampPolicy::Reference,
    };

    let error = analyzer
        .analyze(&AnalysisRequest::from_batch("apple", scoring))
        .await
        .expect_err("weights must be rejected");

    assert!(matches!(
        error,
        CoreError::Validation(ValidationError::WeightsDoNotSumToOne { .. })
    ));
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn when_directory_file_is_missing_system_aborts_with_directory_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = Settings {
        directory_file: Some(dir.path().join("missing.json")),
        ..Settings::default()
    };
    let analyzer =
        Analyzer::from_settings_with_client(&settings, Arc::new(StaticHttpClient::new()));

    let error = analyzer
        .analyze(&AnalysisRequest::from_batch("apple", ScoringConfig::default()))
        .await
        .expect_err("directory is unavailable");

    let directory_error = match error {
        CoreError::Directory(directory_error) => directory_error,
        other => panic!("expected a directory error, got {other:?}"),
    };
    assert!(matches!(directory_error, DirectoryError::Io { .. }));
    assert_eq!(directory_error.code(), "directory.unavailable");
}

#[tokio::test]
async fn when_directory_page_is_down_system_reports_unavailable() {
    let settings = Settings {
        directory_url: String::from("https://directory.test/sp500"),
        ..Settings::default()
    };
    let analyzer =
        Analyzer::from_settings_with_client(&settings, Arc::new(StaticHttpClient::new()));

    let error = analyzer.directory().await.expect_err("404 from directory page");

    assert!(matches!(error, DirectoryError::Unavailable { .. }));
}

// =============================================================================
// Pipeline: Wiring from Settings
// =============================================================================

#[tokio::test]
async fn when_wired_from_settings_system_loads_directory_once_and_uses_both_providers() {
    // Given: The directory page and Yahoo are served by one canned client
    let client = Arc::new(
        yahoo_client().route("directory.test", HttpResponse::ok(CONSTITUENTS)),
    );
    let settings = Settings {
        directory_url: String::from("https://directory.test/sp500"),
        ..Settings::default()
    };
    let analyzer = Analyzer::from_settings_with_client(&settings, client.clone());

    // When: Two analyses run back to back
    let first = analyzer
        .analyze(&AnalysisRequest::from_batch("apple", ScoringConfig::default()))
        .await
        .expect("first analysis");
    let second = analyzer
        .analyze(&AnalysisRequest::from_batch("berkshire", ScoringConfig::default()))
        .await
        .expect("second analysis");

    // Then: The directory page was fetched a single time
    assert_eq!(client.request_count("directory.test"), 1);
    assert!(first.scores.contains_key(&symbol("AAPL")));
    assert!(second.scores.contains_key(&symbol("BRK.B")));
    assert_eq!(
        analyzer.source_chain(),
        vec![ProviderId::Yahoo, ProviderId::Alphavantage]
    );
}

#[tokio::test]
async fn when_directory_file_is_configured_system_matches_against_it() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("sp500.json");
    std::fs::write(
        &path,
        serde_json::to_string(&records()).expect("records serialize"),
    )
    .expect("write directory file");
    let settings = Settings {
        directory_file: Some(path),
        ..Settings::default()
    };
    let analyzer =
        Analyzer::from_settings_with_client(&settings, Arc::new(StaticHttpClient::new()));

    let matches = analyzer
        .match_only(&[String::from("NVIDIA"), String::from("apple inc")])
        .await
        .expect("directory loads");

    assert_eq!(
        matches.resolved_tickers.into_iter().collect::<Vec<_>>(),
        vec![symbol("AAPL"), symbol("NVDA")]
    );
    assert!(matches.unresolved_queries.is_empty());
}
