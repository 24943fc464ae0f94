use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, HistoryRequest, MetricsRequest, SourceError,
    SourceFuture,
};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::ThrottlingQueue;
use crate::{CompanyProfile, Metric, Metrics, MetricsSnapshot, PriceSeries, ProviderId, Symbol};

const QUERY_URL: &str = "https://www.alphavantage.co/query";

/// OVERVIEW field for each metric the secondary provider can fill.
const OVERVIEW_FIELDS: [(Metric, &str); 6] = [
    (Metric::RevenueGrowth, "QuarterlyRevenueGrowthYOY"),
    (Metric::ProfitMargin, "ProfitMargin"),
    (Metric::ForwardPe, "ForwardPE"),
    (Metric::Beta, "Beta"),
    (Metric::ReturnOnEquity, "ReturnOnEquityTTM"),
    (Metric::DividendYield, "DividendYield"),
];

/// Secondary provider: company overview only, used to fill metric gaps.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    policy: ProviderPolicy,
    throttling: ThrottlingQueue,
}

impl Default for AlphaVantageAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), "demo")
    }
}

impl AlphaVantageAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        let policy = ProviderPolicy::alphavantage_default();
        Self {
            http_client,
            api_key: api_key.into(),
            throttling: ThrottlingQueue::from_policy(&policy),
            policy,
        }
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.throttling = ThrottlingQueue::from_policy(&policy);
        self.policy = policy;
        self
    }

    async fn fetch_overview(&self, symbol: &Symbol) -> Result<MetricsSnapshot, SourceError> {
        if let Err(delay) = self.throttling.acquire() {
            return Err(SourceError::rate_limited(format!(
                "alphavantage request budget exhausted; retry in {:.2}s",
                delay.as_secs_f64()
            )));
        }

        let url = format!(
            "{QUERY_URL}?function=OVERVIEW&symbol={}&apikey={}",
            urlencoding::encode(symbol.as_str()),
            urlencoding::encode(&self.api_key)
        );
        let request = HttpRequest::get(url).with_timeout_ms(self.policy.timeout_ms());

        let started = Instant::now();
        let response = self.http_client.execute(request).await.map_err(|error| {
            if error.timed_out() {
                SourceError::timeout(format!("alphavantage timeout: {}", error.message()))
            } else {
                SourceError::unavailable(format!(
                    "alphavantage transport error: {}",
                    error.message()
                ))
            }
        })?;
        debug!(
            ticker = %symbol,
            provider = "alphavantage",
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "alphavantage response"
        );

        if !response.is_success() {
            return Err(SourceError::unavailable(format!(
                "alphavantage upstream returned status {}",
                response.status
            )));
        }

        parse_overview(symbol, &response.body)
    }
}

impl DataSource for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, false)
    }

    fn metrics<'a>(&'a self, req: MetricsRequest) -> SourceFuture<'a, MetricsSnapshot> {
        Box::pin(async move { self.fetch_overview(&req.symbol).await })
    }

    fn price_history<'a>(&'a self, _req: HistoryRequest) -> SourceFuture<'a, PriceSeries> {
        Box::pin(async move { Err(SourceError::unsupported_endpoint(Endpoint::PriceHistory)) })
    }
}

fn parse_overview(symbol: &Symbol, body: &str) -> Result<MetricsSnapshot, SourceError> {
    let fields: BTreeMap<String, Value> = serde_json::from_str(body).map_err(|e| {
        SourceError::internal(format!("failed to parse alphavantage overview: {e}"))
    })?;

    // Throttled and rejected calls still answer 200 with a one-key object.
    if let Some(note) = fields.get("Note").or_else(|| fields.get("Information")) {
        return Err(SourceError::rate_limited(format!(
            "alphavantage refused the call: {}",
            note.as_str().unwrap_or("rate limit")
        )));
    }
    if let Some(message) = fields.get("Error Message") {
        return Err(SourceError::not_covered(format!(
            "alphavantage error: {}",
            message.as_str().unwrap_or("unknown")
        )));
    }
    if fields.is_empty() {
        return Err(SourceError::not_covered(format!(
            "alphavantage has no overview for '{symbol}'"
        )));
    }

    let mut metrics = Metrics::default();
    for (metric, field) in OVERVIEW_FIELDS {
        metrics.set(metric, fields.get(field).and_then(number));
    }

    let text = |field: &str| {
        fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != "None" && *value != "-")
            .map(str::to_owned)
    };
    let profile = CompanyProfile {
        name: text("Name"),
        sector: text("Sector"),
        currency: text("Currency"),
    };

    Ok(MetricsSnapshot::new(symbol.clone(), profile, metrics))
}

/// Overview values are strings; "None" and "-" mean not reported.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() || text == "None" || text == "-" {
                None
            } else {
                text.parse().ok()
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::StaticHttpClient;

    const OVERVIEW: &str = r#"{"Symbol":"IBM","Name":"International Business Machines",
        "Sector":"TECHNOLOGY","Currency":"USD","QuarterlyRevenueGrowthYOY":"0.015",
        "ProfitMargin":"0.096","ForwardPE":"21.01","Beta":"0.71","ReturnOnEquityTTM":"0.35",
        "DividendYield":"None"}"#;

    fn adapter(client: StaticHttpClient) -> (AlphaVantageAdapter, Arc<StaticHttpClient>) {
        let client = Arc::new(client);
        (
            AlphaVantageAdapter::with_http_client(client.clone(), "alpha-key"),
            client,
        )
    }

    fn request(value: &str) -> MetricsRequest {
        MetricsRequest::new(Symbol::parse(value).expect("valid symbol"))
    }

    #[tokio::test]
    async fn overview_maps_string_fields() {
        let (adapter, client) = adapter(StaticHttpClient::new().route_json("OVERVIEW", OVERVIEW));

        let snapshot = adapter
            .metrics(request("IBM"))
            .await
            .expect("overview should parse");

        assert_eq!(snapshot.metrics.beta, Some(0.71));
        assert_eq!(snapshot.metrics.forward_pe, Some(21.01));
        assert_eq!(snapshot.metrics.dividend_yield, None);
        assert_eq!(snapshot.metrics.free_cash_flow, None);
        assert_eq!(snapshot.profile.sector.as_deref(), Some("TECHNOLOGY"));

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.contains("function=OVERVIEW&symbol=IBM&apikey=alpha-key"));
    }

    #[tokio::test]
    async fn empty_overview_is_not_covered() {
        let (adapter, _) = adapter(StaticHttpClient::new().route_json("OVERVIEW", "{}"));

        let error = adapter
            .metrics(request("ZZZZ"))
            .await
            .expect_err("empty overview must fail");

        assert_eq!(error.kind(), SourceErrorKind::NotCovered);
    }

    #[tokio::test]
    async fn note_payload_is_rate_limited() {
        let (adapter, _) = adapter(StaticHttpClient::new().route_json(
            "OVERVIEW",
            r#"{"Note":"Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#,
        ));

        let error = adapter
            .metrics(request("IBM"))
            .await
            .expect_err("note payload must fail");

        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn local_budget_rate_limits_sixth_call() {
        let (adapter, client) = adapter(StaticHttpClient::new().route_json("OVERVIEW", OVERVIEW));

        for _ in 0..5 {
            adapter
                .metrics(request("IBM"))
                .await
                .expect("within free tier budget");
        }
        let error = adapter
            .metrics(request("IBM"))
            .await
            .expect_err("sixth call should rate limit");

        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert_eq!(client.requests().len(), 5);
    }

    #[tokio::test]
    async fn price_history_is_unsupported() {
        let (adapter, client) = adapter(StaticHttpClient::new());

        let error = adapter
            .price_history(HistoryRequest::trailing_default(
                Symbol::parse("IBM").expect("valid symbol"),
            ))
            .await
            .expect_err("no chart endpoint");

        assert_eq!(error.kind(), SourceErrorKind::UnsupportedEndpoint);
        assert!(client.requests().is_empty());
    }
}
