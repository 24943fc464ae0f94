use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::data_source::{
    CapabilitySet, DataSource, HistoryRequest, MetricsRequest, SourceError, SourceFuture,
};
use crate::http_client::{HttpClient, HttpError, HttpRequest, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::{
    CompanyProfile, Metric, Metrics, MetricsSnapshot, PricePoint, PriceSeries, ProviderId, Symbol,
    UtcDateTime,
};

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const QUERY_BASE: &str = "https://query2.finance.yahoo.com";
const REFERER: &str = "https://finance.yahoo.com/";
const SUMMARY_MODULES: &str = "financialData,defaultKeyStatistics,summaryDetail,price,assetProfile";

// ============================================================================
// Session - cookie/crumb handshake
// ============================================================================

/// Yahoo's unofficial API wants a session cookie (set by `fc.yahoo.com` and
/// kept in the transport's cookie jar) plus a crumb token passed as a query
/// parameter. The crumb is cached and shared by every concurrent call.
#[derive(Debug)]
pub struct YahooSession {
    crumb: Mutex<Option<CachedCrumb>>,
    ttl: Duration,
}

#[derive(Debug, Clone)]
struct CachedCrumb {
    value: String,
    fetched_at: Instant,
}

impl Default for YahooSession {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(3_600))
    }
}

impl YahooSession {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            crumb: Mutex::new(None),
            ttl,
        }
    }

    /// Returns the cached crumb, running the handshake first when it is
    /// missing or older than the TTL. Concurrent callers wait on one refresh.
    pub async fn crumb(
        &self,
        http_client: &dyn HttpClient,
        timeout_ms: u64,
    ) -> Result<String, SourceError> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            if crumb.fetched_at.elapsed() < self.ttl {
                return Ok(crumb.value.clone());
            }
        }

        let value = fetch_crumb(http_client, timeout_ms).await?;
        *cached = Some(CachedCrumb {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    pub async fn invalidate(&self) {
        *self.crumb.lock().await = None;
    }
}

async fn fetch_crumb(http_client: &dyn HttpClient, timeout_ms: u64) -> Result<String, SourceError> {
    // fc.yahoo.com answers 404 but still sets the session cookie.
    let cookie_request = HttpRequest::get(COOKIE_URL)
        .with_header("referer", REFERER)
        .with_timeout_ms(timeout_ms);
    http_client
        .execute(cookie_request)
        .await
        .map_err(|e| transport_error("failed to fetch yahoo cookie", &e))?;

    for endpoint in CRUMB_URLS {
        let crumb_request = HttpRequest::get(endpoint)
            .with_header("referer", REFERER)
            .with_timeout_ms(timeout_ms);

        let Ok(response) = http_client.execute(crumb_request).await else {
            continue;
        };
        let body = response.body.trim();

        if response.status == 429 || body.to_ascii_lowercase().contains("too many requests") {
            return Err(SourceError::rate_limited(
                "yahoo rate limited while fetching crumb",
            ));
        }
        if !response.is_success() || body.contains("<html") || body.contains("<!DOCTYPE") {
            continue;
        }
        if !body.is_empty() && body.len() < 100 && !body.contains(char::is_whitespace) {
            return Ok(body.to_owned());
        }
    }

    Err(SourceError::unavailable(
        "failed to fetch yahoo crumb from all endpoints",
    ))
}

fn transport_error(context: &str, error: &HttpError) -> SourceError {
    if error.timed_out() {
        SourceError::timeout(format!("{context}: {}", error.message()))
    } else {
        SourceError::unavailable(format!("{context}: {}", error.message()))
    }
}

// ============================================================================
// Yahoo Adapter
// ============================================================================

/// Primary provider: quoteSummary for metrics and profile, chart for prices.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    session: Arc<YahooSession>,
    policy: ProviderPolicy,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }
}

impl YahooAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            session: Arc::new(YahooSession::default()),
            policy: ProviderPolicy::yahoo_default(),
        }
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// GET `url` with the session crumb appended. A 401 or 429 drops the
    /// crumb and retries once with a fresh handshake.
    async fn get_json(&self, symbol: &Symbol, url: &str) -> Result<String, SourceError> {
        let timeout_ms = self.policy.timeout_ms();
        let separator = if url.contains('?') { '&' } else { '?' };

        for attempt in 0..2 {
            let crumb = self
                .session
                .crumb(self.http_client.as_ref(), timeout_ms)
                .await?;
            let request = HttpRequest::get(format!(
                "{url}{separator}crumb={}",
                urlencoding::encode(&crumb)
            ))
            .with_header("referer", REFERER)
            .with_timeout_ms(timeout_ms);

            let started = Instant::now();
            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|e| transport_error("yahoo transport error", &e))?;
            debug!(
                ticker = %symbol,
                provider = "yahoo",
                status = response.status,
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "yahoo response"
            );

            match response.status {
                401 | 429 if attempt == 0 => {
                    self.session.invalidate().await;
                }
                401 | 429 => {
                    return Err(SourceError::rate_limited(format!(
                        "yahoo returned status {} after session refresh",
                        response.status
                    )));
                }
                404 => {
                    return Err(SourceError::not_covered(format!(
                        "yahoo has no data for '{symbol}'"
                    )));
                }
                status if !response.is_success() => {
                    return Err(SourceError::unavailable(format!(
                        "yahoo returned status {status}"
                    )));
                }
                _ => return Ok(response.body),
            }
        }

        Err(SourceError::unavailable("yahoo session refresh failed"))
    }

    async fn fetch_metrics(&self, req: &MetricsRequest) -> Result<MetricsSnapshot, SourceError> {
        let url = format!(
            "{QUERY_BASE}/v10/finance/quoteSummary/{}?modules={SUMMARY_MODULES}",
            urlencoding::encode(&req.symbol.provider_form())
        );
        let body = self.get_json(&req.symbol, &url).await?;
        parse_quote_summary(&req.symbol, &body)
    }

    async fn fetch_history(&self, req: &HistoryRequest) -> Result<PriceSeries, SourceError> {
        let url = format!(
            "{QUERY_BASE}/v8/finance/chart/{}?range={}y&interval=1d",
            urlencoding::encode(&req.symbol.provider_form()),
            req.years
        );
        let body = self.get_json(&req.symbol, &url).await?;
        parse_chart(&req.symbol, &body)
    }
}

impl DataSource for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn metrics<'a>(&'a self, req: MetricsRequest) -> SourceFuture<'a, MetricsSnapshot> {
        Box::pin(async move { self.fetch_metrics(&req).await })
    }

    fn price_history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, PriceSeries> {
        Box::pin(async move { self.fetch_history(&req).await })
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn parse_quote_summary(symbol: &Symbol, body: &str) -> Result<MetricsSnapshot, SourceError> {
    let envelope: QuoteSummaryEnvelope = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo quoteSummary: {e}")))?;

    if let Some(error) = envelope.quote_summary.error {
        return Err(SourceError::not_covered(format!(
            "yahoo quoteSummary error: {}",
            error.description.unwrap_or_else(|| String::from("unknown"))
        )));
    }

    let result = envelope
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| {
            SourceError::not_covered(format!("yahoo returned no quoteSummary for '{symbol}'"))
        })?;

    let financial = &result.financial_data;
    let stats = &result.default_key_statistics;
    let detail = &result.summary_detail;

    let mut metrics = Metrics::default();
    metrics.set(Metric::RevenueGrowth, raw(&financial.revenue_growth));
    metrics.set(
        Metric::ProfitMargin,
        raw(&financial.profit_margins).or_else(|| raw(&stats.profit_margins)),
    );
    metrics.set(
        Metric::ForwardPe,
        raw(&detail.forward_pe).or_else(|| raw(&stats.forward_pe)),
    );
    metrics.set(Metric::Beta, raw(&detail.beta).or_else(|| raw(&stats.beta)));
    metrics.set(Metric::ReturnOnEquity, raw(&financial.return_on_equity));
    metrics.set(Metric::DebtToEquity, raw(&financial.debt_to_equity));
    metrics.set(Metric::FreeCashFlow, raw(&financial.free_cashflow));
    metrics.set(Metric::DividendYield, raw(&detail.dividend_yield));

    let profile = CompanyProfile {
        name: result
            .price
            .long_name
            .clone()
            .or_else(|| result.price.short_name.clone()),
        sector: result.asset_profile.sector.clone(),
        currency: result
            .price
            .currency
            .clone()
            .or_else(|| financial.financial_currency.clone()),
    };

    Ok(MetricsSnapshot::new(symbol.clone(), profile, metrics))
}

fn parse_chart(symbol: &Symbol, body: &str) -> Result<PriceSeries, SourceError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo chart: {e}")))?;

    if let Some(error) = envelope.chart.error {
        return Err(SourceError::not_covered(format!(
            "yahoo chart error: {}",
            error.description.unwrap_or_else(|| String::from("unknown"))
        )));
    }

    let result = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| SourceError::not_covered(format!("yahoo returned no chart for '{symbol}'")))?;

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|quote| quote.close)
        .unwrap_or_default();

    let points = result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let close = close?;
            let ts = UtcDateTime::from_unix_timestamp(*ts).ok()?;
            Some(PricePoint { ts, close })
        })
        .collect();

    Ok(PriceSeries::new(symbol.clone(), points))
}

fn raw(value: &Option<RawValue>) -> Option<f64> {
    value.as_ref().and_then(|value| value.raw)
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooApiError {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QuoteSummaryResult {
    financial_data: FinancialData,
    default_key_statistics: KeyStatistics,
    summary_detail: SummaryDetail,
    price: PriceModule,
    asset_profile: AssetProfile,
}

/// Yahoo wraps numbers as `{"raw": 0.12, "fmt": "12%"}` and sends `{}` when
/// a value is unknown.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FinancialData {
    revenue_growth: Option<RawValue>,
    profit_margins: Option<RawValue>,
    return_on_equity: Option<RawValue>,
    debt_to_equity: Option<RawValue>,
    free_cashflow: Option<RawValue>,
    financial_currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct KeyStatistics {
    #[serde(rename = "forwardPE")]
    forward_pe: Option<RawValue>,
    beta: Option<RawValue>,
    profit_margins: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SummaryDetail {
    #[serde(rename = "forwardPE")]
    forward_pe: Option<RawValue>,
    beta: Option<RawValue>,
    dividend_yield: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PriceModule {
    long_name: Option<String>,
    short_name: Option<String>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssetProfile {
    sector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}
