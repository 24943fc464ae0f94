//! Reference Directory: the universe of (ticker, name, sector) rows that
//! free-text queries are resolved against.
//!
//! The directory is loaded lazily through a [`DirectoryCache`], validated
//! once, and then shared read-only as an `Arc<ReferenceDirectory>`.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{CompanyRecord, Symbol};

/// Public S&P 500 constituents listing.
pub const WIKIPEDIA_SP500_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";

/// Failure to obtain a usable directory. This is the only error that aborts
/// an analysis.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("reference directory '{origin}' is unavailable: {message}")]
    Unavailable { origin: String, message: String },
    #[error("reference directory could not be parsed: {message}")]
    Parse { message: String },
    #[error("reference directory is empty")]
    Empty,
    #[error("ticker '{ticker}' appears more than once in the reference directory")]
    Duplicate { ticker: String },
    #[error("failed to read reference directory file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DirectoryError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } | Self::Io { .. } => "directory.unavailable",
            Self::Parse { .. } => "directory.parse",
            Self::Empty => "directory.empty",
            Self::Duplicate { .. } => "directory.duplicate_ticker",
        }
    }
}

pub type DirectoryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<CompanyRecord>, DirectoryError>> + Send + 'a>>;

/// Where directory rows come from.
pub trait DirectorySource: Send + Sync {
    /// Human-readable origin, used in logs and errors.
    fn origin(&self) -> String;

    fn load<'a>(&'a self) -> DirectoryFuture<'a>;
}

/// Scrapes the `#constituents` table of the Wikipedia S&P 500 page.
#[derive(Clone)]
pub struct WikipediaDirectory {
    url: String,
    http_client: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl Default for WikipediaDirectory {
    fn default() -> Self {
        Self::new(WIKIPEDIA_SP500_URL, Arc::new(ReqwestHttpClient::new()))
    }
}

impl WikipediaDirectory {
    pub fn new(url: impl Into<String>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            url: url.into(),
            http_client,
            timeout_ms: 15_000,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl DirectorySource for WikipediaDirectory {
    fn origin(&self) -> String {
        self.url.clone()
    }

    fn load<'a>(&'a self) -> DirectoryFuture<'a> {
        Box::pin(async move {
            let request = HttpRequest::get(&self.url).with_timeout_ms(self.timeout_ms);
            let response = self.http_client.execute(request).await.map_err(|error| {
                DirectoryError::Unavailable {
                    origin: self.origin(),
                    message: error.message().to_owned(),
                }
            })?;

            if !response.is_success() {
                return Err(DirectoryError::Unavailable {
                    origin: self.origin(),
                    message: format!("upstream returned status {}", response.status),
                });
            }

            parse_constituents_table(&response.body)
        })
    }
}

/// Reads a JSON array of `{ticker, name, sector}` objects.
#[derive(Debug, Clone)]
pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DirectorySource for FileDirectory {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn load<'a>(&'a self) -> DirectoryFuture<'a> {
        Box::pin(async move {
            let text = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| DirectoryError::Io {
                    path: self.path.clone(),
                    source,
                })?;

            serde_json::from_str::<Vec<CompanyRecord>>(&text).map_err(|e| DirectoryError::Parse {
                message: format!("{}: {e}", self.path.display()),
            })
        })
    }
}

/// Fixed in-memory rows.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    records: Vec<CompanyRecord>,
}

impl StaticDirectory {
    pub fn new(records: Vec<CompanyRecord>) -> Self {
        Self { records }
    }
}

impl DirectorySource for StaticDirectory {
    fn origin(&self) -> String {
        String::from("static")
    }

    fn load<'a>(&'a self) -> DirectoryFuture<'a> {
        let records = self.records.clone();
        Box::pin(async move { Ok(records) })
    }
}

/// Extracts rows from the HTML `table#constituents`, locating the Symbol,
/// Security and GICS Sector columns by header text. Rows with an unusable
/// ticker are skipped.
pub fn parse_constituents_table(html: &str) -> Result<Vec<CompanyRecord>, DirectoryError> {
    let document = scraper::Html::parse_document(html);
    let table_selector = selector("table#constituents")?;
    let row_selector = selector("tr")?;
    let header_selector = selector("th")?;
    let cell_selector = selector("td")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| DirectoryError::Parse {
            message: String::from("table#constituents not found"),
        })?;

    let mut columns: Option<(usize, usize, usize)> = None;
    let mut records = Vec::new();

    for row in table.select(&row_selector) {
        let headers = row
            .select(&header_selector)
            .map(|cell| cell_text(&cell))
            .collect::<Vec<_>>();
        if !headers.is_empty() && columns.is_none() {
            let position = |name: &str| headers.iter().position(|header| header == name);
            columns = match (position("Symbol"), position("Security"), position("GICS Sector")) {
                (Some(ticker), Some(name), Some(sector)) => Some((ticker, name, sector)),
                _ => {
                    return Err(DirectoryError::Parse {
                        message: format!("unexpected constituents header: {headers:?}"),
                    })
                }
            };
            continue;
        }

        let Some((ticker_col, name_col, sector_col)) = columns else {
            continue;
        };
        let cells = row
            .select(&cell_selector)
            .map(|cell| cell_text(&cell))
            .collect::<Vec<_>>();
        if cells.len() <= ticker_col.max(name_col).max(sector_col) {
            continue;
        }

        let record = Symbol::parse(&cells[ticker_col]).and_then(|ticker| {
            CompanyRecord::new(ticker, cells[name_col].as_str(), cells[sector_col].as_str())
        });
        match record {
            Ok(record) => records.push(record),
            Err(error) => warn!(row = ?cells, %error, "skipping constituents row"),
        }
    }

    if columns.is_none() {
        return Err(DirectoryError::Parse {
            message: String::from("constituents table has no header row"),
        });
    }

    Ok(records)
}

fn selector(css: &str) -> Result<scraper::Selector, DirectoryError> {
    scraper::Selector::parse(css).map_err(|e| DirectoryError::Parse {
        message: format!("invalid selector '{css}': {e:?}"),
    })
}

fn cell_text(cell: &scraper::ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_owned()
}

/// Validated directory: non-empty, tickers unique.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDirectory {
    records: Vec<CompanyRecord>,
}

impl ReferenceDirectory {
    pub fn new(records: Vec<CompanyRecord>) -> Result<Self, DirectoryError> {
        if records.is_empty() {
            return Err(DirectoryError::Empty);
        }

        let mut seen = BTreeSet::new();
        for record in &records {
            if !seen.insert(&record.ticker) {
                return Err(DirectoryError::Duplicate {
                    ticker: record.ticker.to_string(),
                });
            }
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[CompanyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct sector names, sorted.
    pub fn sectors(&self) -> Vec<&str> {
        let mut sectors = self
            .records
            .iter()
            .map(|record| record.sector.as_str())
            .collect::<Vec<_>>();
        sectors.sort_unstable();
        sectors.dedup();
        sectors
    }

    pub fn in_sector(&self, sector: &str) -> Vec<&CompanyRecord> {
        let sector = sector.trim();
        self.records
            .iter()
            .filter(|record| record.sector.eq_ignore_ascii_case(sector))
            .collect()
    }
}

/// Loads the directory on first use and hands out the same `Arc` until the
/// optional TTL lapses or [`invalidate`](DirectoryCache::invalidate) is
/// called. Concurrent first callers wait for a single load.
pub struct DirectoryCache {
    source: Arc<dyn DirectorySource>,
    ttl: Option<Duration>,
    loaded: Mutex<Option<(Arc<ReferenceDirectory>, Instant)>>,
}

impl DirectoryCache {
    pub fn new(source: Arc<dyn DirectorySource>) -> Self {
        Self {
            source,
            ttl: None,
            loaded: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn get(&self) -> Result<Arc<ReferenceDirectory>, DirectoryError> {
        let mut loaded = self.loaded.lock().await;
        if let Some((directory, loaded_at)) = loaded.as_ref() {
            let fresh = self.ttl.map_or(true, |ttl| loaded_at.elapsed() < ttl);
            if fresh {
                return Ok(Arc::clone(directory));
            }
        }

        let started = Instant::now();
        let records = self.source.load().await?;
        let directory = Arc::new(ReferenceDirectory::new(records)?);
        info!(
            origin = %self.source.origin(),
            records = directory.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reference directory loaded"
        );

        *loaded = Some((Arc::clone(&directory), Instant::now()));
        Ok(directory)
    }

    pub async fn invalidate(&self) {
        *self.loaded.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::http_client::{HttpResponse, StaticHttpClient};

    const CONSTITUENTS: &str = r#"<html><body>
        <table class="wikitable sortable" id="constituents">
          <tbody>
            <tr><th>Symbol</th><th>Security</th><th>GICS Sector</th><th>GICS Sub-Industry</th></tr>
            <tr><td><a href="/q/AAPL">AAPL</a></td><td><a>Apple Inc.</a></td><td>Information Technology</td><td>Hardware</td></tr>
            <tr><td>BRK.B</td><td>Berkshire Hathaway</td><td>Financials</td><td>Insurance</td></tr>
            <tr><td>???</td><td>Broken Row</td><td>Nowhere</td><td>-</td></tr>
          </tbody>
        </table>
        <table id="changes"><tr><th>Date</th></tr></table>
        </body></html>"#;

    fn record(ticker: &str, name: &str, sector: &str) -> CompanyRecord {
        CompanyRecord::new(Symbol::parse(ticker).expect("valid symbol"), name, sector)
            .expect("valid record")
    }

    #[test]
    fn parses_constituents_table() {
        let records = parse_constituents_table(CONSTITUENTS).expect("table should parse");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record("AAPL", "Apple Inc.", "Information Technology"));
        assert_eq!(records[1].ticker.as_str(), "BRK.B");
    }

    #[test]
    fn missing_table_is_a_parse_error() {
        let error = parse_constituents_table("<html><body><p>gone</p></body></html>")
            .expect_err("no table");
        assert!(matches!(error, DirectoryError::Parse { .. }));
    }

    #[test]
    fn rejects_duplicate_tickers() {
        let error = ReferenceDirectory::new(vec![
            record("AAPL", "Apple Inc.", "Information Technology"),
            record("aapl", "Apple Again", "Information Technology"),
        ])
        .expect_err("duplicates must be rejected");

        assert!(matches!(error, DirectoryError::Duplicate { ref ticker } if ticker == "AAPL"));
    }

    #[test]
    fn rejects_empty_directory() {
        assert!(matches!(
            ReferenceDirectory::new(Vec::new()),
            Err(DirectoryError::Empty)
        ));
    }

    #[test]
    fn lists_sectors_and_filters_case_insensitively() {
        let directory = ReferenceDirectory::new(vec![
            record("AAPL", "Apple Inc.", "Information Technology"),
            record("MSFT", "Microsoft", "Information Technology"),
            record("JPM", "JPMorgan Chase", "Financials"),
        ])
        .expect("valid directory");

        assert_eq!(
            directory.sectors(),
            vec!["Financials", "Information Technology"]
        );
        assert_eq!(directory.in_sector("financials").len(), 1);
    }

    struct CountingSource {
        loads: AtomicUsize,
    }

    impl DirectorySource for CountingSource {
        fn origin(&self) -> String {
            String::from("counting")
        }

        fn load<'a>(&'a self) -> DirectoryFuture<'a> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(vec![record("AAPL", "Apple Inc.", "Information Technology")]) })
        }
    }

    #[tokio::test]
    async fn cache_loads_once_until_invalidated() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
        });
        let cache = Arc::new(DirectoryCache::new(source.clone()));

        let (first, second) = tokio::join!(cache.get(), cache.get());
        let first = first.expect("directory loads");
        let second = second.expect("directory loads");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        cache.get().await.expect("directory reloads");
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_ttl_triggers_reload() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
        });
        let cache = DirectoryCache::new(source.clone()).with_ttl(Some(Duration::ZERO));

        cache.get().await.expect("directory loads");
        cache.get().await.expect("directory reloads");

        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn wikipedia_source_reports_unavailable_on_error_status() {
        let client = Arc::new(
            StaticHttpClient::new().route("wikipedia", HttpResponse::with_status(503, "")),
        );
        let source = WikipediaDirectory::new(WIKIPEDIA_SP500_URL, client);

        let error = source.load().await.expect_err("503 must fail");

        assert!(matches!(error, DirectoryError::Unavailable { .. }));
        assert_eq!(error.code(), "directory.unavailable");
    }

    #[tokio::test]
    async fn file_source_reads_json_records() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(
            file.path(),
            r#"[{"ticker":"AAPL","name":"Apple Inc.","sector":"Information Technology"}]"#,
        )
        .expect("write fixture");

        let records = FileDirectory::new(file.path())
            .load()
            .await
            .expect("file should load");

        assert_eq!(records, vec![record("AAPL", "Apple Inc.", "Information Technology")]);
    }
}
