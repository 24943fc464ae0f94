//! Runtime settings read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `GROWTHSCAN_ALPHAVANTAGE_API_KEY`, then `ALPHAVANTAGE_API_KEY` | `demo` |
//! | `GROWTHSCAN_DIRECTORY_URL` | Wikipedia S&P 500 list |
//! | `GROWTHSCAN_DIRECTORY_FILE` | unset (use the URL) |
//! | `GROWTHSCAN_DIRECTORY_TTL_SECS` | unset (process lifetime) |
//! | `GROWTHSCAN_PROVIDER_TIMEOUT_MS` | `10000` |
//! | `GROWTHSCAN_MAX_CONCURRENCY` | `4` |
//! | `GROWTHSCAN_HISTORY_YEARS` | `5` |
//!
//! CLI flags override these after loading.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::data_source::HistoryRequest;
use crate::directory::WIKIPEDIA_SP500_URL;
use crate::retriever::RetrieverConfig;
use crate::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub alphavantage_api_key: String,
    pub directory_url: String,
    pub directory_file: Option<PathBuf>,
    pub directory_ttl: Option<Duration>,
    pub provider_timeout: Duration,
    pub max_concurrency: usize,
    pub history_years: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alphavantage_api_key: String::from("demo"),
            directory_url: String::from(WIKIPEDIA_SP500_URL),
            directory_file: None,
            directory_ttl: None,
            provider_timeout: Duration::from_millis(10_000),
            max_concurrency: 4,
            history_years: HistoryRequest::DEFAULT_YEARS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let mut settings = Self {
            alphavantage_api_key: get("GROWTHSCAN_ALPHAVANTAGE_API_KEY")
                .or_else(|| get("ALPHAVANTAGE_API_KEY"))
                .unwrap_or(defaults.alphavantage_api_key),
            directory_url: get("GROWTHSCAN_DIRECTORY_URL").unwrap_or(defaults.directory_url),
            directory_file: get("GROWTHSCAN_DIRECTORY_FILE").map(PathBuf::from),
            directory_ttl: None,
            provider_timeout: defaults.provider_timeout,
            max_concurrency: defaults.max_concurrency,
            history_years: defaults.history_years,
        };

        if let Some(secs) = parse_var::<u64>(&get, "GROWTHSCAN_DIRECTORY_TTL_SECS")? {
            settings.directory_ttl = Some(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_var::<u64>(&get, "GROWTHSCAN_PROVIDER_TIMEOUT_MS")? {
            settings.provider_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<usize>(&get, "GROWTHSCAN_MAX_CONCURRENCY")? {
            settings.max_concurrency = n;
        }
        if let Some(years) = parse_var::<u16>(&get, "GROWTHSCAN_HISTORY_YEARS")? {
            settings.history_years = years;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.provider_timeout.is_zero() {
            return Err(ValidationError::InvalidSetting {
                name: "provider_timeout",
                value: String::from("0"),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidSetting {
                name: "max_concurrency",
                value: String::from("0"),
            });
        }
        if self.history_years == 0 {
            return Err(ValidationError::EmptyHistoryWindow);
        }
        Ok(())
    }

    pub fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig {
            timeout: self.provider_timeout,
            max_concurrency: self.max_concurrency,
            history_years: self.history_years,
        }
    }
}

fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ValidationError> {
    get(name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ValidationError::InvalidSetting { name, value })
        })
        .transpose()
}
