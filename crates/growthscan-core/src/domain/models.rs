use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{ProviderId, Symbol, UtcDateTime, ValidationError};

/// Row of the reference directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub ticker: Symbol,
    pub name: String,
    pub sector: String,
}

impl CompanyRecord {
    pub fn new(
        ticker: Symbol,
        name: impl Into<String>,
        sector: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(ValidationError::EmptyCompanyName {
                ticker: ticker.to_string(),
            });
        }

        Ok(Self {
            ticker,
            name,
            sector: sector.into().trim().to_owned(),
        })
    }
}

/// The eight fundamentals that feed the growth score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    RevenueGrowth,
    ProfitMargin,
    ForwardPe,
    Beta,
    ReturnOnEquity,
    DebtToEquity,
    FreeCashFlow,
    DividendYield,
}

impl Metric {
    pub const ALL: [Self; 8] = [
        Self::RevenueGrowth,
        Self::ProfitMargin,
        Self::ForwardPe,
        Self::Beta,
        Self::ReturnOnEquity,
        Self::DebtToEquity,
        Self::FreeCashFlow,
        Self::DividendYield,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RevenueGrowth => "revenue_growth",
            Self::ProfitMargin => "profit_margin",
            Self::ForwardPe => "forward_pe",
            Self::Beta => "beta",
            Self::ReturnOnEquity => "return_on_equity",
            Self::DebtToEquity => "debt_to_equity",
            Self::FreeCashFlow => "free_cash_flow",
            Self::DividendYield => "dividend_yield",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::RevenueGrowth => "Revenue Growth",
            Self::ProfitMargin => "Profit Margin",
            Self::ForwardPe => "Forward P/E",
            Self::Beta => "Beta",
            Self::ReturnOnEquity => "ROE",
            Self::DebtToEquity => "Debt-to-Equity",
            Self::FreeCashFlow => "Free Cash Flow",
            Self::DividendYield => "Dividend Yield",
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw metric values as reported by a provider. `None` means the provider
/// did not report the field; defaults are applied by the scorer only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub revenue_growth: Option<f64>,
    pub profit_margin: Option<f64>,
    pub forward_pe: Option<f64>,
    pub beta: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub dividend_yield: Option<f64>,
}

impl Metrics {
    pub const fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::RevenueGrowth => self.revenue_growth,
            Metric::ProfitMargin => self.profit_margin,
            Metric::ForwardPe => self.forward_pe,
            Metric::Beta => self.beta,
            Metric::ReturnOnEquity => self.return_on_equity,
            Metric::DebtToEquity => self.debt_to_equity,
            Metric::FreeCashFlow => self.free_cash_flow,
            Metric::DividendYield => self.dividend_yield,
        }
    }

    /// Stores `value`, discarding NaN and infinities.
    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        let value = value.filter(|v| v.is_finite());
        let slot = match metric {
            Metric::RevenueGrowth => &mut self.revenue_growth,
            Metric::ProfitMargin => &mut self.profit_margin,
            Metric::ForwardPe => &mut self.forward_pe,
            Metric::Beta => &mut self.beta,
            Metric::ReturnOnEquity => &mut self.return_on_equity,
            Metric::DebtToEquity => &mut self.debt_to_equity,
            Metric::FreeCashFlow => &mut self.free_cash_flow,
            Metric::DividendYield => &mut self.dividend_yield,
        };
        *slot = value;
    }

    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set(metric, Some(value));
        self
    }

    pub fn present(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|metric| self.get(*metric).is_some())
            .collect()
    }

    pub fn missing(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|metric| self.get(*metric).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        Metric::ALL
            .into_iter()
            .all(|metric| self.get(metric).is_some())
    }

    /// Returns a copy where every absent metric is taken from `fallback`.
    /// Values already present in `self` always win.
    pub fn fill_gaps_from(&self, fallback: &Metrics) -> Metrics {
        let mut merged = *self;
        for metric in Metric::ALL {
            if merged.get(metric).is_none() {
                merged.set(metric, fallback.get(metric));
            }
        }
        merged
    }
}

/// Company metadata reported alongside the metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub currency: Option<String>,
}

impl CompanyProfile {
    pub fn fill_gaps_from(&self, fallback: &CompanyProfile) -> CompanyProfile {
        CompanyProfile {
            name: self.name.clone().or_else(|| fallback.name.clone()),
            sector: self.sector.clone().or_else(|| fallback.sector.clone()),
            currency: self.currency.clone().or_else(|| fallback.currency.clone()),
        }
    }
}

/// Provider answer for a metrics request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub symbol: Symbol,
    pub profile: CompanyProfile,
    pub metrics: Metrics,
}

impl MetricsSnapshot {
    pub fn new(symbol: Symbol, profile: CompanyProfile, metrics: Metrics) -> Self {
        Self {
            symbol,
            profile,
            metrics,
        }
    }
}

/// Daily close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub ts: UtcDateTime,
    pub close: f64,
}

/// Time-ordered closing prices for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: Symbol,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Sorts points by timestamp and drops non-finite or negative closes.
    pub fn new(symbol: Symbol, points: Vec<PricePoint>) -> Self {
        let mut points = points
            .into_iter()
            .filter(|point| point.close.is_finite() && point.close >= 0.0)
            .collect::<Vec<_>>();
        points.sort_by_key(|point| point.ts);
        Self { symbol, points }
    }

    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.points.last().map(|point| point.close)
    }
}

/// Everything retrieved for one ticker. Built once per retrieval and not
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBundle {
    pub symbol: Symbol,
    pub profile: CompanyProfile,
    pub metrics: Metrics,
    pub prices: PriceSeries,
    /// Which provider supplied each present metric.
    pub provenance: BTreeMap<Metric, ProviderId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MetricBundle {
    pub fn used_fallback(&self) -> bool {
        self.provenance
            .values()
            .any(|provider| *provider != ProviderId::Yahoo)
    }
}
