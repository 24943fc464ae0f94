//! Growth score: per-metric normalization and weighted sum.
//!
//! | Metric | Default when absent | Normalized |
//! |--------|---------------------|------------|
//! | revenue growth | 0 | `(g + 1) / 2` |
//! | profit margin | 0 | `(m + 1) / 2` |
//! | forward P/E | 1 | `min(1, 1 / pe)` |
//! | beta | 1 | `1 - min(beta, 1)` |
//! | ROE | 0 | `roe / 50` |
//! | debt-to-equity | 0 | `1 - min(de / 2, 1)` |
//! | free cash flow | 0 | `min(fcf / 1e9 / 10, 1)` |
//! | dividend yield | 0 | `min(dy / 0.1, 1)` |
//!
//! The score is `100 * Σ weight · normalized`. Under [`ClampPolicy::Reference`]
//! the formulas are applied verbatim, so extreme growth, margin or ROE values
//! can push the score outside `[0, 100]`. [`ClampPolicy::Bounded`] clamps every
//! sub-score to `[0, 1]`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Metric, MetricBundle, Metrics, Symbol, ValidationError};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampPolicy {
    #[default]
    Reference,
    Bounded,
}

/// Weight per metric. Must be non-negative and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub revenue_growth: f64,
    pub profit_margin: f64,
    pub forward_pe: f64,
    pub beta: f64,
    pub return_on_equity: f64,
    pub debt_to_equity: f64,
    pub free_cash_flow: f64,
    pub dividend_yield: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            revenue_growth: 0.25,
            profit_margin: 0.15,
            forward_pe: 0.15,
            beta: 0.05,
            return_on_equity: 0.15,
            debt_to_equity: 0.10,
            free_cash_flow: 0.10,
            dividend_yield: 0.05,
        }
    }
}

impl ScoreWeights {
    pub const fn get(&self, metric: Metric) -> f64 {
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

    pub fn validate(&self) -> Result<(), ValidationError> {
        for metric in Metric::ALL {
            let weight = self.get(metric);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ValidationError::InvalidWeight {
                    field: metric.as_str(),
                });
            }
        }

        let sum = Metric::ALL.into_iter().map(|metric| self.get(metric)).sum::<f64>();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ValidationError::WeightsDoNotSumToOne { sum });
        }
        Ok(())
    }
}

/// Scoring parameters passed explicitly with every request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub clamp: ClampPolicy,
}

impl ScoringConfig {
    pub fn new(weights: ScoreWeights, clamp: ClampPolicy) -> Result<Self, ValidationError> {
        weights.validate()?;
        Ok(Self { weights, clamp })
    }

    pub fn bounded() -> Self {
        Self {
            weights: ScoreWeights::default(),
            clamp: ClampPolicy::Bounded,
        }
    }
}

/// Normalized sub-score per metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub revenue_growth_norm: f64,
    pub profit_margin_norm: f64,
    pub pe_norm: f64,
    pub beta_norm: f64,
    pub roe_norm: f64,
    pub debt_to_equity_norm: f64,
    pub fcf_norm: f64,
    pub dividend_yield_norm: f64,
}

impl SubScores {
    pub const fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::RevenueGrowth => self.revenue_growth_norm,
            Metric::ProfitMargin => self.profit_margin_norm,
            Metric::ForwardPe => self.pe_norm,
            Metric::Beta => self.beta_norm,
            Metric::ReturnOnEquity => self.roe_norm,
            Metric::DebtToEquity => self.debt_to_equity_norm,
            Metric::FreeCashFlow => self.fcf_norm,
            Metric::DividendYield => self.dividend_yield_norm,
        }
    }

    /// Export column name of each sub-score.
    pub const fn field_name(metric: Metric) -> &'static str {
        match metric {
            Metric::RevenueGrowth => "revenue_growth_norm",
            Metric::ProfitMargin => "profit_margin_norm",
            Metric::ForwardPe => "pe_norm",
            Metric::Beta => "beta_norm",
            Metric::ReturnOnEquity => "roe_norm",
            Metric::DebtToEquity => "debt_to_equity_norm",
            Metric::FreeCashFlow => "fcf_norm",
            Metric::DividendYield => "dividend_yield_norm",
        }
    }
}

const FCF_SCALE: f64 = 1e9;

const fn export_name(metric: Metric) -> &'static str {
    match metric {
        Metric::FreeCashFlow => "free_cash_flow_billions",
        _ => metric.as_str(),
    }
}

/// Value the scorer uses when a metric was not reported.
pub const fn default_value(metric: Metric) -> f64 {
    match metric {
        Metric::ForwardPe | Metric::Beta => 1.0,
        _ => 0.0,
    }
}

/// Raw inputs, sub-scores and final score for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub symbol: Symbol,
    /// Inputs exactly as retrieved; `None` was replaced by its default.
    pub inputs: Metrics,
    pub normalized: SubScores,
    pub score: f64,
}

impl ScoreRecord {
    /// Input after defaulting.
    pub fn input(&self, metric: Metric) -> f64 {
        self.inputs.get(metric).unwrap_or(default_value(metric))
    }

    /// Flat, ordered field list for tabular export: the eight inputs, the
    /// eight sub-scores, then `growth_score`. Free cash flow is exported in
    /// billions, the unit the scorer works in.
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        let mut fields = Vec::with_capacity(Metric::ALL.len() * 2 + 1);
        for metric in Metric::ALL {
            let value = match metric {
                Metric::FreeCashFlow => self.input(metric) / FCF_SCALE,
                _ => self.input(metric),
            };
            fields.push((export_name(metric), value));
        }
        for metric in Metric::ALL {
            fields.push((SubScores::field_name(metric), self.normalized.get(metric)));
        }
        fields.push(("growth_score", self.score));
        fields
    }

    /// Column names matching [`fields`](ScoreRecord::fields).
    pub fn field_names() -> Vec<&'static str> {
        Metric::ALL
            .into_iter()
            .map(export_name)
            .chain(Metric::ALL.into_iter().map(SubScores::field_name))
            .chain(std::iter::once("growth_score"))
            .collect()
    }
}

/// Pure scoring engine. Identical inputs always give identical records.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, bundles: &BTreeMap<Symbol, MetricBundle>) -> BTreeMap<Symbol, ScoreRecord> {
        bundles
            .iter()
            .map(|(symbol, bundle)| (symbol.clone(), self.score_metrics(symbol, &bundle.metrics)))
            .collect()
    }

    pub fn score_metrics(&self, symbol: &Symbol, metrics: &Metrics) -> ScoreRecord {
        let normalized = normalize(metrics, self.config.clamp);
        let score = Metric::ALL
            .into_iter()
            .map(|metric| self.config.weights.get(metric) * normalized.get(metric))
            .sum::<f64>()
            * 100.0;

        ScoreRecord {
            symbol: symbol.clone(),
            inputs: *metrics,
            normalized,
            score,
        }
    }
}

pub fn normalize(metrics: &Metrics, clamp: ClampPolicy) -> SubScores {
    let value = |metric| metrics.get(metric).unwrap_or(default_value(metric));

    let forward_pe = value(Metric::ForwardPe);
    // 1 / ±0 would be infinite.
    let pe_norm = if forward_pe == 0.0 {
        1.0
    } else {
        (1.0 / forward_pe).min(1.0)
    };

    let raw = SubScores {
        revenue_growth_norm: (value(Metric::RevenueGrowth) + 1.0) / 2.0,
        profit_margin_norm: (value(Metric::ProfitMargin) + 1.0) / 2.0,
        pe_norm,
        beta_norm: 1.0 - value(Metric::Beta).min(1.0),
        roe_norm: value(Metric::ReturnOnEquity) / 50.0,
        debt_to_equity_norm: 1.0 - (value(Metric::DebtToEquity) / 2.0).min(1.0),
        fcf_norm: (value(Metric::FreeCashFlow) / FCF_SCALE / 10.0).min(1.0),
        dividend_yield_norm: (value(Metric::DividendYield) / 0.1).min(1.0),
    };

    match clamp {
        ClampPolicy::Reference => raw,
        ClampPolicy::Bounded => {
            let unit = |v: f64| v.clamp(0.0, 1.0);
            SubScores {
                revenue_growth_norm: unit(raw.revenue_growth_norm),
                profit_margin_norm: unit(raw.profit_margin_norm),
                pe_norm: unit(raw.pe_norm),
                beta_norm: unit(raw.beta_norm),
                roe_norm: unit(raw.roe_norm),
                debt_to_equity_norm: unit(raw.debt_to_equity_norm),
                fcf_norm: unit(raw.fcf_norm),
                dividend_yield_norm: unit(raw.dividend_yield_norm),
            }
        }
    }
}

/// Records sorted by descending score; ties ordered by ticker.
pub fn rank(scores: &BTreeMap<Symbol, ScoreRecord>) -> Vec<&ScoreRecord> {
    let mut ranked = scores.values().collect::<Vec<_>>();
    ranked.sort_by(|left, right| match right.score.total_cmp(&left.score) {
        Ordering::Equal => left.symbol.cmp(&right.symbol),
        other => other,
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    #[test]
    fn absent_metrics_use_defaults() {
        let record = Scorer::default().score_metrics(&symbol("AAPL"), &Metrics::default());

        assert_eq!(record.normalized.pe_norm, 1.0);
        assert_eq!(record.normalized.beta_norm, 0.0);
        assert_eq!(record.normalized.revenue_growth_norm, 0.5);
        assert_eq!(record.input(Metric::ForwardPe), 1.0);
        // 0.25*0.5 + 0.15*0.5 + 0.15*1 + 0.10*1
        assert!((record.score - 45.0).abs() < 1e-9);
    }

    #[test]
    fn reference_policy_leaves_growth_unclamped() {
        let metrics = Metrics::default().with(Metric::RevenueGrowth, 3.0);

        let reference = normalize(&metrics, ClampPolicy::Reference);
        let bounded = normalize(&metrics, ClampPolicy::Bounded);

        assert_eq!(reference.revenue_growth_norm, 2.0);
        assert_eq!(bounded.revenue_growth_norm, 1.0);
    }

    #[test]
    fn zero_forward_pe_does_not_produce_infinity() {
        let metrics = Metrics::default().with(Metric::ForwardPe, -0.0);
        assert_eq!(normalize(&metrics, ClampPolicy::Reference).pe_norm, 1.0);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let weights = ScoreWeights {
            beta: 0.10,
            ..ScoreWeights::default()
        };
        assert!(matches!(
            weights.validate(),
            Err(ValidationError::WeightsDoNotSumToOne { .. })
        ));
        assert!(ScoreWeights::default().validate().is_ok());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let weights = ScoreWeights {
            beta: -0.05,
            dividend_yield: 0.15,
            ..ScoreWeights::default()
        };
        assert_eq!(
            weights.validate(),
            Err(ValidationError::InvalidWeight { field: "beta" })
        );
    }

    #[test]
    fn fields_follow_declared_order() {
        let record = Scorer::default().score_metrics(&symbol("AAPL"), &Metrics::default());
        let names = record
            .fields()
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();

        assert_eq!(names, ScoreRecord::field_names());
        assert_eq!(names.len(), 17);
        assert_eq!(names[8], "revenue_growth_norm");
        assert_eq!(names[16], "growth_score");
    }

    #[test]
    fn rank_breaks_ties_by_ticker() {
        let scorer = Scorer::default();
        let strong = Metrics::default().with(Metric::RevenueGrowth, 0.5);
        let scores = [
            (symbol("MSFT"), scorer.score_metrics(&symbol("MSFT"), &Metrics::default())),
            (symbol("AAPL"), scorer.score_metrics(&symbol("AAPL"), &Metrics::default())),
            (symbol("NVDA"), scorer.score_metrics(&symbol("NVDA"), &strong)),
        ]
        .into_iter()
        .collect::<BTreeMap<_, _>>();

        let order = rank(&scores)
            .into_iter()
            .map(|record| record.symbol.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["NVDA", "AAPL", "MSFT"]);
    }
}
