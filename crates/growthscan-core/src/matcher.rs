//! Resolves free-text company queries to directory tickers.
//!
//! A query matches a [`CompanyRecord`] when the record's lowercased name
//! contains every whitespace-separated query token as a substring. There is
//! no edit-distance matching.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{CompanyRecord, Symbol};

/// Outcome of matching one batch of queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    /// Union of tickers across every query.
    pub resolved_tickers: BTreeSet<Symbol>,
    /// Matches in query order; overlapping queries may repeat a record.
    pub matched_companies: Vec<CompanyRecord>,
    /// Original text of each query that matched nothing.
    pub unresolved_queries: Vec<String>,
}

impl MatchResult {
    pub fn is_empty(&self) -> bool {
        self.resolved_tickers.is_empty()
    }
}

/// Splits the comma-separated batch form into queries, dropping blanks.
pub fn split_batch(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn match_queries<S: AsRef<str>>(queries: &[S], directory: &[CompanyRecord]) -> MatchResult {
    let lowered_names = directory
        .iter()
        .map(|record| record.name.to_lowercase())
        .collect::<Vec<_>>();

    let mut result = MatchResult::default();
    for query in queries {
        let query = query.as_ref();
        let normalized = query.trim().to_lowercase();
        let tokens = normalized.split_whitespace().collect::<Vec<_>>();

        // An empty token list would otherwise match the whole directory.
        if tokens.is_empty() {
            result.unresolved_queries.push(query.to_owned());
            continue;
        }

        let before = result.matched_companies.len();
        for (record, name) in directory.iter().zip(&lowered_names) {
            if tokens.iter().all(|token| name.contains(token)) {
                result.resolved_tickers.insert(record.ticker.clone());
                result.matched_companies.push(record.clone());
            }
        }

        if result.matched_companies.len() == before {
            result.unresolved_queries.push(query.to_owned());
        }
    }

    result
}
