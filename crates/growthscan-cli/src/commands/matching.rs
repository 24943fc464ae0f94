use std::time::Instant;

use growthscan_core::{split_batch, Analyzer, EnvelopeError};
use serde_json::json;

use crate::cli::MatchArgs;
use crate::error::CliError;
use crate::output::Table;

use super::CommandResult;

pub async fn run(args: &MatchArgs, analyzer: &Analyzer) -> Result<CommandResult, CliError> {
    let queries = split_batch(&args.batch);
    if queries.is_empty() {
        return Err(CliError::Command(String::from(
            "batch must contain at least one company query",
        )));
    }

    let started = Instant::now();
    let matches = analyzer.match_only(&queries).await?;

    let mut table = Table::new(["ticker", "name", "sector"]);
    for company in &matches.matched_companies {
        table.push_row(vec![
            company.ticker.to_string(),
            company.name.clone(),
            company.sector.clone(),
        ]);
    }

    let errors = matches
        .unresolved_queries
        .iter()
        .map(|query| EnvelopeError::unresolved_query(query))
        .collect();

    Ok(CommandResult::ok(json!(matches), Vec::new())
        .with_errors(errors)
        .with_latency(started.elapsed().as_millis() as u64)
        .with_table(table))
}
