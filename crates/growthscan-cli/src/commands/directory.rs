use std::time::Instant;

use growthscan_core::Analyzer;
use serde_json::json;

use crate::cli::DirectoryArgs;
use crate::error::CliError;
use crate::output::Table;

use super::CommandResult;

pub async fn run(args: &DirectoryArgs, analyzer: &Analyzer) -> Result<CommandResult, CliError> {
    let started = Instant::now();
    let directory = analyzer.directory().await?;

    let companies = match &args.sector {
        Some(sector) => directory.in_sector(sector),
        None => directory.records().iter().collect(),
    };

    let mut warnings = Vec::new();
    if let Some(sector) = &args.sector {
        if companies.is_empty() {
            warnings.push(format!(
                "no companies in sector '{sector}'; known sectors: {}",
                directory.sectors().join(", ")
            ));
        }
    }

    let mut table = Table::new(["ticker", "name", "sector"]);
    for company in &companies {
        table.push_row(vec![
            company.ticker.to_string(),
            company.name.clone(),
            company.sector.clone(),
        ]);
    }

    let data = json!({
        "count": companies.len(),
        "sectors": directory.sectors(),
        "companies": companies,
    });

    Ok(CommandResult::ok(data, Vec::new())
        .with_warnings(warnings)
        .with_latency(started.elapsed().as_millis() as u64)
        .with_table(table))
}
