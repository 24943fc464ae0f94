use std::time::Instant;

use growthscan_core::{
    AnalysisReport, AnalysisRequest, Analyzer, EnvelopeError, Metric, ScoreRecord, ScoringConfig,
};
use serde_json::{json, Value};
use tracing::info;

use crate::cli::AnalyzeArgs;
use crate::error::CliError;
use crate::export;
use crate::output::Table;

use super::CommandResult;

pub async fn run(args: &AnalyzeArgs, analyzer: &Analyzer) -> Result<CommandResult, CliError> {
    let scoring = if args.bounded {
        ScoringConfig::bounded()
    } else {
        ScoringConfig::default()
    };
    let request = AnalysisRequest::from_batch(&args.batch, scoring);
    if request.queries.is_empty() {
        return Err(CliError::Command(String::from(
            "batch must contain at least one company query",
        )));
    }

    let started = Instant::now();
    let report = analyzer.analyze(&request).await?;
    let ranked = report.ranked();

    let exported = match &args.export {
        Some(path) => {
            let rows = export::write_scores_csv(path, &ranked)?;
            info!(path = %path.display(), rows, "scores exported");
            Some(json!({ "path": path.display().to_string(), "rows": rows }))
        }
        None => None,
    };

    let data = json!({
        "matched_companies": report.matches.matched_companies,
        "unresolved_queries": report.matches.unresolved_queries,
        "ranking": ranking_json(&report, &ranked),
        "metrics": report.bundles.values().map(|bundle| json!({
            "ticker": bundle.symbol,
            "profile": bundle.profile,
            "metrics": bundle.metrics,
            "provenance": bundle.provenance,
            "price_points": bundle.prices.len(),
            "latest_close": bundle.prices.latest_close(),
        })).collect::<Vec<_>>(),
        "failures": report.failures,
        "export": exported,
    });

    Ok(CommandResult::ok(data, analyzer.source_chain())
        .with_warnings(report.warnings())
        .with_errors(report_errors(&report))
        .with_latency(started.elapsed().as_millis() as u64)
        .with_table(ranking_table(&report, &ranked)))
}

fn ranking_json(report: &AnalysisReport, ranked: &[&ScoreRecord]) -> Vec<Value> {
    ranked
        .iter()
        .enumerate()
        .map(|(index, record)| {
            json!({
                "rank": index + 1,
                "ticker": record.symbol,
                "name": company_name(report, record),
                "growth_score": record.score,
                "inputs": record.inputs,
                "normalized": record.normalized,
            })
        })
        .collect()
}

fn ranking_table(report: &AnalysisReport, ranked: &[&ScoreRecord]) -> Table {
    let mut table = Table::new(
        ["rank", "ticker", "name", "score"]
            .into_iter()
            .map(String::from)
            .chain(Metric::ALL.into_iter().map(|metric| metric.label().to_owned())),
    );

    for (index, record) in ranked.iter().enumerate() {
        let mut row = vec![
            (index + 1).to_string(),
            record.symbol.to_string(),
            company_name(report, record).unwrap_or_default(),
            format!("{:.2}", record.score),
        ];
        row.extend(Metric::ALL.into_iter().map(|metric| {
            record
                .inputs
                .get(metric)
                .map_or_else(|| String::from("-"), |value| format!("{value:.4}"))
        }));
        table.push_row(row);
    }

    table
}

/// Directory name first, then whatever the provider reported.
fn company_name(report: &AnalysisReport, record: &ScoreRecord) -> Option<String> {
    report
        .matches
        .matched_companies
        .iter()
        .find(|company| company.ticker == record.symbol)
        .map(|company| company.name.clone())
        .or_else(|| {
            report
                .bundles
                .get(&record.symbol)
                .and_then(|bundle| bundle.profile.name.clone())
        })
}

fn report_errors(report: &AnalysisReport) -> Vec<EnvelopeError> {
    report
        .matches
        .unresolved_queries
        .iter()
        .map(|query| EnvelopeError::unresolved_query(query))
        .chain(report.failures.iter().map(EnvelopeError::retrieval_failed))
        .collect()
}
