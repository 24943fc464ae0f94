mod analyze;
mod directory;
mod matching;

use growthscan_core::{Analyzer, Envelope, EnvelopeError, ProviderId, Settings};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::Metadata;
use crate::output::Table;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
    pub source_chain: Vec<ProviderId>,
    pub table: Option<Table>,
}

impl CommandResult {
    pub fn ok(data: Value, source_chain: Vec<ProviderId>) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            source_chain,
            table: None,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }
}

/// Envelope plus the optional tabular view used by `--format table`.
pub struct CommandOutput {
    pub envelope: Envelope<Value>,
    pub table: Option<Table>,
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let settings = resolve_settings(cli)?;
    debug!(
        timeout_ms = settings.provider_timeout.as_millis() as u64,
        concurrency = settings.max_concurrency,
        history_years = settings.history_years,
        "settings resolved"
    );
    let analyzer = Analyzer::from_settings(&settings);

    let command_result = match &cli.command {
        Command::Analyze(args) => analyze::run(args, &analyzer).await?,
        Command::Match(args) => matching::run(args, &analyzer).await?,
        Command::Directory(args) => directory::run(args, &analyzer).await?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        latency_ms,
        source_chain,
        table,
    } = command_result;

    let mut metadata = Metadata::new(source_chain, latency_ms);
    for warning in warnings {
        metadata.push_warning(warning);
    }
    let meta = metadata.into_envelope_meta()?;

    Ok(CommandOutput {
        envelope: Envelope::with_errors(meta, data, errors)?,
        table,
    })
}

/// Environment settings with command-line overrides applied on top.
fn resolve_settings(cli: &Cli) -> Result<Settings, CliError> {
    let mut settings = Settings::from_env()?;

    if let Some(timeout_ms) = cli.timeout_ms {
        settings.provider_timeout = std::time::Duration::from_millis(timeout_ms);
    }
    if let Some(concurrency) = cli.concurrency {
        settings.max_concurrency = concurrency;
    }
    if let Some(path) = &cli.directory_file {
        settings.directory_file = Some(path.clone());
    }
    if let Command::Analyze(args) = &cli.command {
        if let Some(years) = args.history_years {
            settings.history_years = years;
        }
    }

    settings.validate()?;
    Ok(settings)
}
