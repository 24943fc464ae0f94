//! Flat CSV export of score records.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use growthscan_core::ScoreRecord;

use crate::error::CliError;

/// Writes one row per record, in the order given, with a leading `ticker`
/// column followed by every [`ScoreRecord`] field.
pub fn write_scores_csv(path: &Path, records: &[&ScoreRecord]) -> Result<usize, CliError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_scores(&mut writer, records)?;
    writer.flush()?;
    Ok(records.len())
}

fn write_scores<W: Write>(writer: &mut W, records: &[&ScoreRecord]) -> Result<(), CliError> {
    let mut header = vec!["ticker"];
    header.extend(ScoreRecord::field_names());
    writeln!(writer, "{}", header.join(","))?;

    for record in records {
        let mut cells = vec![escape_csv(record.symbol.as_str())];
        cells.extend(
            record
                .fields()
                .into_iter()
                .map(|(_, value)| format_number(value)),
        );
        writeln!(writer, "{}", cells.join(","))?;
    }

    Ok(())
}

fn format_number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}
