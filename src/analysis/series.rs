//! Time-series table loading.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use super::types::SeriesTable;
use crate::error::AnalyzerError;

/// Load a per-timestep metrics CSV
pub fn load_series(path: &Path, run: &str) -> Result<SeriesTable, AnalyzerError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => AnalyzerError::SeriesNotFound {
            run: run.to_string(),
            path: path.to_path_buf(),
        },
        _ => AnalyzerError::Io {
            run: run.to_string(),
            path: path.to_path_buf(),
            source,
        },
    })?;

    read_series(file, run, path)
}

/// Read a metrics table from any reader; `path` is only used in error messages.
///
/// Cells that are empty or not numeric become NaN and are ignored by means.
pub fn read_series<R: Read>(reader: R, run: &str, path: &Path) -> Result<SeriesTable, AnalyzerError> {
    let parse_error = |e: csv::Error| AnalyzerError::SeriesParse {
        run: run.to_string(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<String> = csv
        .headers()
        .map_err(parse_error)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if columns.iter().all(|c| c.is_empty()) {
        return Err(AnalyzerError::SeriesParse {
            run: run.to_string(),
            path: path.to_path_buf(),
            reason: "table has no header row".to_string(),
        });
    }

    let mut rows = Vec::new();
    for record in csv.records() {
        let record = record.map_err(parse_error)?;
        let row: Vec<f64> = (0..columns.len())
            .map(|i| {
                record
                    .get(i)
                    .and_then(|cell| cell.parse::<f64>().ok())
                    .unwrap_or(f64::NAN)
            })
            .collect();
        rows.push(row);
    }

    Ok(SeriesTable {
        run: run.to_string(),
        columns,
        rows,
    })
}
