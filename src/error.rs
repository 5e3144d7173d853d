//! Error kinds raised by the analysis pipeline.
//!
//! Zero-division and empty-result cases are not errors: they surface as the
//! documented sentinel values on `DerivedMetrics` and `AggregateReport`.

use std::path::PathBuf;

use crate::config::ValidationError;

/// Errors that can abort a record, a run, or pipeline construction
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Malformed time value '{token}': numeric portion is not a real number")]
    MalformedUnit { token: String },

    #[error("Run '{run}': flow trace {} is not well-formed: {reason}", path.display())]
    TraceParse {
        run: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Run '{run}': flow trace not found at {}", path.display())]
    TraceNotFound { run: String, path: PathBuf },

    #[error("Run '{run}': time-series table not found at {}", path.display())]
    SeriesNotFound { run: String, path: PathBuf },

    #[error("Run '{run}': time-series table {} could not be read: {reason}", path.display())]
    SeriesParse {
        run: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Run '{run}': required column '{column}' is missing from the time-series table")]
    SchemaMismatch { run: String, column: String },

    #[error("Internal consistency fault: destination port {port} matched more than one entity")]
    ClassificationAmbiguity { port: u16 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("Run '{run}': failed to read {}: {source}", path.display())]
    Io {
        run: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnalyzerError {
    /// Run identifier the error belongs to, if any
    pub fn run(&self) -> Option<&str> {
        match self {
            AnalyzerError::TraceParse { run, .. }
            | AnalyzerError::TraceNotFound { run, .. }
            | AnalyzerError::SeriesNotFound { run, .. }
            | AnalyzerError::SeriesParse { run, .. }
            | AnalyzerError::SchemaMismatch { run, .. }
            | AnalyzerError::Io { run, .. } => Some(run),
            _ => None,
        }
    }

    /// True for errors caused by missing input files
    pub fn is_missing_input(&self) -> bool {
        matches!(
            self,
            AnalyzerError::TraceNotFound { .. } | AnalyzerError::SeriesNotFound { .. }
        )
    }
}
