//! Diagnostics observer passed into every pipeline stage.
//!
//! Parsing, classification, aggregation, comparison and run/batch processing
//! emit `Diagnostic`s to whatever observer the caller hands them. The binary
//! uses `LogDiagnostics`; tests use `MemoryDiagnostics` and assert on what was
//! emitted. Output writers (reports, plots, run workspaces), configuration
//! loading and pipeline construction log through the `log` facade directly.

use std::sync::Mutex;

use log::Level;

/// One diagnostic emitted by a pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    /// Run the diagnostic belongs to, if it is run-scoped
    pub run: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn info(run: &str, message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            run: Some(run.to_string()),
            message: message.into(),
        }
    }

    pub fn warn(run: &str, message: impl Into<String>) -> Self {
        Self {
            level: Level::Warn,
            run: Some(run.to_string()),
            message: message.into(),
        }
    }

    pub fn debug(run: &str, message: impl Into<String>) -> Self {
        Self {
            level: Level::Debug,
            run: Some(run.to_string()),
            message: message.into(),
        }
    }

    /// Diagnostic that is not tied to a particular run
    pub fn global(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            run: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.run {
            Some(run) => write!(f, "[{}] {}", run, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Observer receiving diagnostics from pipeline stages
pub trait Diagnostics: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn emit(&self, diagnostic: Diagnostic) {
        log::log!(diagnostic.level, "{}", diagnostic);
    }
}

/// Keeps every diagnostic in memory
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Warnings only
    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|d| d.level == Level::Warn)
            .collect()
    }

    /// True if any diagnostic message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|d| d.message.contains(needle))
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn emit(&self, diagnostic: Diagnostic) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_diagnostics_records_in_order() {
        let sink = MemoryDiagnostics::new();
        sink.emit(Diagnostic::info("v1", "parsed 3 flows"));
        sink.emit(Diagnostic::warn("v1", "flow 7 skipped"));
        sink.emit(Diagnostic::global(Level::Debug, "done"));

        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "parsed 3 flows");
        assert_eq!(sink.warnings().len(), 1);
        assert!(sink.contains("flow 7"));
        assert_eq!(entries[1].to_string(), "[v1] flow 7 skipped");
        assert_eq!(entries[2].to_string(), "done");
    }
}
