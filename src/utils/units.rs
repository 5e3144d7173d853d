//! Time unit normalization.
//!
//! FlowMonitor traces write time sums as suffixed tokens such as
//! `"+1.5e+06ns"`, `"50ms"` or `"2s"`. Everything downstream works in
//! milliseconds.

use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;

/// Recognized time-unit suffixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    #[serde(rename = "ns")]
    Nanoseconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "s")]
    Seconds,
}

impl TimeUnit {
    /// Token suffix for this unit
    pub fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
        }
    }

    /// Multiplier converting a value in this unit to milliseconds
    pub fn to_ms_factor(self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1e-6,
            TimeUnit::Milliseconds => 1.0,
            TimeUnit::Seconds => 1e3,
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Split a time token into its numeric portion and optional unit suffix.
///
/// Longer suffixes are checked first so `"5ms"` is not read as `"5m"` seconds.
///
/// # Examples
/// ```
/// use lteflow::utils::units::{split_time_token, TimeUnit};
///
/// assert_eq!(split_time_token("+2e3ns").unwrap(), (2000.0, Some(TimeUnit::Nanoseconds)));
/// assert_eq!(split_time_token("1.5").unwrap(), (1.5, None));
/// assert!(split_time_token("fast").is_err());
/// ```
pub fn split_time_token(token: &str) -> Result<(f64, Option<TimeUnit>), AnalyzerError> {
    let trimmed = token.trim();

    let (number, unit) = if let Some(n) = trimmed.strip_suffix("ns") {
        (n, Some(TimeUnit::Nanoseconds))
    } else if let Some(n) = trimmed.strip_suffix("ms") {
        (n, Some(TimeUnit::Milliseconds))
    } else if let Some(n) = trimmed.strip_suffix('s') {
        (n, Some(TimeUnit::Seconds))
    } else {
        (trimmed, None)
    };

    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok((value, unit)),
        _ => Err(AnalyzerError::MalformedUnit {
            token: token.to_string(),
        }),
    }
}

/// Normalize a time token to milliseconds.
///
/// Bare numbers are taken as already being milliseconds.
///
/// # Examples
/// ```
/// use lteflow::utils::units::normalize_to_ms;
///
/// assert_eq!(normalize_to_ms("50ms").unwrap(), 50.0);
/// assert_eq!(normalize_to_ms("2s").unwrap(), 2000.0);
/// assert_eq!(normalize_to_ms("12.5").unwrap(), 12.5);
/// ```
pub fn normalize_to_ms(token: &str) -> Result<f64, AnalyzerError> {
    normalize_with_bare_unit(token, TimeUnit::Milliseconds)
}

/// Normalize a time token to milliseconds, reading bare numbers in `bare_unit`.
pub fn normalize_with_bare_unit(token: &str, bare_unit: TimeUnit) -> Result<f64, AnalyzerError> {
    let (value, unit) = split_time_token(token)?;
    Ok(value * unit.unwrap_or(bare_unit).to_ms_factor())
}
