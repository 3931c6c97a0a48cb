//! Error types for panel preparation.

use std::fmt;
use thiserror::Error;

/// Result type for panel operations.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Errors that can occur while preparing the characteristic panel.
#[derive(Debug, Error)]
pub enum PanelError {
    /// Missing required column in input data
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// A cross-sectional slice had no rows
    #[error("Empty cross-sectional slice")]
    EmptySlice,

    /// Characteristic not found in the taxonomy
    #[error("Characteristic not found: {0}")]
    NotFound(String),

    /// Characteristic registered twice
    #[error("Duplicate characteristic: {0}")]
    DuplicateCharacteristic(String),

    /// Date code that is not a valid `YYYYMMDD` calendar date
    #[error("Invalid date code: {0}")]
    InvalidDate(i64),

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date of the range
        start: String,
        /// End date of the range
        end: String,
    },

    /// Configuration rejected during validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cell that could not be parsed as a number
    #[error("Invalid value {value:?} in column {column} at line {line}")]
    InvalidValue {
        /// Column header
        column: String,
        /// One-based line in the source file
        line: u64,
        /// Raw cell text
        value: String,
    },

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// CSV reader or writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON configuration error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A unit of batch work (one date, or one date and characteristic) that failed.
///
/// Failed units are reported alongside the output instead of aborting the
/// batch; their rows or values are left missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Date code of the failed unit
    pub date: i64,
    /// Characteristic, for calculator units
    pub characteristic: Option<String>,
    /// Rendered error
    pub reason: String,
}

impl UnitFailure {
    /// Failure of a whole date slice.
    pub fn date(date: i64, error: &PanelError) -> Self {
        Self {
            date,
            characteristic: None,
            reason: error.to_string(),
        }
    }

    /// Failure of a single (date, characteristic) pair.
    pub fn pair(date: i64, characteristic: &str, error: &PanelError) -> Self {
        Self {
            date,
            characteristic: Some(characteristic.to_string()),
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.characteristic {
            Some(characteristic) => {
                write!(f, "date {} / {}: {}", self.date, characteristic, self.reason)
            }
            None => write!(f, "date {}: {}", self.date, self.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_failure_display() {
        let err = PanelError::MissingColumn("bm".to_string());
        assert_eq!(
            UnitFailure::pair(19570131, "bm", &err).to_string(),
            "date 19570131 / bm: Missing required column: bm"
        );
        assert_eq!(
            UnitFailure::date(19570131, &PanelError::EmptySlice).to_string(),
            "date 19570131: Empty cross-sectional slice"
        );
    }
}
