//! Pipeline configuration.
//!
//! Every field has a default matching the monthly characteristic dataset
//! layout, so an empty JSON object is a valid configuration.

use crate::{PanelError, Result, taxonomy::Taxonomy};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column names of the two input tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    /// Stock identifier column, shared by both tables
    pub stock_id: String,
    /// Date column of the characteristic panel
    pub date: String,
    /// Date column of the return table
    pub return_date: String,
    /// Excess return column of the return table
    pub excess_return: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            stock_id: "permno".to_string(),
            date: "DATE".to_string(),
            return_date: "date".to_string(),
            excess_return: "ret-rf".to_string(),
        }
    }
}

/// Configuration for decile portfolio construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    /// Number of buckets; each leg holds `floor(n / buckets)` stocks
    pub buckets: usize,
    /// Scale applied to the long minus short spread
    pub leg_weight: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            buckets: 10,
            leg_weight: 0.5,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input column names
    pub columns: ColumnNames,
    /// Portfolio construction
    pub portfolio: PortfolioConfig,
    /// Optional subset of the default taxonomy
    pub characteristics: Option<Vec<String>>,
    /// First date code to keep (inclusive, `YYYYMMDD`)
    pub start_date: Option<i64>,
    /// Last date code to keep (inclusive, `YYYYMMDD`)
    pub end_date: Option<i64>,
    /// Run every stage on the calling thread
    pub force_sequential: bool,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.portfolio.buckets == 0 {
            return Err(PanelError::InvalidConfig(
                "portfolio.buckets must be at least 1".to_string(),
            ));
        }
        if !self.portfolio.leg_weight.is_finite() {
            return Err(PanelError::InvalidConfig(
                "portfolio.leg_weight must be finite".to_string(),
            ));
        }

        let start = self.start_date.map(parse_date_code).transpose()?;
        let end = self.end_date.map(parse_date_code).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(PanelError::InvalidDateRange {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }
        }

        if let Some(names) = &self.characteristics {
            if names.is_empty() {
                return Err(PanelError::InvalidConfig(
                    "characteristics must not be empty when given".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the characteristic set this configuration runs over.
    pub fn taxonomy(&self) -> Result<Taxonomy> {
        let taxonomy = Taxonomy::with_defaults();
        match &self.characteristics {
            Some(names) => taxonomy.subset(names),
            None => Ok(taxonomy),
        }
    }

    /// Whether a date range is configured at all.
    pub const fn has_date_range(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }
}

/// Parse a `YYYYMMDD` integer date code into a calendar date.
pub fn parse_date_code(code: i64) -> Result<NaiveDate> {
    if !(10_000_101..=99_991_231).contains(&code) {
        return Err(PanelError::InvalidDate(code));
    }
    let year = (code / 10_000) as i32;
    let month = (code / 100 % 100) as u32;
    let day = (code % 100) as u32;
    NaiveDate::from_ymd_opt(year, month, day).ok_or(PanelError::InvalidDate(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_dataset_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.columns.stock_id, "permno");
        assert_eq!(config.columns.date, "DATE");
        assert_eq!(config.columns.return_date, "date");
        assert_eq!(config.columns.excess_return, "ret-rf");
        assert_eq!(config.portfolio.buckets, 10);
        assert_eq!(config.portfolio.leg_weight, 0.5);
        assert!(config.validate().is_ok());
        assert_eq!(config.taxonomy().unwrap().len(), 94);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"portfolio": {"buckets": 5}, "characteristics": ["mom1m", "bm"]}"#,
        )
        .unwrap();
        assert_eq!(config.portfolio.buckets, 5);
        assert_eq!(config.portfolio.leg_weight, 0.5);
        assert_eq!(config.columns, ColumnNames::default());
        assert_eq!(config.taxonomy().unwrap().names(), vec!["bm", "mom1m"]);
    }

    #[test]
    fn test_rejects_zero_buckets() {
        let mut config = PipelineConfig::default();
        config.portfolio.buckets = 0;
        assert!(matches!(
            config.validate(),
            Err(PanelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let config = PipelineConfig {
            start_date: Some(20200131),
            end_date: Some(19991231),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PanelError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_date_code() {
        let config = PipelineConfig {
            start_date: Some(20201341),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PanelError::InvalidDate(20201341))
        ));
    }

    #[test]
    fn test_has_date_range() {
        let config = PipelineConfig {
            end_date: Some(19801231),
            ..Default::default()
        };
        assert!(config.has_date_range());
        assert!(!PipelineConfig::default().has_date_range());
    }

    #[test]
    fn test_parse_date_code() {
        assert_eq!(
            parse_date_code(19570131).unwrap(),
            NaiveDate::from_ymd_opt(1957, 1, 31).unwrap()
        );
        assert!(parse_date_code(19570230).is_err());
    }
}
