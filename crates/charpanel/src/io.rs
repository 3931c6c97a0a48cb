//! In-memory and CSV implementations of the pipeline collaborators.

use crate::{
    PanelError, Result,
    traits::{PanelSink, PanelSource},
};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default file name of the normalized panel.
pub const NORMALIZED_FILE: &str = "datashare_re.csv";

/// Default file name of the portfolio return table.
pub const PORTFOLIO_RETURNS_FILE: &str = "portfolio_rets.csv";

/// Source backed by frames already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    characteristics: DataFrame,
    returns: DataFrame,
}

impl MemorySource {
    /// Wrap a characteristic panel and a return panel.
    pub const fn new(characteristics: DataFrame, returns: DataFrame) -> Self {
        Self {
            characteristics,
            returns,
        }
    }
}

impl PanelSource for MemorySource {
    fn characteristic_panel(&self) -> Result<DataFrame> {
        Ok(self.characteristics.clone())
    }

    fn return_panel(&self) -> Result<DataFrame> {
        Ok(self.returns.clone())
    }
}

/// Sink that keeps the output frames.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Normalized panel, once written
    pub normalized: Option<DataFrame>,
    /// Portfolio returns, once written
    pub portfolio_returns: Option<DataFrame>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PanelSink for MemorySink {
    fn write_normalized(&mut self, frame: &DataFrame) -> Result<()> {
        self.normalized = Some(frame.clone());
        Ok(())
    }

    fn write_portfolio_returns(&mut self, frame: &DataFrame) -> Result<()> {
        self.portfolio_returns = Some(frame.clone());
        Ok(())
    }
}

/// Source reading both tables from CSV files with a header row.
#[derive(Debug, Clone)]
pub struct CsvSource {
    characteristics: PathBuf,
    returns: PathBuf,
}

impl CsvSource {
    /// Read the characteristic panel and return panel from these paths.
    pub fn new(characteristics: impl Into<PathBuf>, returns: impl Into<PathBuf>) -> Self {
        Self {
            characteristics: characteristics.into(),
            returns: returns.into(),
        }
    }
}

impl PanelSource for CsvSource {
    fn characteristic_panel(&self) -> Result<DataFrame> {
        read_csv_frame(&self.characteristics)
    }

    fn return_panel(&self) -> Result<DataFrame> {
        read_csv_frame(&self.returns)
    }
}

/// Sink writing both tables as CSV files into a directory.
#[derive(Debug, Clone)]
pub struct CsvSink {
    normalized: PathBuf,
    portfolio_returns: PathBuf,
}

impl CsvSink {
    /// Write to [`NORMALIZED_FILE`] and [`PORTFOLIO_RETURNS_FILE`] in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(NORMALIZED_FILE), dir.join(PORTFOLIO_RETURNS_FILE))
    }

    /// Write to explicit file paths.
    pub fn new(normalized: impl Into<PathBuf>, portfolio_returns: impl Into<PathBuf>) -> Self {
        Self {
            normalized: normalized.into(),
            portfolio_returns: portfolio_returns.into(),
        }
    }
}

impl PanelSink for CsvSink {
    fn write_normalized(&mut self, frame: &DataFrame) -> Result<()> {
        write_csv_frame(frame, &self.normalized)
    }

    fn write_portfolio_returns(&mut self, frame: &DataFrame) -> Result<()> {
        write_csv_frame(frame, &self.portfolio_returns)
    }
}

/// Parse one cell; empty cells and `nan` in any case are missing.
fn parse_cell(field: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    field.parse::<f64>().map(|v| (!v.is_nan()).then_some(v))
}

/// Read a numeric CSV file into a frame of nullable `Float64` columns.
///
/// Every column must be numeric. Key columns are cast to integers later by
/// the stages that use them.
pub fn read_csv_frame(path: &Path) -> Result<DataFrame> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, csv::Position::line);
        for ((field, column), header) in record.iter().zip(values.iter_mut()).zip(headers.iter()) {
            let value = parse_cell(field).map_err(|_| PanelError::InvalidValue {
                column: header.to_string(),
                line,
                value: field.to_string(),
            })?;
            column.push(value);
        }
    }

    let columns = headers
        .iter()
        .zip(values)
        .map(|(name, column)| Column::new(name.into(), column))
        .collect();
    let frame = DataFrame::new(columns)?;

    info!(path = %path.display(), rows = frame.height(), columns = frame.width(), "read csv");
    Ok(frame)
}

/// Write a frame as CSV.
///
/// `Int64` columns are written as integers, every other column as `f64`;
/// missing values become empty cells.
pub fn write_csv_frame(frame: &DataFrame, path: &Path) -> Result<()> {
    let columns: Vec<Column> = frame
        .get_columns()
        .iter()
        .map(|c| match c.dtype() {
            DataType::Int64 => Ok(c.clone()),
            _ => c.cast(&DataType::Float64),
        })
        .collect::<PolarsResult<_>>()?;

    let mut cells: Vec<Box<dyn Iterator<Item = Option<String>> + '_>> =
        Vec::with_capacity(columns.len());
    for column in &columns {
        if column.dtype() == &DataType::Int64 {
            cells.push(Box::new(
                column.i64()?.into_iter().map(|v| v.map(|x| x.to_string())),
            ));
        } else {
            cells.push(Box::new(
                column.f64()?.into_iter().map(|v| v.map(|x| x.to_string())),
            ));
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns.iter().map(|c| c.name().as_str()))?;
    let mut row = Vec::with_capacity(cells.len());
    for _ in 0..frame.height() {
        row.clear();
        row.extend(cells.iter_mut().map(|cell| cell.next().flatten().unwrap_or_default()));
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = frame.height(), "wrote csv");
    Ok(())
}
