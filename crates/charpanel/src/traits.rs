//! Collaborator traits at the edges of the pipeline.
//!
//! The pipeline reads two tables from a [`PanelSource`] and hands two tables
//! to a [`PanelSink`]. Where the tables come from and where they go (files,
//! memory, a database) is up to the implementation.

use crate::Result;
use polars::prelude::*;

/// Supplies the two input tables.
pub trait PanelSource: std::fmt::Debug {
    /// Stock-date characteristic panel.
    ///
    /// One row per (stock, date), one column per characteristic; missing
    /// values are nulls.
    fn characteristic_panel(&self) -> Result<DataFrame>;

    /// Realized excess returns, one row per (stock, date).
    ///
    /// Duplicate keys are allowed; the first row for a key wins.
    fn return_panel(&self) -> Result<DataFrame>;
}

/// Accepts the two output tables.
pub trait PanelSink: std::fmt::Debug {
    /// Normalized characteristic panel, one row per input record.
    fn write_normalized(&mut self, frame: &DataFrame) -> Result<()>;

    /// Portfolio return observations, one row per date.
    fn write_portfolio_returns(&mut self, frame: &DataFrame) -> Result<()>;
}
