//! Decile long-short portfolio returns.
//!
//! For each date and characteristic, stocks are ranked by the normalized
//! characteristic. The long leg holds the top `floor(n / 10)` stocks and the
//! short leg the bottom `floor(n / 10)`, each chosen independently so the
//! legs may overlap on small cross-sections. Each leg earns the equal-weighted
//! mean of its members' realized excess returns and the observation is
//! `0.5 * (long - short)`.
//!
//! A leg with no matched returns has no mean; the observation is then
//! missing rather than zero.

use crate::{
    PanelError, Result, UnitFailure,
    config::{ColumnNames, PortfolioConfig},
    exec,
    frame::{coerce_keys, float_values, int_values, partition_by_date, require_columns, slice_for_date},
    taxonomy::Taxonomy,
};
use polars::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, info, warn};

/// Realized excess returns keyed by date and stock.
///
/// Only the first record seen for a (stock, date) key is kept; later
/// duplicates are counted and ignored. A first record with a missing return
/// still claims its key.
#[derive(Debug, Clone, Default)]
pub struct ReturnTable {
    by_date: HashMap<i64, HashMap<i64, Option<f64>>>,
    records: usize,
    duplicates: usize,
}

impl ReturnTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a return frame, in row order.
    ///
    /// Rows with a missing stock identifier or date are skipped.
    pub fn from_frame(frame: &DataFrame, columns: &ColumnNames) -> Result<Self> {
        require_columns(
            frame,
            &[
                columns.stock_id.as_str(),
                columns.return_date.as_str(),
                columns.excess_return.as_str(),
            ],
        )?;
        let stocks = int_values(frame, &columns.stock_id)?;
        let dates = int_values(frame, &columns.return_date)?;
        let returns = float_values(frame, &columns.excess_return)?;

        let mut table = Self::new();
        for ((stock, date), ret) in stocks.into_iter().zip(dates).zip(returns) {
            if let (Some(stock), Some(date)) = (stock, date) {
                table.insert(stock, date, ret);
            }
        }

        debug!(
            records = table.records,
            duplicates = table.duplicates,
            dates = table.by_date.len(),
            "indexed return table"
        );
        Ok(table)
    }

    /// Insert a record unless its key was already seen.
    ///
    /// Returns `false` for a duplicate key.
    pub fn insert(&mut self, stock: i64, date: i64, excess_return: Option<f64>) -> bool {
        match self.by_date.entry(date).or_default().entry(stock) {
            Entry::Occupied(_) => {
                self.duplicates += 1;
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(excess_return.filter(|r| !r.is_nan()));
                self.records += 1;
                true
            }
        }
    }

    /// Excess return of a stock on a date, if recorded and not missing.
    pub fn get(&self, date: i64, stock: i64) -> Option<f64> {
        self.by_date.get(&date)?.get(&stock).copied().flatten()
    }

    /// Equal-weighted mean return of `stocks` on `date`.
    ///
    /// Stocks without a return on that date are left out of the mean.
    /// Returns `None` when no stock matched.
    pub fn leg_return(&self, date: i64, stocks: &[i64]) -> Option<f64> {
        let on_date = self.by_date.get(&date)?;
        let (sum, count) = stocks
            .iter()
            .filter_map(|stock| on_date.get(stock).copied().flatten())
            .fold((0.0, 0usize), |(sum, count), r| (sum + r, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Number of distinct keys kept.
    pub const fn len(&self) -> usize {
        self.records
    }

    /// Whether the table holds no records.
    pub const fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Number of duplicate records dropped.
    pub const fn duplicates(&self) -> usize {
        self.duplicates
    }
}

/// Stock identifiers in the long and short legs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortfolioLegs {
    /// Highest-ranked stocks, best first
    pub long: Vec<i64>,
    /// Lowest-ranked stocks, in descending rank order
    pub short: Vec<i64>,
}

/// Descending order with missing values last.
fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// The normalized characteristics of every stock on one date.
#[derive(Debug, Clone)]
pub struct CrossSection {
    date: i64,
    stocks: Vec<Option<i64>>,
    values: HashMap<String, Vec<Option<f64>>>,
}

impl CrossSection {
    /// Extract a cross-section from the rows of a single date.
    ///
    /// Characteristic columns absent from `slice` are left out; asking for
    /// them later fails with [`PanelError::MissingColumn`].
    pub fn from_slice<S: AsRef<str>>(
        date: i64,
        slice: &DataFrame,
        stock_id: &str,
        characteristics: &[S],
    ) -> Result<Self> {
        let stocks = int_values(slice, stock_id)?;
        let mut values = HashMap::with_capacity(characteristics.len());
        for name in characteristics {
            let name = name.as_ref();
            if slice.column(name).is_ok() {
                values.insert(name.to_string(), float_values(slice, name)?);
            }
        }

        Ok(Self {
            date,
            stocks,
            values,
        })
    }

    /// Date of the cross-section.
    pub const fn date(&self) -> i64 {
        self.date
    }

    /// Number of stocks observed.
    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    /// Whether no stock was observed.
    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    /// Form the long and short legs for a characteristic.
    ///
    /// Stocks are sorted by descending value with a stable sort, so ties
    /// keep their row order. Each leg holds `floor(n / buckets)` rows.
    pub fn legs(&self, characteristic: &str, buckets: usize) -> Result<PortfolioLegs> {
        let values = self
            .values
            .get(characteristic)
            .ok_or_else(|| PanelError::MissingColumn(characteristic.to_string()))?;
        if buckets == 0 {
            return Err(PanelError::InvalidConfig(
                "portfolio.buckets must be at least 1".to_string(),
            ));
        }

        let n = self.stocks.len();
        let size = n / buckets;
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| descending(values[a], values[b]));

        let members = |rows: &[usize]| -> Vec<i64> {
            rows.iter().filter_map(|&row| self.stocks[row]).collect()
        };
        Ok(PortfolioLegs {
            long: members(&order[..size]),
            short: members(&order[n - size..]),
        })
    }

    /// Long-short return for a characteristic, `None` if either leg is empty
    /// of matched returns.
    pub fn long_short_return(
        &self,
        characteristic: &str,
        returns: &ReturnTable,
        config: &PortfolioConfig,
    ) -> Result<Option<f64>> {
        let legs = self.legs(characteristic, config.buckets)?;
        let long = returns.leg_return(self.date, &legs.long);
        let short = returns.leg_return(self.date, &legs.short);
        Ok(long
            .zip(short)
            .map(|(long, short)| config.leg_weight * (long - short)))
    }
}

/// Per-date cross-sections with the dates that could not be read.
#[derive(Debug, Clone, Default)]
pub struct CrossSections {
    /// Cross-sections in first-appearance order
    pub sections: Vec<CrossSection>,
    /// Dates whose slice could not be extracted
    pub failures: Vec<UnitFailure>,
}

/// Portfolio return observations with the units that failed.
#[derive(Debug, Clone)]
pub struct PortfolioReturns {
    /// One row per date, one `Float64` column per characteristic
    pub frame: DataFrame,
    /// Dates that could not be read (no row) and pairs that could not be
    /// computed (null cell)
    pub failures: Vec<UnitFailure>,
    /// Cells left null because a leg had no matched returns
    pub missing: usize,
}

impl PortfolioReturns {
    /// Observation for a date and characteristic, if present and not missing.
    pub fn value(&self, date: i64, characteristic: &str) -> Option<f64> {
        let date_column = self.frame.get_columns().first()?.name().to_string();
        let row = int_values(&self.frame, &date_column)
            .ok()?
            .into_iter()
            .position(|d| d == Some(date))?;
        float_values(&self.frame, characteristic).ok()?[row]
    }
}

/// Computes long-short returns for every (date, characteristic) pair.
#[derive(Debug, Clone)]
pub struct DecileCalculator {
    taxonomy: Taxonomy,
    columns: ColumnNames,
    config: PortfolioConfig,
    force_sequential: bool,
}

impl DecileCalculator {
    /// Create a calculator over the given characteristics.
    pub const fn new(taxonomy: Taxonomy, columns: ColumnNames, config: PortfolioConfig) -> Self {
        Self {
            taxonomy,
            columns,
            config,
            force_sequential: false,
        }
    }

    /// Process pairs on the calling thread instead of the rayon pool.
    pub const fn with_force_sequential(mut self, force_sequential: bool) -> Self {
        self.force_sequential = force_sequential;
        self
    }

    /// Portfolio construction settings.
    pub const fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    /// Long-short return of one characteristic on one date.
    ///
    /// `Ok(None)` means a leg matched no returns, including the case of
    /// fewer than `buckets` stocks on the date.
    pub fn portfolio_return(
        &self,
        date: i64,
        characteristic: &str,
        panel: &DataFrame,
        returns: &ReturnTable,
    ) -> Result<Option<f64>> {
        let slice = slice_for_date(panel, &self.columns.date, date)?;
        let section = CrossSection::from_slice(date, &slice, &self.columns.stock_id, &[characteristic])?;
        section.long_short_return(characteristic, returns, &self.config)
    }

    /// Split a normalized panel into per-date cross-sections.
    ///
    /// A date whose slice cannot be read is reported in
    /// [`CrossSections::failures`] and skipped.
    pub fn cross_sections(&self, panel: &DataFrame) -> Result<CrossSections> {
        let stock_id = self.columns.stock_id.as_str();
        let date = self.columns.date.as_str();
        let keyed = coerce_keys(panel, stock_id, date)?;
        let partitions = partition_by_date(&keyed, date)?;
        let names = self.taxonomy.names();

        let extracted = exec::map_slice(
            &partitions,
            |(d, slice)| CrossSection::from_slice(*d, slice, stock_id, &names),
            self.force_sequential,
        );

        let mut result = CrossSections::default();
        for ((d, _), section) in partitions.iter().zip(extracted) {
            match section {
                Ok(section) => result.sections.push(section),
                Err(e) => {
                    warn!(date = d, error = %e, "cross-section could not be read");
                    result.failures.push(UnitFailure::date(*d, &e));
                }
            }
        }
        Ok(result)
    }

    /// Compute the full date by characteristic table of observations.
    ///
    /// Dates appear in first-appearance order of `panel` and characteristic
    /// columns in taxonomy order. A failed pair leaves a null cell and a
    /// date that cannot be read leaves no row; both are listed in
    /// [`PortfolioReturns::failures`].
    pub fn compute(&self, panel: &DataFrame, returns: &ReturnTable) -> Result<PortfolioReturns> {
        let CrossSections {
            sections,
            mut failures,
        } = self.cross_sections(panel)?;
        let names = self.taxonomy.names();
        let width = names.len();
        info!(
            dates = sections.len(),
            characteristics = width,
            "computing decile portfolio returns"
        );

        let cells = exec::map_range(
            sections.len() * width,
            |i| sections[i / width].long_short_return(names[i % width], returns, &self.config),
            self.force_sequential,
        );

        let mut grid = vec![Vec::with_capacity(sections.len()); width];
        let mut missing = 0;
        for (i, cell) in cells.into_iter().enumerate() {
            let section = &sections[i / width];
            let name = names[i % width];
            let value = match cell {
                Ok(Some(value)) => Some(value),
                Ok(None) => {
                    missing += 1;
                    None
                }
                Err(e) => {
                    warn!(date = section.date(), characteristic = name, error = %e, "portfolio return failed");
                    failures.push(UnitFailure::pair(section.date(), name, &e));
                    None
                }
            };
            grid[i % width].push(value);
        }

        let dates: Vec<i64> = sections.iter().map(CrossSection::date).collect();
        let mut columns = Vec::with_capacity(width + 1);
        columns.push(Column::new(self.columns.date.as_str().into(), dates));
        for (name, values) in names.iter().zip(grid) {
            columns.push(Column::new((*name).into(), values));
        }
        let frame = DataFrame::new(columns)?;

        info!(
            dates = frame.height(),
            missing,
            failed = failures.len(),
            "computed decile portfolio returns"
        );

        Ok(PortfolioReturns {
            frame,
            failures,
            missing,
        })
    }
}

/// Long-short return of `characteristic` on `date` with the default column
/// layout and decile settings.
pub fn portfolio_return(
    date: i64,
    characteristic: &str,
    panel: &DataFrame,
    returns: &ReturnTable,
) -> Result<Option<f64>> {
    let taxonomy = Taxonomy::new();
    DecileCalculator::new(taxonomy, ColumnNames::default(), PortfolioConfig::default())
        .portfolio_return(date, characteristic, panel, returns)
}
