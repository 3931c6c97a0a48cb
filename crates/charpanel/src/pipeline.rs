//! End-to-end run: source, normalizer, calculator, sink.

use crate::{
    Result, UnitFailure,
    config::PipelineConfig,
    frame::{coerce_keys, filter_date_range},
    normalize::Normalizer,
    portfolio::{DecileCalculator, ReturnTable},
    taxonomy::Taxonomy,
    traits::{PanelSink, PanelSource},
};
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Counts describing a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Dates in the normalized panel
    pub dates: usize,
    /// Rows in the normalized panel
    pub rows: usize,
    /// Characteristics processed
    pub characteristics: usize,
    /// Non-missing portfolio return observations
    pub observations: usize,
    /// Observations left missing because a leg had no matched returns
    pub missing: usize,
    /// Duplicate return records dropped
    pub duplicate_returns: usize,
    /// Units that failed, dates first then pairs
    pub failures: Vec<UnitFailure>,
}

impl RunSummary {
    /// Whether every unit of work succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Wires a [`Normalizer`] and a [`DecileCalculator`] between a source and a sink.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    taxonomy: Taxonomy,
}

impl Pipeline {
    /// Validate the configuration and resolve its taxonomy.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let taxonomy = config.taxonomy()?;
        Ok(Self { config, taxonomy })
    }

    /// Configuration in use.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Characteristics processed, in output order.
    pub const fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Run both stages and hand the outputs to `sink`.
    ///
    /// Per-unit failures are collected in the summary; only input-shape
    /// problems that affect the whole panel, and source or sink errors,
    /// abort the run.
    pub fn run<S, K>(&self, source: &S, sink: &mut K) -> Result<RunSummary>
    where
        S: PanelSource + ?Sized,
        K: PanelSink + ?Sized,
    {
        let _span = info_span!("pipeline", characteristics = self.taxonomy.len()).entered();
        let started = Instant::now();
        let columns = &self.config.columns;

        let mut characteristics = source.characteristic_panel()?;
        let mut returns = source.return_panel()?;
        if self.config.has_date_range() {
            characteristics = coerce_keys(&characteristics, &columns.stock_id, &columns.date)?;
            characteristics = filter_date_range(
                &characteristics,
                &columns.date,
                self.config.start_date,
                self.config.end_date,
            )?;
            returns = coerce_keys(&returns, &columns.stock_id, &columns.return_date)?;
            returns = filter_date_range(
                &returns,
                &columns.return_date,
                self.config.start_date,
                self.config.end_date,
            )?;
            info!(
                start = self.config.start_date,
                end = self.config.end_date,
                rows = characteristics.height(),
                "applied date range"
            );
        }

        let normalized = Normalizer::new(self.taxonomy.clone(), columns.clone())
            .with_force_sequential(self.config.force_sequential)
            .normalize_panel(&characteristics)?;

        let return_table = ReturnTable::from_frame(&returns, columns)?;
        if return_table.duplicates() > 0 {
            warn!(
                duplicates = return_table.duplicates(),
                "dropped duplicate return records"
            );
        }

        let portfolio = DecileCalculator::new(
            self.taxonomy.clone(),
            columns.clone(),
            self.config.portfolio,
        )
        .with_force_sequential(self.config.force_sequential)
        .compute(&normalized.frame, &return_table)?;

        sink.write_normalized(&normalized.frame)?;
        sink.write_portfolio_returns(&portfolio.frame)?;

        let cells = portfolio.frame.height() * self.taxonomy.len();
        let pair_failures = portfolio
            .failures
            .iter()
            .filter(|f| f.characteristic.is_some())
            .count();
        let mut failures = normalized.failures;
        failures.extend(portfolio.failures);
        let summary = RunSummary {
            dates: normalized.dates.len(),
            rows: normalized.frame.height(),
            characteristics: self.taxonomy.len(),
            observations: cells - portfolio.missing - pair_failures,
            missing: portfolio.missing,
            duplicate_returns: return_table.duplicates(),
            failures,
        };

        info!(
            dates = summary.dates,
            rows = summary.rows,
            observations = summary.observations,
            missing = summary.missing,
            failed = summary.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        Ok(summary)
    }
}
