//! Cross-sectional imputation and rank normalization.
//!
//! Characteristics are only comparable across stocks once they sit on a
//! common scale. For every date the normalizer takes the slice of all stocks
//! observed on that date and, column by column:
//!
//! 1. replaces missing values with the slice median,
//! 2. fills columns with no observations at all with zero,
//! 3. min-max scales the imputed column to `[-1, 1]`.
//!
//! Imputed values take part in the min and max of step 3. A column whose
//! minimum equals its maximum maps to `0.0`, the midpoint of the interval,
//! and so does any cell whose scaled value is undefined because the column
//! holds an infinity.

use crate::{
    PanelError, Result, UnitFailure,
    config::ColumnNames,
    exec,
    frame::{coerce_keys, float_values, partition_by_date, require_columns},
    taxonomy::Taxonomy,
};
use polars::prelude::*;
use tracing::{debug, info, warn};

/// Median imputation with zero fallback.
///
/// Missing values take the column median (ignoring missing values); if the
/// column has no observations the median is itself missing and the zero
/// fill applies.
pub fn impute(name: &str) -> Expr {
    let value = col(name).cast(DataType::Float64);
    value
        .clone()
        .fill_null(value.median())
        .fill_null(lit(0.0))
}

/// Min-max scaling of an expression onto `[-1, 1]`.
///
/// Computes v' = ((v - min) / (max - min)) * 2 - 1, with a constant column
/// mapped to `0.0`. A NaN produced by infinite bounds also lands on `0.0`.
pub fn rank_normalize(value: Expr) -> Expr {
    let min = value.clone().min();
    let max = value.clone().max();
    when(max.clone().eq(min.clone()))
        .then(lit(0.0))
        .otherwise((value - min.clone()) / (max - min) * lit(2.0) - lit(1.0))
        .fill_nan(lit(0.0))
}

/// Normalize one cross-sectional slice.
///
/// Every column in `characteristics` is imputed and scaled independently;
/// all other columns (identifier, date, anything else) pass through
/// untouched. Row count and row order are preserved.
///
/// # Arguments
///
/// * `slice` - All records observed on a single date
/// * `characteristics` - Names of the characteristic columns to transform
///
/// # Returns
///
/// DataFrame with each characteristic column replaced by its `Float64`
/// normalized values.
///
/// # Errors
///
/// [`PanelError::EmptySlice`] if the slice has no rows and
/// [`PanelError::MissingColumn`] if a characteristic column is absent.
pub fn normalize_slice<S: AsRef<str>>(slice: &DataFrame, characteristics: &[S]) -> Result<DataFrame> {
    if slice.height() == 0 {
        return Err(PanelError::EmptySlice);
    }
    require_columns(slice, characteristics)?;

    // NaN and null are both missing; make them all null before aggregating.
    let mut cleaned = slice.clone();
    for name in characteristics {
        let name = name.as_ref();
        let values = float_values(slice, name)?;
        cleaned.with_column(Column::new(name.into(), values))?;
    }

    let exprs: Vec<Expr> = characteristics
        .iter()
        .map(|name| rank_normalize(impute(name.as_ref())).alias(name.as_ref()))
        .collect();

    let result = cleaned.lazy().with_columns(exprs).collect()?;
    Ok(result)
}

/// The normalized panel together with the dates that failed.
#[derive(Debug, Clone)]
pub struct NormalizedPanel {
    /// Normalized rows, grouped by date in first-appearance order
    pub frame: DataFrame,
    /// Dates that normalized successfully, in output order
    pub dates: Vec<i64>,
    /// Dates whose slice could not be normalized
    pub failures: Vec<UnitFailure>,
}

/// Runs [`normalize_slice`] over every date of a panel.
#[derive(Debug, Clone)]
pub struct Normalizer {
    taxonomy: Taxonomy,
    columns: ColumnNames,
    force_sequential: bool,
}

impl Normalizer {
    /// Create a normalizer over the given characteristics and key columns.
    pub const fn new(taxonomy: Taxonomy, columns: ColumnNames) -> Self {
        Self {
            taxonomy,
            columns,
            force_sequential: false,
        }
    }

    /// Process dates on the calling thread instead of the rayon pool.
    pub const fn with_force_sequential(mut self, force_sequential: bool) -> Self {
        self.force_sequential = force_sequential;
        self
    }

    /// Characteristics this normalizer transforms.
    pub const fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Normalize every date slice of `panel`.
    ///
    /// Identifier and date columns are coerced to `Int64`; rows with a
    /// missing date are dropped. Each date is normalized independently and
    /// the slices are reassembled in order of first appearance. A date that
    /// fails is reported in [`NormalizedPanel::failures`] and contributes no
    /// rows.
    pub fn normalize_panel(&self, panel: &DataFrame) -> Result<NormalizedPanel> {
        let names = self.taxonomy.names();
        let stock_id = self.columns.stock_id.as_str();
        let date = self.columns.date.as_str();
        require_columns(panel, &names)?;

        let keyed = coerce_keys(panel, stock_id, date)?;
        let partitions = partition_by_date(&keyed, date)?;
        info!(
            rows = keyed.height(),
            dates = partitions.len(),
            characteristics = names.len(),
            "normalizing characteristic panel"
        );

        let slices = exec::map_slice(
            &partitions,
            |(d, slice)| {
                let normalized = normalize_slice(slice, &names)?;
                debug!(date = d, rows = normalized.height(), "normalized slice");
                Ok::<_, PanelError>(normalized)
            },
            self.force_sequential,
        );

        // Empty frame with the output schema, so a panel where every date
        // fails still produces well-typed output.
        let float_casts: Vec<Expr> = names
            .iter()
            .map(|name| col(*name).cast(DataType::Float64))
            .collect();
        let mut parts = vec![keyed.lazy().limit(0).with_columns(float_casts)];

        let mut done = Vec::with_capacity(partitions.len());
        let mut failures = Vec::new();
        for ((d, _), slice) in partitions.iter().zip(slices) {
            match slice {
                Ok(slice) => {
                    parts.push(slice.lazy());
                    done.push(*d);
                }
                Err(e) => {
                    warn!(date = d, error = %e, "date slice failed to normalize");
                    failures.push(UnitFailure::date(*d, &e));
                }
            }
        }

        let frame = concat(
            parts,
            UnionArgs {
                rechunk: true,
                ..Default::default()
            },
        )?
        .collect()?;

        info!(
            rows = frame.height(),
            dates = done.len(),
            failed = failures.len(),
            "normalized characteristic panel"
        );

        Ok(NormalizedPanel {
            frame,
            dates: done,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::int_values;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn values(df: &DataFrame, name: &str) -> Vec<f64> {
        df.column(name)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap())
            .collect()
    }

    #[test]
    fn test_min_max_to_unit_interval() {
        let df = df![
            "permno" => [1i64, 2, 3, 4, 5],
            "DATE" => [19800131i64; 5],
            "bm" => [1.0, 2.0, 3.0, 4.0, 5.0],
        ]
        .unwrap();

        let result = normalize_slice(&df, &["bm"]).unwrap();
        let bm = values(&result, "bm");
        assert_eq!(bm, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(result.shape(), (5, 3));
    }

    #[test]
    fn test_median_imputation_participates_in_scaling() {
        // Median of [1, 3, 10] is 3; imputed 3 is then scaled with the rest.
        let df = df![
            "permno" => [1i64, 2, 3, 4],
            "DATE" => [19800131i64; 4],
            "bm" => [Some(1.0), None, Some(3.0), Some(10.0)],
        ]
        .unwrap();

        let result = normalize_slice(&df, &["bm"]).unwrap();
        let bm = values(&result, "bm");
        let scale = |v: f64| (v - 1.0) / 9.0 * 2.0 - 1.0;
        assert_relative_eq!(bm[0], -1.0);
        assert_relative_eq!(bm[1], scale(3.0));
        assert_relative_eq!(bm[2], scale(3.0));
        assert_relative_eq!(bm[3], 1.0);
    }

    #[test]
    fn test_median_of_even_count_averages_middle_values() {
        let df = df![
            "DATE" => [19800131i64; 5],
            "bm" => [Some(0.0), Some(2.0), Some(4.0), Some(10.0), None],
        ]
        .unwrap();

        let result = normalize_slice(&df, &["bm"]).unwrap();
        // Imputed median is 3.0, scaled over [0, 10].
        assert_relative_eq!(values(&result, "bm")[4], 0.3 * 2.0 - 1.0);
    }

    #[test]
    fn test_nan_counts_as_missing() {
        let df = df![
            "DATE" => [19800131i64; 3],
            "bm" => [0.0, f64::NAN, 4.0],
        ]
        .unwrap();

        let result = normalize_slice(&df, &["bm"]).unwrap();
        assert_eq!(values(&result, "bm"), vec![-1.0, 0.0, 1.0]);
    }

    #[rstest]
    #[case::all_missing(vec![None, None, None])]
    #[case::constant(vec![Some(7.5), Some(7.5), Some(7.5)])]
    #[case::constant_with_missing(vec![Some(2.0), None, Some(2.0)])]
    #[case::singleton(vec![Some(-3.0)])]
    fn test_degenerate_columns_map_to_zero(#[case] raw: Vec<Option<f64>>) {
        let n = raw.len();
        let df = df![
            "DATE" => vec![19800131i64; n],
            "bm" => raw,
        ]
        .unwrap();

        let result = normalize_slice(&df, &["bm"]).unwrap();
        assert_eq!(values(&result, "bm"), vec![0.0; n]);
    }

    #[rstest]
    #[case::positive_infinity(vec![1.0, 2.0, f64::INFINITY], vec![-1.0, -1.0, 0.0])]
    #[case::negative_infinity(vec![f64::NEG_INFINITY, 1.0, 2.0], vec![0.0, 0.0, 0.0])]
    #[case::both_infinities(vec![f64::NEG_INFINITY, 0.5, f64::INFINITY], vec![0.0, 0.0, 0.0])]
    #[case::all_infinite(vec![f64::INFINITY, f64::INFINITY], vec![0.0, 0.0])]
    fn test_infinite_values_stay_in_range(#[case] raw: Vec<f64>, #[case] expected: Vec<f64>) {
        let n = raw.len();
        let df = df![
            "DATE" => vec![19800131i64; n],
            "bm" => raw,
        ]
        .unwrap();

        let result = normalize_slice(&df, &["bm"]).unwrap();
        let bm = result.column("bm").unwrap();
        assert_eq!(bm.null_count(), 0);
        let bm = values(&result, "bm");
        assert!(bm.iter().all(|v| (-1.0..=1.0).contains(v)), "out of [-1, 1]: {bm:?}");
        assert_eq!(bm, expected);
    }

    #[test]
    fn test_columns_are_independent_and_keys_untouched() {
        let df = df![
            "permno" => [10i64, 20, 30],
            "DATE" => [19800131i64; 3],
            "sic2" => [Some(12.0), None, Some(44.0)],
            "bm" => [3.0, 1.0, 2.0],
            "mom1m" => [Some(-0.1), None, Some(0.3)],
        ]
        .unwrap();

        let result = normalize_slice(&df, &["bm", "mom1m"]).unwrap();
        assert_eq!(values(&result, "bm"), vec![1.0, -1.0, 0.0]);
        let mom = values(&result, "mom1m");
        assert_relative_eq!(mom[0], -1.0);
        assert_relative_eq!(mom[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(mom[2], 1.0);

        assert_eq!(
            int_values(&result, "permno").unwrap(),
            vec![Some(10), Some(20), Some(30)]
        );
        let sic2 = result.column("sic2").unwrap().f64().unwrap();
        assert_eq!(sic2.get(1), None);
    }

    #[test]
    fn test_renormalizing_is_a_no_op() {
        let df = df![
            "DATE" => [19800131i64; 6],
            "bm" => [Some(0.37), None, Some(-4.2), Some(11.0), Some(2.5), None],
        ]
        .unwrap();

        let once = normalize_slice(&df, &["bm"]).unwrap();
        let twice = normalize_slice(&once, &["bm"]).unwrap();
        for (a, b) in values(&once, "bm").into_iter().zip(values(&twice, "bm")) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_empty_slice_is_an_error() {
        let df = df![
            "DATE" => Vec::<i64>::new(),
            "bm" => Vec::<f64>::new(),
        ]
        .unwrap();

        let err = normalize_slice(&df, &["bm"]).unwrap_err();
        assert!(matches!(err, PanelError::EmptySlice));
    }

    #[test]
    fn test_missing_characteristic_column() {
        let df = df![
            "DATE" => [19800131i64],
            "bm" => [1.0],
        ]
        .unwrap();

        let err = normalize_slice(&df, &["bm", "ep"]).unwrap_err();
        assert!(matches!(err, PanelError::MissingColumn(name) if name == "ep"));
    }

    fn two_date_panel() -> DataFrame {
        df![
            "permno" => [1.0, 2.0, 3.0, 1.0, 2.0],
            "DATE" => [19800229.0, 19800229.0, 19800229.0, 19800131.0, 19800131.0],
            "bm" => [Some(1.0), Some(2.0), Some(3.0), None, None],
            "ep" => [Some(5.0), None, Some(5.0), Some(-1.0), Some(1.0)],
        ]
        .unwrap()
    }

    fn normalizer() -> Normalizer {
        let taxonomy = Taxonomy::with_defaults().subset(&["bm", "ep"]).unwrap();
        Normalizer::new(taxonomy, ColumnNames::default())
    }

    #[test]
    fn test_normalize_panel_per_date() {
        let panel = normalizer().normalize_panel(&two_date_panel()).unwrap();

        assert!(panel.failures.is_empty());
        assert_eq!(panel.dates, vec![19800229, 19800131]);
        assert_eq!(panel.frame.height(), 5);
        assert_eq!(
            int_values(&panel.frame, "DATE").unwrap(),
            vec![
                Some(19800229),
                Some(19800229),
                Some(19800229),
                Some(19800131),
                Some(19800131)
            ]
        );
        assert_eq!(panel.frame.column("permno").unwrap().dtype(), &DataType::Int64);
        assert_eq!(values(&panel.frame, "bm"), vec![-1.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(values(&panel.frame, "ep"), vec![0.0, 0.0, 0.0, -1.0, 1.0]);
        for column in panel.frame.get_columns() {
            assert_eq!(column.n_chunks(), 1, "{} is not contiguous", column.name());
        }
    }

    #[test]
    fn test_normalize_panel_sequential_matches_parallel() {
        let parallel = normalizer().normalize_panel(&two_date_panel()).unwrap();
        let sequential = normalizer()
            .with_force_sequential(true)
            .normalize_panel(&two_date_panel())
            .unwrap();
        assert!(parallel.frame.equals_missing(&sequential.frame));
    }

    #[test]
    fn test_normalize_panel_missing_column() {
        let panel = df![
            "permno" => [1i64],
            "DATE" => [19800131i64],
            "bm" => [1.0],
        ]
        .unwrap();

        let err = normalizer().normalize_panel(&panel).unwrap_err();
        assert!(matches!(err, PanelError::MissingColumn(name) if name == "ep"));
    }
}
