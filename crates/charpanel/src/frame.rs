//! DataFrame helpers shared by the normalizer and the calculator.

use crate::{PanelError, Result};
use polars::prelude::*;

/// Fail with [`PanelError::MissingColumn`] unless every name is present.
pub fn require_columns<S: AsRef<str>>(frame: &DataFrame, names: &[S]) -> Result<()> {
    for name in names {
        let name = name.as_ref();
        if frame.column(name).is_err() {
            return Err(PanelError::MissingColumn(name.to_string()));
        }
    }
    Ok(())
}

/// Values of a column as `f64`, with NaN read as missing.
pub fn float_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = frame
        .column(name)
        .map_err(|_| PanelError::MissingColumn(name.to_string()))?
        .cast(&DataType::Float64)?;
    let values = column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Ok(values)
}

/// Values of a column as `i64`.
pub fn int_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = frame
        .column(name)
        .map_err(|_| PanelError::MissingColumn(name.to_string()))?
        .cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

/// Cast the key columns to `Int64`.
pub fn coerce_keys(frame: &DataFrame, stock_id: &str, date: &str) -> Result<DataFrame> {
    require_columns(frame, &[stock_id, date])?;
    let result = frame
        .clone()
        .lazy()
        .with_columns([
            col(stock_id).cast(DataType::Int64),
            col(date).cast(DataType::Int64),
        ])
        .collect()?;

    Ok(result)
}

/// Split a frame into one slice per date.
///
/// Rows with a missing date are dropped. Slices come back in order of first
/// appearance and keep source row order.
pub fn partition_by_date(frame: &DataFrame, date: &str) -> Result<Vec<(i64, DataFrame)>> {
    let dated = frame
        .clone()
        .lazy()
        .filter(col(date).is_not_null())
        .collect()?;

    dated
        .partition_by_stable([date], true)?
        .into_iter()
        .map(|slice| {
            let d = int_values(&slice, date)?
                .first()
                .copied()
                .flatten()
                .ok_or(PanelError::EmptySlice)?;
            Ok((d, slice))
        })
        .collect()
}

/// All rows observed on one date, in source order.
pub fn slice_for_date(frame: &DataFrame, date_column: &str, date: i64) -> Result<DataFrame> {
    let result = frame
        .clone()
        .lazy()
        .filter(col(date_column).eq(lit(date)))
        .collect()?;

    Ok(result)
}

/// Keep rows whose date lies inside the inclusive range.
pub fn filter_date_range(
    frame: &DataFrame,
    date_column: &str,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<DataFrame> {
    let mut predicate = col(date_column).is_not_null();
    if let Some(start) = start {
        predicate = predicate.and(col(date_column).gt_eq(lit(start)));
    }
    if let Some(end) = end {
        predicate = predicate.and(col(date_column).lt_eq(lit(end)));
    }

    let result = frame.clone().lazy().filter(predicate).collect()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df![
            "permno" => [10.0, 11.0, 12.0, 10.0, 13.0],
            "DATE" => [19800131.0, 19800131.0, 19800131.0, 19800229.0, 19800229.0],
            "bm" => [Some(0.5), None, Some(f64::NAN), Some(1.5), Some(2.5)],
        ]
        .unwrap()
    }

    #[test]
    fn test_require_columns() {
        let df = sample();
        assert!(require_columns(&df, &["permno", "bm"]).is_ok());
        let err = require_columns(&df, &["permno", "mom1m"]).unwrap_err();
        assert!(matches!(err, PanelError::MissingColumn(name) if name == "mom1m"));
    }

    #[test]
    fn test_float_values_reads_nan_as_missing() {
        let values = float_values(&sample(), "bm").unwrap();
        assert_eq!(values, vec![Some(0.5), None, None, Some(1.5), Some(2.5)]);
    }

    #[test]
    fn test_coerce_keys() {
        let df = coerce_keys(&sample(), "permno", "DATE").unwrap();
        assert_eq!(df.column("permno").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("DATE").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_partition_by_date_keeps_first_appearance_order() {
        let df = df![
            "permno" => [1i64, 2, 3, 4, 5, 6],
            "DATE" => [Some(19800229i64), Some(19800131), None, Some(19800229), Some(19800131), Some(19800229)],
        ]
        .unwrap();

        let parts = partition_by_date(&df, "DATE").unwrap();
        let dates: Vec<i64> = parts.iter().map(|(d, _)| *d).collect();
        assert_eq!(dates, vec![19800229, 19800131]);
        assert_eq!(
            int_values(&parts[0].1, "permno").unwrap(),
            vec![Some(1), Some(4), Some(6)]
        );
        assert_eq!(
            int_values(&parts[1].1, "permno").unwrap(),
            vec![Some(2), Some(5)]
        );
    }

    #[test]
    fn test_slice_for_date_keeps_source_order() {
        let df = coerce_keys(&sample(), "permno", "DATE").unwrap();
        let slice = slice_for_date(&df, "DATE", 19800131).unwrap();
        assert_eq!(
            int_values(&slice, "permno").unwrap(),
            vec![Some(10), Some(11), Some(12)]
        );
        assert_eq!(slice_for_date(&df, "DATE", 19800331).unwrap().height(), 0);
    }

    #[test]
    fn test_filter_date_range() {
        let df = coerce_keys(&sample(), "permno", "DATE").unwrap();
        let kept = filter_date_range(&df, "DATE", Some(19800201), None).unwrap();
        assert_eq!(kept.height(), 2);
        let kept = filter_date_range(&df, "DATE", None, Some(19800131)).unwrap();
        assert_eq!(kept.height(), 3);
        let kept = filter_date_range(&df, "DATE", None, None).unwrap();
        assert_eq!(kept.height(), 5);
    }
}
