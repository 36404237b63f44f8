//! Column-oriented time series container

use crate::error::{ExtractorError, Result};
use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayView1, ArrayView2};

/// Named numeric columns sharing one optional timestamp index.
///
/// Values are stored row-major as `(samples, columns)`.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    columns: Vec<String>,
    values: Array2<f64>,
    timestamps: Option<Vec<NaiveDateTime>>,
}

impl TimeSeries {
    /// Create a new time series
    pub fn new(
        columns: Vec<String>,
        values: Array2<f64>,
        timestamps: Option<Vec<NaiveDateTime>>,
    ) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(ExtractorError::ShapeMismatch {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }
        if let Some(ts) = &timestamps {
            if ts.len() != values.nrows() {
                return Err(ExtractorError::ShapeMismatch {
                    expected: format!("{} timestamps", values.nrows()),
                    actual: format!("{} timestamps", ts.len()),
                });
            }
        }

        Ok(Self { columns, values, timestamps })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Column names in file order
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Values of a named column
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| self.values.column(idx))
    }

    /// All values as `(samples, columns)`
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn timestamps(&self) -> Option<&[NaiveDateTime]> {
        self.timestamps.as_deref()
    }

    /// Fail on the first missing or non-finite value
    pub fn validate_finite(&self) -> Result<()> {
        for ((row, col), value) in self.values.indexed_iter() {
            if !value.is_finite() {
                return Err(ExtractorError::InvalidData(format!(
                    "non-finite value {} in column '{}' at row {}",
                    value, self.columns[col], row
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_column_lookup() {
        let ts = TimeSeries::new(
            vec!["a".into(), "b".into()],
            array![[1.0, 10.0], [2.0, 20.0]],
            None,
        )
        .unwrap();

        assert_eq!(ts.len(), 2);
        assert_eq!(ts.column("b").unwrap().to_vec(), vec![10.0, 20.0]);
        assert!(ts.column("c").is_none());
    }

    #[test]
    fn test_rejects_mismatched_columns() {
        let result = TimeSeries::new(vec!["a".into()], array![[1.0, 2.0]], None);
        assert!(matches!(result, Err(ExtractorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_validate_finite_reports_location() {
        let ts = TimeSeries::new(
            vec!["price".into()],
            array![[1.0], [f64::NAN]],
            None,
        )
        .unwrap();

        let err = ts.validate_finite().unwrap_err();
        assert!(err.to_string().contains("'price' at row 1"));
    }
}
