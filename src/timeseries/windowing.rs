//! Sliding-window slicing of a series and its inverse

use crate::error::{ExtractorError, Result};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use serde::{Deserialize, Serialize};

/// How a matrix of windows (or rows) is folded back into a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconstruction {
    /// Rows do not overlap: the matrix is flattened row by row
    RowWise,
    /// Rows are stride-1 windows: every timestamp is the mean of all windows covering it
    Overlapping,
}

impl Reconstruction {
    /// Reconstruction rule matching the windowing mode
    pub fn for_sliding_windows(use_sliding_windows: bool) -> Self {
        if use_sliding_windows {
            Self::Overlapping
        } else {
            Self::RowWise
        }
    }
}

/// Slice a series into stride-1 windows.
///
/// Produces a `(len - window_size + 1, window_size)` matrix whose row `i` is
/// `series[i..i + window_size]`.
pub fn make_windows<S>(series: &ArrayBase<S, Ix1>, window_size: usize) -> Result<Array2<f64>>
where
    S: Data<Elem = f64>,
{
    let series_len = series.len();
    if window_size == 0 || window_size > series_len {
        return Err(ExtractorError::InvalidWindowSize { window_size, series_len });
    }

    let n_windows = series_len - window_size + 1;
    Ok(Array2::from_shape_fn((n_windows, window_size), |(i, j)| series[i + j]))
}

/// Fold a matrix of windows or rows back into a single series.
pub fn unwindow<S>(matrix: &ArrayBase<S, Ix2>, mode: Reconstruction) -> Result<Array1<f64>>
where
    S: Data<Elem = f64>,
{
    let (n_rows, width) = matrix.dim();
    if n_rows == 0 || width == 0 {
        return Err(ExtractorError::InvalidData(format!(
            "cannot reconstruct a series from an empty {}x{} matrix",
            n_rows, width
        )));
    }

    match mode {
        Reconstruction::RowWise => Ok(matrix.iter().copied().collect()),
        Reconstruction::Overlapping => {
            let series_len = n_rows + width - 1;
            let mut sums = Array1::<f64>::zeros(series_len);
            let mut counts = Array1::<f64>::zeros(series_len);

            for (i, row) in matrix.rows().into_iter().enumerate() {
                for (j, &value) in row.iter().enumerate() {
                    sums[i + j] += value;
                    counts[i + j] += 1.0;
                }
            }

            Ok(sums / counts)
        }
    }
}
