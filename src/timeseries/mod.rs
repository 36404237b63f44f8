//! Time series module
//!
//! Provides the series container and the sliding-window transform used to
//! turn each column into training samples:
//! - Stride-1 windowing
//! - Reconstruction from overlapping windows (averaging) or rows (reshape)

mod series;
mod windowing;

pub use series::TimeSeries;
pub use windowing::{make_windows, unwindow, Reconstruction};
