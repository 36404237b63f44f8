//! Dataset information estimates
//!
//! Diagnostic summary of how much information a dataset can carry:
//! signal-to-noise ratio, Shannon-Hartley channel capacity at the sampling
//! rate, total information bits and histogram entropy. Nothing here feeds
//! back into training.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayBase, ArrayView1, Axis, Data, Dimension, Ix2, Ix3};
use serde::{Deserialize, Serialize};

use crate::error::{ExtractorError, Result};

/// Number of fixed-width histogram bins on `[0, 1]`
pub const ENTROPY_BINS: usize = 1000;

/// Guard against `log2(0)` for empty bins
const LOG_EPSILON: f64 = 1e-10;

/// Sampling period of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Periodicity {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    Hourly,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "daily")]
    Daily,
}

impl Periodicity {
    /// Length of one sampling period
    pub fn seconds(&self) -> f64 {
        match self {
            Periodicity::OneMinute => 60.0,
            Periodicity::FiveMinutes => 300.0,
            Periodicity::FifteenMinutes => 900.0,
            Periodicity::Hourly => 3600.0,
            Periodicity::FourHours => 14_400.0,
            Periodicity::Daily => 86_400.0,
        }
    }

    /// Sampling frequency in Hz
    pub fn frequency(&self) -> f64 {
        1.0 / self.seconds()
    }
}

impl FromStr for Periodicity {
    type Err = ExtractorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1min" => Ok(Periodicity::OneMinute),
            "5min" => Ok(Periodicity::FiveMinutes),
            "15min" => Ok(Periodicity::FifteenMinutes),
            "1h" => Ok(Periodicity::Hourly),
            "4h" => Ok(Periodicity::FourHours),
            "daily" => Ok(Periodicity::Daily),
            other => Err(ExtractorError::invalid_parameter(
                "dataset_periodicity",
                other,
                "expected one of 1min, 5min, 15min, 1h, 4h, daily",
            )),
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Periodicity::OneMinute => "1min",
            Periodicity::FiveMinutes => "5min",
            Periodicity::FifteenMinutes => "15min",
            Periodicity::Hourly => "1h",
            Periodicity::FourHours => "4h",
            Periodicity::Daily => "daily",
        };
        write!(f, "{}", label)
    }
}

/// Information summary of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInformation {
    /// Values in the concatenated normalized population
    pub num_samples: usize,
    pub num_columns: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    /// `(mean / std)^2`, zero when `std` is zero
    pub snr: f64,
    /// Hz, zero for an unknown periodicity
    pub sampling_frequency: f64,
    /// Bits per second
    pub channel_capacity: f64,
    pub total_information_bits: f64,
    /// Histogram entropy in bits
    pub entropy: f64,
}

/// Estimate information content of 2-D `(samples, columns)` data or 3-D
/// `(windows, window_size, columns)` data.
///
/// Each column is min-max normalized to `[0, 1]` on its own (a constant
/// column becomes all zeros) and all columns are pooled into one population.
/// An unrecognised periodicity yields zero frequency and zero capacity.
pub fn estimate_information<S, D>(
    data: &ArrayBase<S, D>,
    periodicity: Option<Periodicity>,
) -> Result<DatasetInformation>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let view = data.view().into_dyn();
    let mut population = Vec::with_capacity(view.len());
    let num_columns = match view.ndim() {
        2 => {
            let matrix = view.into_dimensionality::<Ix2>()?;
            for column in matrix.axis_iter(Axis(1)) {
                push_normalized(&mut population, column.iter().copied())?;
            }
            matrix.ncols()
        }
        3 => {
            let cube = view.into_dimensionality::<Ix3>()?;
            for column in cube.axis_iter(Axis(2)) {
                push_normalized(&mut population, column.iter().copied())?;
            }
            cube.len_of(Axis(2))
        }
        ndim => return Err(ExtractorError::UnsupportedDataShape { ndim }),
    };

    if population.is_empty() {
        return Err(ExtractorError::InvalidData(
            "cannot estimate information of an empty dataset".to_string(),
        ));
    }

    let values = ArrayView1::from(population.as_slice());
    let num_samples = values.len();
    let mean = values.mean().unwrap_or(0.0);
    let std = values.std(0.0);
    let snr = if std > 0.0 { (mean / std).powi(2) } else { 0.0 };

    let (sampling_frequency, period_seconds) = match periodicity {
        Some(p) => (p.frequency(), p.seconds()),
        None => (0.0, 0.0),
    };
    let channel_capacity = if snr > 0.0 && sampling_frequency > 0.0 {
        sampling_frequency * (1.0 + snr).log2()
    } else {
        0.0
    };
    let total_information_bits = channel_capacity * num_samples as f64 * period_seconds;

    Ok(DatasetInformation {
        num_samples,
        num_columns,
        mean,
        std,
        snr,
        sampling_frequency,
        channel_capacity,
        total_information_bits,
        entropy: histogram_entropy(&population, ENTROPY_BINS),
    })
}

fn push_normalized(out: &mut Vec<f64>, column: impl Iterator<Item = f64> + Clone) -> Result<()> {
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in column.clone() {
        if !v.is_finite() {
            return Err(ExtractorError::InvalidData(
                "NaN or infinite value in information estimate".to_string(),
            ));
        }
        min = min.min(v);
        max = max.max(v);
    }
    let range = max - min;
    out.extend(column.map(|v| if range > 0.0 { (v - min) / range } else { 0.0 }));
    Ok(())
}

/// Shannon entropy in bits of a fixed-width histogram on `[0, 1]`.
///
/// Values outside the range fall into the first or last bin.
pub fn histogram_entropy(values: &[f64], bins: usize) -> f64 {
    if values.is_empty() || bins == 0 {
        return 0.0;
    }
    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = (v * bins as f64).floor().clamp(0.0, (bins - 1) as f64) as usize;
        counts[idx] += 1;
    }
    let total = values.len() as f64;
    -counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * (p + LOG_EPSILON).log2()
        })
        .sum::<f64>()
}
