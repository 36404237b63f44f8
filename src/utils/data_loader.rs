//! CSV loading and saving for time series

use std::fs::File;

use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array2, ArrayBase, Data, Ix1, Ix2};
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{ExtractorError, Result};
use crate::timeseries::TimeSeries;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];

/// Format used for timestamps in written files
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp in one of the supported layouts, day first
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// CSV reader producing a [`TimeSeries`]
#[derive(Debug, Clone)]
pub struct DataLoader {
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: 100,
        }
    }

    /// Rows used by polars to infer column types
    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Load a CSV file.
    ///
    /// Headerless files get columns `col_0, col_1, ...`. A first column that
    /// is not numeric but parses as dates becomes the timestamp index and is
    /// not counted as a data column. Every remaining value must be numeric.
    pub fn load_csv(&self, path: &str, has_header: bool) -> Result<TimeSeries> {
        let file = File::open(path)?;
        let df = CsvReadOptions::default()
            .with_has_header(has_header)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .into_reader_with_file_handle(file)
            .finish()?;

        if df.width() == 0 || df.height() == 0 {
            return Err(ExtractorError::DataError(format!("'{}' contains no data", path)));
        }

        let columns = df.get_columns();
        let timestamps = detect_timestamps(&columns[0])?;
        let value_columns = if timestamps.is_some() { &columns[1..] } else { columns };
        if value_columns.is_empty() {
            return Err(ExtractorError::DataError(format!(
                "'{}' has no numeric columns",
                path
            )));
        }

        let names: Vec<String> = if has_header {
            value_columns.iter().map(|c| c.name().to_string()).collect()
        } else {
            (0..value_columns.len()).map(|i| format!("col_{}", i)).collect()
        };

        let mut values = Array2::zeros((df.height(), value_columns.len()));
        for (j, (column, name)) in value_columns.iter().zip(&names).enumerate() {
            let series = column.as_materialized_series().cast(&DataType::Float64)?;
            for (i, value) in series.f64()?.into_iter().enumerate() {
                values[[i, j]] = value.ok_or_else(|| {
                    ExtractorError::InvalidData(format!(
                        "missing or non-numeric value in column '{}' at row {}",
                        name, i
                    ))
                })?;
            }
        }

        info!(
            path,
            rows = df.height(),
            columns = names.len(),
            dated = timestamps.is_some(),
            "loaded CSV"
        );
        TimeSeries::new(names, values, timestamps)
    }
}

fn detect_timestamps(column: &Column) -> Result<Option<Vec<NaiveDateTime>>> {
    if column.dtype() != &DataType::String {
        return Ok(None);
    }
    let strings = column.as_materialized_series().str()?;
    let parsed: Option<Vec<NaiveDateTime>> = strings
        .into_iter()
        .map(|v| v.and_then(parse_timestamp))
        .collect();
    if parsed.is_some() {
        debug!(column = %column.name(), "using first column as timestamp index");
    }
    Ok(parsed)
}

/// CSV writer for reconstructed series and evaluation matrices
pub struct DataSaver;

impl DataSaver {
    /// Write one series as a single column, optionally preceded by a `date`
    /// column.
    pub fn write_series_csv<S>(
        path: &str,
        name: &str,
        values: &ArrayBase<S, Ix1>,
        timestamps: Option<&[NaiveDateTime]>,
        headers: bool,
    ) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        let mut columns: Vec<Column> = Vec::with_capacity(2);
        if let Some(ts) = timestamps {
            if ts.len() != values.len() {
                return Err(ExtractorError::ShapeMismatch {
                    expected: format!("{} timestamps", values.len()),
                    actual: format!("{} timestamps", ts.len()),
                });
            }
            let formatted: Vec<String> = ts
                .iter()
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .collect();
            columns.push(Series::new("date".into(), formatted).into());
        }
        columns.push(Series::new(name.into(), values.to_vec()).into());

        let mut df = DataFrame::new(columns)?;
        Self::write(&mut df, path, headers)
    }

    /// Write a matrix with columns `{prefix}_0, {prefix}_1, ...`
    pub fn write_matrix_csv<S>(
        path: &str,
        prefix: &str,
        matrix: &ArrayBase<S, Ix2>,
        headers: bool,
    ) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        let columns: Vec<Column> = matrix
            .columns()
            .into_iter()
            .enumerate()
            .map(|(j, col)| Series::new(format!("{}_{}", prefix, j).into(), col.to_vec()).into())
            .collect();

        let mut df = DataFrame::new(columns)?;
        Self::write(&mut df, path, headers)
    }

    fn write(df: &mut DataFrame, path: &str, headers: bool) -> Result<()> {
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).include_header(headers).finish(df)?;
        debug!(path, rows = df.height(), columns = df.width(), "wrote CSV");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        assert!(parse_timestamp("2024-01-02 03:04:05").is_some());
        assert!(parse_timestamp("2024-01-02T03:04:05").is_some());
        let day_first = parse_timestamp("02/01/2024 10:00").unwrap();
        assert_eq!(day_first.format("%m").to_string(), "01");
        assert!(parse_timestamp("2024-01-02").is_some());
        assert!(parse_timestamp("1.5").is_none());
    }

    #[test]
    fn test_load_headerless_numeric() {
        let file = csv_file("1.0,2.0\n3.0,4.0\n5.0,6.0\n");
        let series = DataLoader::new()
            .load_csv(file.path().to_str().unwrap(), false)
            .unwrap();

        assert_eq!(series.column_names(), &["col_0".to_string(), "col_1".to_string()]);
        assert_eq!(series.len(), 3);
        assert!(series.timestamps().is_none());
        assert_eq!(series.column("col_1").unwrap().to_vec(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_load_with_header_and_dates() {
        let file = csv_file(
            "date,open,close\n2024-01-01 00:00:00,1.5,1.6\n2024-01-01 01:00:00,1.7,1.8\n",
        );
        let series = DataLoader::new()
            .load_csv(file.path().to_str().unwrap(), true)
            .unwrap();

        assert_eq!(series.column_names(), &["open".to_string(), "close".to_string()]);
        assert_eq!(series.timestamps().unwrap().len(), 2);
    }

    #[test]
    fn test_headerless_dates_are_detected() {
        let file = csv_file("2024-01-01 00:00:00,1\n2024-01-01 01:00:00,2\n");
        let series = DataLoader::new()
            .load_csv(file.path().to_str().unwrap(), false)
            .unwrap();
        assert_eq!(series.column_names(), &["col_0".to_string()]);
        assert!(series.timestamps().is_some());
    }

    #[test]
    fn test_missing_value_is_rejected() {
        let file = csv_file("a,b\n1.0,2.0\n3.0,\n");
        let result = DataLoader::new().load_csv(file.path().to_str().unwrap(), true);
        assert!(matches!(result, Err(ExtractorError::InvalidData(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = DataLoader::new().load_csv("/nonexistent/input.csv", false);
        assert!(matches!(result, Err(ExtractorError::IoError(_))));
    }

    #[test]
    fn test_write_series_round_trip() {
        let file = NamedTempFile::with_suffix(".csv").unwrap();
        let path = file.path().to_str().unwrap();
        let values = Array1::from(vec![0.5, 1.5, 2.5]);

        DataSaver::write_series_csv(path, "price", &values, None, true).unwrap();
        let loaded = DataLoader::new().load_csv(path, true).unwrap();
        assert_eq!(loaded.column("price").unwrap().to_vec(), vec![0.5, 1.5, 2.5]);
    }

    #[test]
    fn test_write_series_with_dates() {
        let file = NamedTempFile::with_suffix(".csv").unwrap();
        let path = file.path().to_str().unwrap();
        let ts: Vec<NaiveDateTime> = ["2024-03-01 00:00:00", "2024-03-01 01:00:00"]
            .iter()
            .map(|s| parse_timestamp(s).unwrap())
            .collect();

        DataSaver::write_series_csv(path, "v", &array![1.0, 2.0], Some(&ts), true).unwrap();
        let loaded = DataLoader::new().load_csv(path, true).unwrap();
        assert_eq!(loaded.timestamps().unwrap(), ts.as_slice());

        let short = &ts[..1];
        assert!(DataSaver::write_series_csv(path, "v", &array![1.0, 2.0], Some(short), true).is_err());
    }

    #[test]
    fn test_write_matrix() {
        let file = NamedTempFile::with_suffix(".csv").unwrap();
        let path = file.path().to_str().unwrap();
        DataSaver::write_matrix_csv(path, "latent", &array![[1.0, 2.0], [3.0, 4.0]], true).unwrap();

        let loaded = DataLoader::new().load_csv(path, true).unwrap();
        assert_eq!(loaded.column_names(), &["latent_0".to_string(), "latent_1".to_string()]);
    }
}
