//! Utility functions and types

pub mod data_loader;

pub use data_loader::{parse_timestamp, DataLoader, DataSaver, TIMESTAMP_FORMAT};
