//! Interface size search
//!
//! Finds the latent dimensionality of an autoencoder by repeated
//! build-train-evaluate trials:
//! - Grow mode: smallest size whose error meets the threshold
//! - Shrink mode: smallest size before the error exceeds the threshold
//! - Iteration and wall-clock caps
//! - Per-iteration error trace

mod controller;
mod evaluator;

pub use controller::{InterfaceSizeSearch, SearchConfig, SearchMode, SearchOutcome, SearchState};
pub use evaluator::{AutoencoderTrial, SearchIteration, Trial, TrialRunner};
