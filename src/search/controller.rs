//! Interface size search controller
//!
//! Repeatedly builds, trains and scores a model while moving the interface
//! size by a fixed step until the reconstruction error crosses a threshold.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::evaluator::{timed_trial, SearchIteration, TrialRunner};
use crate::error::{ExtractorError, Result};
use crate::training::{ErrorMetric, ReconstructionScore};

/// Direction in which the interface size moves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Start small and add `step_size` until the error meets the threshold
    #[default]
    Grow,
    /// Start large and remove `step_size` while the error meets the threshold
    Shrink,
}

impl FromStr for SearchMode {
    type Err = ExtractorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "grow" | "incremental" => Ok(SearchMode::Grow),
            "shrink" | "decremental" => Ok(SearchMode::Shrink),
            other => Err(ExtractorError::invalid_parameter(
                "search_mode",
                other,
                "expected 'grow' or 'shrink'",
            )),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Grow => write!(f, "grow"),
            SearchMode::Shrink => write!(f, "shrink"),
        }
    }
}

/// Search state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchState {
    /// Trials still running
    Searching,
    /// Threshold condition met
    Converged,
    /// Size bound, iteration cap or time cap reached first
    Exhausted,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchState::Searching => write!(f, "searching"),
            SearchState::Converged => write!(f, "converged"),
            SearchState::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub initial_size: usize,
    pub step_size: usize,
    pub threshold_error: f64,
    pub mode: SearchMode,
    pub error_metric: ErrorMetric,
    /// Maximum number of trials
    pub max_iterations: Option<usize>,
    /// Wall-clock budget checked after each trial
    pub max_duration: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            initial_size: 8,
            step_size: 4,
            threshold_error: 0.005,
            mode: SearchMode::Grow,
            error_metric: ErrorMetric::Mse,
            max_iterations: None,
            max_duration: None,
        }
    }
}

impl SearchConfig {
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_sizes(mut self, initial_size: usize, step_size: usize) -> Self {
        self.initial_size = initial_size;
        self.step_size = step_size;
        self
    }

    pub fn with_threshold(mut self, threshold_error: f64) -> Self {
        self.threshold_error = threshold_error;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    fn validate(&self, input_dim: usize) -> Result<()> {
        if self.step_size == 0 {
            return Err(ExtractorError::invalid_parameter("step_size", 0, "must be positive"));
        }
        if !self.threshold_error.is_finite() || self.threshold_error < 0.0 {
            return Err(ExtractorError::invalid_parameter(
                "threshold_error",
                self.threshold_error,
                "must be a non-negative number",
            ));
        }
        if self.initial_size == 0 || self.initial_size >= input_dim {
            return Err(ExtractorError::invalid_parameter(
                "initial_size",
                self.initial_size,
                format!("must be in [1, {}) for input dimension {}", input_dim, input_dim),
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(ExtractorError::invalid_parameter(
                "max_iterations",
                0,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Result of a finished search
#[derive(Debug)]
pub struct SearchOutcome<M> {
    /// `Converged` or `Exhausted`
    pub state: SearchState,
    /// Chosen interface size
    pub interface_size: usize,
    /// Score of the chosen model
    pub score: ReconstructionScore,
    /// Trained model for the chosen size
    pub model: M,
    /// Every trial in order
    pub iterations: Vec<SearchIteration>,
}

impl<M> SearchOutcome<M> {
    pub fn converged(&self) -> bool {
        self.state == SearchState::Converged
    }
}

/// Adaptive interface size search
#[derive(Debug, Clone, Default)]
pub struct InterfaceSizeSearch {
    config: SearchConfig,
}

impl InterfaceSizeSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run trials until the threshold decides the size or a bound is hit.
    ///
    /// Every trial starts from a freshly initialised model. A failing trial
    /// aborts the search.
    pub fn run<R: TrialRunner>(&self, runner: &mut R) -> Result<SearchOutcome<R::Model>> {
        let input_dim = runner.input_dim();
        self.config.validate(input_dim)?;

        let started = Instant::now();
        let mut size = self.config.initial_size;
        let mut iterations: Vec<SearchIteration> = Vec::new();
        // Last size that met the threshold, shrink mode only
        let mut last_good: Option<(usize, ReconstructionScore, R::Model)> = None;

        info!(
            mode = %self.config.mode,
            initial_size = size,
            step_size = self.config.step_size,
            threshold = self.config.threshold_error,
            metric = %self.config.error_metric,
            input_dim,
            "interface size search started"
        );

        loop {
            let iteration = iterations.len() + 1;
            info!(iteration, interface_size = size, "search iteration started");
            let (trial, record) = timed_trial(runner, iteration, size, self.config.error_metric)?;
            let error = record.error;
            info!(
                iteration,
                interface_size = size,
                error,
                mse = record.score.mse,
                mae = record.score.mae,
                train_time = record.train_time,
                "search iteration finished"
            );
            iterations.push(record);

            let capped = self.capped(iterations.len(), started);
            let meets = error <= self.config.threshold_error;

            match self.config.mode {
                SearchMode::Grow => {
                    if meets {
                        return Ok(self.finish(SearchState::Converged, size, trial.score, trial.model, iterations));
                    }
                    match size.checked_add(self.config.step_size) {
                        Some(next) if next < input_dim && !capped => size = next,
                        _ => {
                            return Ok(self.finish(SearchState::Exhausted, size, trial.score, trial.model, iterations));
                        }
                    }
                }
                SearchMode::Shrink => {
                    if !meets {
                        return Ok(match last_good.take() {
                            Some((good_size, score, model)) => {
                                self.finish(SearchState::Converged, good_size, score, model, iterations)
                            }
                            None => self.finish(SearchState::Exhausted, size, trial.score, trial.model, iterations),
                        });
                    }
                    if size <= self.config.step_size || capped {
                        return Ok(self.finish(SearchState::Exhausted, size, trial.score, trial.model, iterations));
                    }
                    last_good = Some((size, trial.score, trial.model));
                    size -= self.config.step_size;
                }
            }
        }
    }

    fn capped(&self, iterations: usize, started: Instant) -> bool {
        let by_count = self.config.max_iterations.is_some_and(|max| iterations >= max);
        let by_time = self.config.max_duration.is_some_and(|max| started.elapsed() >= max);
        by_count || by_time
    }

    fn finish<M>(
        &self,
        state: SearchState,
        interface_size: usize,
        score: ReconstructionScore,
        model: M,
        iterations: Vec<SearchIteration>,
    ) -> SearchOutcome<M> {
        let error = score.metric(self.config.error_metric);
        match state {
            SearchState::Converged => info!(
                interface_size,
                error,
                iterations = iterations.len(),
                "search converged"
            ),
            _ => warn!(
                interface_size,
                error,
                threshold = self.config.threshold_error,
                iterations = iterations.len(),
                "search exhausted before meeting the threshold"
            ),
        }
        SearchOutcome {
            state,
            interface_size,
            score,
            model,
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Trial;

    /// Synthetic runner whose error is a fixed function of the size
    struct FnRunner<F: Fn(usize) -> f64> {
        input_dim: usize,
        error: F,
        calls: Vec<usize>,
        fail_at: Option<usize>,
    }

    impl<F: Fn(usize) -> f64> FnRunner<F> {
        fn new(input_dim: usize, error: F) -> Self {
            Self { input_dim, error, calls: Vec::new(), fail_at: None }
        }
    }

    impl<F: Fn(usize) -> f64> TrialRunner for FnRunner<F> {
        type Model = usize;

        fn input_dim(&self) -> usize {
            self.input_dim
        }

        fn run_trial(&mut self, interface_size: usize) -> Result<Trial<usize>> {
            self.calls.push(interface_size);
            if self.fail_at == Some(interface_size) {
                return Err(ExtractorError::InvalidData("trial failed".to_string()));
            }
            let e = (self.error)(interface_size);
            Ok(Trial {
                model: interface_size,
                score: ReconstructionScore { mse: e, mae: e.sqrt() },
                epochs: None,
            })
        }
    }

    fn search(mode: SearchMode, initial: usize, step: usize, threshold: f64) -> InterfaceSizeSearch {
        InterfaceSizeSearch::new(
            SearchConfig::default()
                .with_mode(mode)
                .with_sizes(initial, step)
                .with_threshold(threshold),
        )
    }

    #[test]
    fn test_grow_converges_at_first_iteration() {
        let mut runner = FnRunner::new(64, |size| 1.0 / size as f64);
        let outcome = search(SearchMode::Grow, 8, 4, 0.3).run(&mut runner).unwrap();

        assert_eq!(outcome.state, SearchState::Converged);
        assert_eq!(outcome.interface_size, 8);
        assert_eq!(outcome.model, 8);
        assert_eq!(outcome.iterations.len(), 1);
    }

    #[test]
    fn test_grow_keeps_smallest_passing_size() {
        let mut runner = FnRunner::new(64, |size| 1.0 / size as f64);
        let outcome = search(SearchMode::Grow, 2, 3, 0.1).run(&mut runner).unwrap();

        assert!(outcome.converged());
        assert_eq!(runner.calls, vec![2, 5, 8, 11]);
        assert_eq!(outcome.interface_size, 11);
    }

    #[test]
    fn test_grow_unreachable_threshold_is_bounded() {
        for (input_dim, step) in [(10, 1), (10, 3), (17, 4), (64, 5), (5, 7)] {
            let mut runner = FnRunner::new(input_dim, |_| 1.0);
            let outcome = search(SearchMode::Grow, 1, step, 0.0).run(&mut runner).unwrap();

            assert_eq!(outcome.state, SearchState::Exhausted);
            assert!(outcome.iterations.len() <= input_dim.div_ceil(step));
            assert!(runner.calls.iter().all(|&s| s < input_dim));
            assert_eq!(outcome.interface_size, *runner.calls.last().unwrap());
        }
    }

    #[test]
    fn test_shrink_returns_previous_passing_size() {
        // Error grows as the size shrinks; sizes >= 12 pass.
        let mut runner = FnRunner::new(64, |size| if size >= 12 { 0.01 } else { 0.5 });
        let outcome = search(SearchMode::Shrink, 32, 4, 0.05).run(&mut runner).unwrap();

        assert_eq!(outcome.state, SearchState::Converged);
        assert_eq!(outcome.interface_size, 12);
        assert_eq!(outcome.model, 12);
        assert_eq!(runner.calls, vec![32, 28, 24, 20, 16, 12, 8]);

        let chosen = &outcome.iterations[outcome.iterations.len() - 2];
        let next = outcome.iterations.last().unwrap();
        assert!(chosen.error <= 0.05);
        assert!(next.error > 0.05);
    }

    #[test]
    fn test_shrink_first_failure_is_exhausted() {
        let mut runner = FnRunner::new(64, |_| 1.0);
        let outcome = search(SearchMode::Shrink, 16, 4, 0.1).run(&mut runner).unwrap();
        assert_eq!(outcome.state, SearchState::Exhausted);
        assert_eq!(outcome.interface_size, 16);
    }

    #[test]
    fn test_shrink_stops_before_zero() {
        let mut runner = FnRunner::new(64, |_| 0.0);
        let outcome = search(SearchMode::Shrink, 10, 4, 0.1).run(&mut runner).unwrap();
        assert_eq!(outcome.state, SearchState::Exhausted);
        assert_eq!(runner.calls, vec![10, 6, 2]);
        assert_eq!(outcome.interface_size, 2);
    }

    #[test]
    fn test_iteration_cap() {
        let mut runner = FnRunner::new(100, |_| 1.0);
        let search = InterfaceSizeSearch::new(
            SearchConfig::default()
                .with_sizes(1, 1)
                .with_threshold(0.0)
                .with_max_iterations(3),
        );
        let outcome = search.run(&mut runner).unwrap();
        assert_eq!(outcome.state, SearchState::Exhausted);
        assert_eq!(outcome.iterations.len(), 3);
    }

    #[test]
    fn test_trial_failure_aborts_search() {
        let mut runner = FnRunner::new(64, |_| 1.0);
        runner.fail_at = Some(12);
        let result = search(SearchMode::Grow, 8, 4, 0.1).run(&mut runner);
        assert!(matches!(result, Err(ExtractorError::InvalidData(_))));
        assert_eq!(runner.calls, vec![8, 12]);
    }

    #[test]
    fn test_grow_huge_step_exhausts_after_one_trial() {
        let mut runner = FnRunner::new(64, |_| 1.0);
        let outcome = search(SearchMode::Grow, 8, usize::MAX, 0.1).run(&mut runner).unwrap();

        assert_eq!(outcome.state, SearchState::Exhausted);
        assert_eq!(outcome.interface_size, 8);
        assert_eq!(runner.calls, vec![8]);
    }

    #[test]
    fn test_initial_size_bounds() {
        let mut runner = FnRunner::new(8, |_| 0.0);
        assert!(search(SearchMode::Grow, 8, 1, 0.1).run(&mut runner).is_err());
        assert!(search(SearchMode::Grow, 0, 1, 0.1).run(&mut runner).is_err());
        assert!(search(SearchMode::Grow, 2, 0, 0.1).run(&mut runner).is_err());
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("SHRINK".parse::<SearchMode>().unwrap(), SearchMode::Shrink);
        assert_eq!("incremental".parse::<SearchMode>().unwrap(), SearchMode::Grow);
        assert!("sideways".parse::<SearchMode>().is_err());
    }
}
