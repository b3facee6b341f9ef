//! Scheduling accuracy diagnostics.
//!
//! The [`SchedulingAnalyzer`] collects, for every test of a run, the
//! duration the scheduler expected (from the duration store) and the
//! duration actually measured. [`SchedulingAnalyzer::summarize`] compares
//! the two so an operator can judge whether the recorded history is a good
//! predictor. Nothing here influences scheduling itself.
//!
//! # Example
//!
//! ```
//! use testsplit::analysis::SchedulingAnalyzer;
//! use testsplit::model::TestCase;
//!
//! let analyzer = SchedulingAnalyzer::new();
//! let test = TestCase::new("Suite.Test", "/build/tests");
//!
//! assert!(analyzer.record_expected(&test, 120));
//! assert!(analyzer.record_actual(&test, 100));
//! assert!(!analyzer.record_actual(&test, 90)); // first writer wins
//!
//! let report = analyzer.summarize(10);
//! let summary = report.summary.unwrap();
//! assert_eq!(summary.samples, 1);
//! assert_eq!(summary.mean_difference, 20.0);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::model::TestCase;

/// Durations keyed by test, remembering insertion order.
#[derive(Debug, Default)]
struct Samples {
    index: HashMap<TestCase, usize>,
    entries: Vec<(TestCase, u64)>,
}

impl Samples {
    fn insert_if_absent(&mut self, test: &TestCase, duration: u64) -> bool {
        if self.index.contains_key(test) {
            return false;
        }
        self.index.insert(test.clone(), self.entries.len());
        self.entries.push((test.clone(), duration));
        true
    }

    fn get(&self, test: &TestCase) -> Option<u64> {
        self.index.get(test).map(|&i| self.entries[i].1)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Collects expected and actual test durations during a run.
///
/// Both recording methods can be called concurrently from several workers.
/// Each test keeps the first expected and the first actual duration
/// reported for it.
#[derive(Debug, Default)]
pub struct SchedulingAnalyzer {
    expected: Mutex<Samples>,
    actual: Mutex<Samples>,
}

impl SchedulingAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the duration the scheduler expected for `test`.
    ///
    /// Returns `false` if an expected duration was already recorded.
    pub fn record_expected(&self, test: &TestCase, duration_ms: u64) -> bool {
        self.expected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert_if_absent(test, duration_ms)
    }

    /// Records the measured duration of `test`.
    ///
    /// Returns `false` if an actual duration was already recorded.
    pub fn record_actual(&self, test: &TestCase, duration_ms: u64) -> bool {
        self.actual
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert_if_absent(test, duration_ms)
    }

    pub fn expected_count(&self) -> usize {
        self.expected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn actual_count(&self) -> usize {
        self.actual
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Compares expected and actual durations of every test that has both.
    ///
    /// The report lists up to `worst_count` tests with the largest absolute
    /// difference; equal differences keep the order in which the expected
    /// durations were recorded.
    pub fn summarize(&self, worst_count: usize) -> DiagnosticReport {
        let expected = self.expected.lock().unwrap_or_else(PoisonError::into_inner);
        let actual = self.actual.lock().unwrap_or_else(PoisonError::into_inner);

        let mut report = DiagnosticReport {
            expected_count: expected.len(),
            actual_count: actual.len(),
            summary: None,
        };
        if expected.entries.is_empty() || actual.entries.is_empty() {
            return report;
        }

        let mut predictions: Vec<Prediction> = expected
            .entries
            .iter()
            .filter_map(|(test, exp)| {
                actual.get(test).map(|act| Prediction {
                    test: test.clone(),
                    expected: *exp,
                    actual: act,
                })
            })
            .collect();
        if predictions.is_empty() {
            return report;
        }

        let samples = predictions.len();
        let mean = predictions.iter().map(|p| p.difference() as f64).sum::<f64>() / samples as f64;
        let variance = predictions
            .iter()
            .map(|p| (p.difference() as f64 - mean).powi(2))
            .sum::<f64>()
            / samples as f64;

        predictions.sort_by_key(|p| std::cmp::Reverse(p.difference().unsigned_abs()));
        predictions.truncate(worst_count);

        report.summary = Some(AccuracySummary {
            samples,
            mean_difference: mean,
            std_deviation: variance.sqrt(),
            worst: predictions,
        });
        report
    }
}

/// Expected and actual duration of one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub test: TestCase,
    pub expected: u64,
    pub actual: u64,
}

impl Prediction {
    /// Expected minus actual, in milliseconds, saturating at the `i64`
    /// bounds.
    pub fn difference(&self) -> i64 {
        let expected = i64::try_from(self.expected).unwrap_or(i64::MAX);
        let actual = i64::try_from(self.actual).unwrap_or(i64::MAX);
        expected.saturating_sub(actual)
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, expected {}ms, actual {}ms",
            self.test, self.expected, self.actual
        )
    }
}

/// Statistics over all tests with both an expected and an actual duration.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracySummary {
    pub samples: usize,
    /// Mean of `expected - actual`, in milliseconds.
    pub mean_difference: f64,
    /// Population standard deviation of `expected - actual`.
    pub std_deviation: f64,
    /// Largest absolute differences first.
    pub worst: Vec<Prediction>,
}

/// Result of [`SchedulingAnalyzer::summarize`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    pub expected_count: usize,
    pub actual_count: usize,
    /// `None` when there is nothing to compare.
    pub summary: Option<AccuracySummary>,
}

impl DiagnosticReport {
    /// Emits the report line by line at `info` level.
    pub fn log(&self) {
        for line in self.to_string().lines() {
            info!("{}", line);
        }
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scheduling statistics:")?;
        writeln!(f, "  Tests with expected duration: {}", self.expected_count)?;
        writeln!(f, "  Tests with actual duration: {}", self.actual_count)?;

        let Some(summary) = &self.summary else {
            return writeln!(f, "  Nothing to report.");
        };

        writeln!(f, "  Tests with both durations: {}", summary.samples)?;
        writeln!(
            f,
            "  Average difference (expected - actual): {:.1}ms",
            summary.mean_difference
        )?;
        writeln!(f, "  Standard deviation: {:.1}ms", summary.std_deviation)?;
        writeln!(f, "  {} worst differences:", summary.worst.len())?;
        for prediction in &summary.worst {
            writeln!(f, "    {}", prediction)?;
        }
        Ok(())
    }
}
