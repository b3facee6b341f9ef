//! Test identities, outcomes, and completed results.
//!
//! These are the plain data types exchanged with the collaborators around
//! the scheduler: discovery hands in [`TestCase`]s, the process executor
//! hands back [`CompletedTestResult`]s.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use testsplit::model::{CompletedTestResult, TestCase, TestOutcome};
//!
//! let test = TestCase::new("MathSuite.Adds", "/build/math_tests");
//! let result = CompletedTestResult::new(test.clone(), TestOutcome::Passed)
//!     .with_duration(Duration::from_micros(2_400));
//!
//! assert_eq!(result.duration_ms(), 3);
//! assert_eq!(test.to_string(), "MathSuite.Adds");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Known durations in milliseconds, keyed by test.
pub type DurationMap = HashMap<TestCase, u64>;

/// Identity of a single test: its fully-qualified name and the executable
/// that contains it.
///
/// Two test cases are equal only if both the name and the executable path
/// match, so the same test name compiled into two binaries yields two
/// distinct identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestCase {
    name: String,
    executable: PathBuf,
}

impl TestCase {
    /// Creates a test case from its fully-qualified name and executable path.
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
        }
    }

    /// Returns the fully-qualified test name (e.g. `Suite.Test/0`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the path of the executable containing this test.
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The outcome of executing a test.
///
/// | Outcome | Duration persisted? |
/// |---------|---------------------|
/// | Passed | Yes |
/// | Failed | Yes |
/// | Skipped | No |
/// | NotRun | No |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// Test ran and its assertions held.
    Passed,

    /// Test ran and an assertion failed.
    Failed,

    /// Test was skipped by the framework.
    Skipped,

    /// Test never ran (crash of the executable, cancellation, infrastructure).
    NotRun,
}

impl TestOutcome {
    /// Returns `true` if the test actually ran to completion, so its
    /// measured duration says something about future runs.
    ///
    /// ```
    /// use testsplit::model::TestOutcome;
    ///
    /// assert!(TestOutcome::Passed.has_duration());
    /// assert!(TestOutcome::Failed.has_duration());
    /// assert!(!TestOutcome::Skipped.has_duration());
    /// assert!(!TestOutcome::NotRun.has_duration());
    /// ```
    pub fn has_duration(&self) -> bool {
        matches!(self, TestOutcome::Passed | TestOutcome::Failed)
    }
}

/// A test result reported back by a worker after execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTestResult {
    /// The test that was executed.
    #[serde(flatten)]
    pub test_case: TestCase,

    /// How the execution ended.
    pub outcome: TestOutcome,

    /// Wall-clock time the test took.
    #[serde(rename = "duration_ms", with = "millis", default)]
    pub duration: Duration,
}

impl CompletedTestResult {
    /// Creates a result with a zero duration.
    pub fn new(test_case: TestCase, outcome: TestOutcome) -> Self {
        Self {
            test_case,
            outcome,
            duration: Duration::ZERO,
        }
    }

    /// Sets the measured duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Returns the measured duration in whole milliseconds, see [`duration_millis`].
    pub fn duration_ms(&self) -> u64 {
        duration_millis(self.duration)
    }
}

/// Converts a measured duration to whole milliseconds, rounding up, with a
/// floor of 1ms.
///
/// ```
/// use std::time::Duration;
/// use testsplit::model::duration_millis;
///
/// assert_eq!(duration_millis(Duration::ZERO), 1);
/// assert_eq!(duration_millis(Duration::from_micros(1_001)), 2);
/// assert_eq!(duration_millis(Duration::from_millis(40)), 40);
/// ```
pub fn duration_millis(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    let millis = nanos.div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}

/// Serializes a [`Duration`] as a floating-point number of milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "duration_ms must be a non-negative number, got {}",
                ms
            )));
        }
        Ok(Duration::from_nanos((ms * 1_000_000.0).round() as u64))
    }
}
