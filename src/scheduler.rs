//! Test scheduling and distribution.
//!
//! This module partitions the tests of a run into [`Bucket`]s, one per
//! worker slot. Each bucket runs sequentially on its worker; buckets run in
//! parallel.
//!
//! # Splitting Strategies
//!
//! | Splitter | Input | Use Case |
//! |----------|-------|----------|
//! | [`CountBasedSplitter`] | Test list | No (or incomplete) duration history |
//! | [`DurationBasedSplitter`] | Test list + durations | Every test has a known duration |
//!
//! The [`Scheduler`] picks between them according to its [`SplitStrategy`].
//!
//! # Example
//!
//! ```
//! use testsplit::model::{DurationMap, TestCase};
//! use testsplit::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new(4); // 4 parallel workers
//!
//! let tests: Vec<TestCase> = (0..10)
//!     .map(|i| TestCase::new(format!("Suite.Test{}", i), "/build/tests"))
//!     .collect();
//!
//! let buckets = scheduler.schedule(&tests, &DurationMap::new());
//! assert_eq!(buckets.len(), 4);
//! assert_eq!(buckets[0].len(), 3);
//! ```

pub mod count;
pub mod duration;

pub use count::CountBasedSplitter;
pub use duration::DurationBasedSplitter;

use std::collections::HashSet;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SchedulingConfig;
use crate::model::{DurationMap, TestCase};

/// An algorithm partitioning tests into at most `max_workers` buckets.
///
/// Implementations must return every input test exactly once, must not
/// return empty buckets, and must return at most
/// `min(max_workers, tests.len())` buckets.
pub trait TestsSplitter {
    /// Splits `tests` into ordered buckets, one per worker slot.
    ///
    /// `max_workers` below 1 is treated as 1.
    fn split(&self, tests: &[TestCase], max_workers: usize) -> Vec<Bucket>;
}

/// Tests assigned to one worker slot, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bucket {
    tests: Vec<TestCase>,
    #[serde(rename = "duration_ms")]
    duration: u64,
}

impl Bucket {
    /// Creates an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a test with its known duration (0 if unknown).
    ///
    /// The aggregate saturates at `u64::MAX`.
    pub fn push(&mut self, test: TestCase, duration: u64) {
        self.tests.push(test);
        self.duration = self.duration.saturating_add(duration);
    }

    /// Returns the tests of this bucket in execution order.
    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    /// Returns the sum of the known durations of this bucket's tests.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Returns the number of tests in this bucket.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if this bucket has no tests.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Iterates over the tests of this bucket.
    pub fn iter(&self) -> std::slice::Iter<'_, TestCase> {
        self.tests.iter()
    }

    /// Consumes the bucket, returning its tests.
    pub fn into_tests(self) -> Vec<TestCase> {
        self.tests
    }
}

impl<'a> IntoIterator for &'a Bucket {
    type Item = &'a TestCase;
    type IntoIter = std::slice::Iter<'a, TestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.tests.iter()
    }
}

/// Which splitter the [`Scheduler`] uses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Duration-based if every test has a known duration, count-based otherwise.
    #[default]
    Auto,

    /// Always round-robin by test count.
    Count,

    /// Always balance by known duration (unknown tests count as 0ms).
    Duration,
}

/// Distributes tests across parallel worker slots.
///
/// The scheduler doesn't know about the workers themselves; it only decides
/// which tests each of them runs.
#[derive(Debug, Clone)]
pub struct Scheduler {
    max_workers: usize,
    strategy: SplitStrategy,
}

impl Scheduler {
    /// Creates a new scheduler with the given parallelism limit.
    ///
    /// # Arguments
    ///
    /// * `max_workers` - Maximum number of parallel buckets. `0` means one
    ///   per available CPU.
    ///
    /// # Example
    ///
    /// ```
    /// use testsplit::scheduler::Scheduler;
    ///
    /// assert_eq!(Scheduler::new(4).max_workers(), 4);
    /// assert!(Scheduler::new(0).max_workers() >= 1);
    /// ```
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: resolve_workers(max_workers),
            strategy: SplitStrategy::Auto,
        }
    }

    /// Creates a scheduler from the `[scheduling]` configuration section.
    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self::new(config.max_workers).with_strategy(config.strategy)
    }

    /// Sets the splitting strategy.
    pub fn with_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns the effective maximum number of workers (always >= 1).
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Returns the configured strategy.
    pub fn strategy(&self) -> SplitStrategy {
        self.strategy
    }

    /// Schedules tests into buckets.
    ///
    /// Duplicate tests in the input are scheduled once.
    ///
    /// # Returns
    ///
    /// Between 1 and `min(max_workers, tests.len())` non-empty buckets, or
    /// no bucket at all if `tests` is empty.
    pub fn schedule(&self, tests: &[TestCase], durations: &DurationMap) -> Vec<Bucket> {
        let mut seen = HashSet::with_capacity(tests.len());
        let unique: Vec<TestCase> = tests
            .iter()
            .filter(|t| seen.insert(*t))
            .cloned()
            .collect();
        if unique.len() < tests.len() {
            debug!(
                "Dropped {} duplicate tests before scheduling",
                tests.len() - unique.len()
            );
        }

        let use_durations = match self.strategy {
            SplitStrategy::Count => false,
            SplitStrategy::Duration => true,
            SplitStrategy::Auto => unique.iter().all(|t| durations.contains_key(t)),
        };

        let buckets = if use_durations {
            debug!("Using duration-based splitter");
            DurationBasedSplitter::new(durations).split(&unique, self.max_workers)
        } else {
            debug!("Using count-based splitter");
            CountBasedSplitter::with_durations(durations).split(&unique, self.max_workers)
        };

        debug!(
            "Scheduled {} tests into {} buckets",
            unique.len(),
            buckets.len()
        );
        buckets
    }
}

fn resolve_workers(max_workers: usize) -> usize {
    if max_workers > 0 {
        return max_workers;
    }
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
