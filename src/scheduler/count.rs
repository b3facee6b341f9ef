//! Round-robin splitting by test count.

use super::{Bucket, TestsSplitter};
use crate::model::{DurationMap, TestCase};

/// Splits tests round-robin, ignoring how long they take.
///
/// Test `i` goes to bucket `i mod n` where `n = min(max_workers, tests.len())`,
/// so bucket sizes differ by at most one and the result is deterministic for
/// a given input order.
///
/// Durations, when provided, only feed [`Bucket::duration`].
///
/// # Example
///
/// ```
/// use testsplit::model::TestCase;
/// use testsplit::scheduler::{CountBasedSplitter, TestsSplitter};
///
/// let tests: Vec<_> = ["a", "b", "c"]
///     .iter()
///     .map(|n| TestCase::new(*n, "/build/tests"))
///     .collect();
///
/// let buckets = CountBasedSplitter::new().split(&tests, 2);
/// // Bucket 0: a, c
/// // Bucket 1: b
/// assert_eq!(buckets[0].len(), 2);
/// assert_eq!(buckets[1].len(), 1);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CountBasedSplitter<'a> {
    durations: Option<&'a DurationMap>,
}

impl<'a> CountBasedSplitter<'a> {
    /// Creates a splitter without duration information.
    pub fn new() -> Self {
        Self { durations: None }
    }

    /// Creates a splitter that reports bucket durations from `durations`.
    pub fn with_durations(durations: &'a DurationMap) -> Self {
        Self {
            durations: Some(durations),
        }
    }
}

impl TestsSplitter for CountBasedSplitter<'_> {
    fn split(&self, tests: &[TestCase], max_workers: usize) -> Vec<Bucket> {
        if tests.is_empty() {
            return Vec::new();
        }

        let workers = max_workers.clamp(1, tests.len());
        let mut buckets: Vec<Bucket> = (0..workers).map(|_| Bucket::new()).collect();

        for (i, test) in tests.iter().enumerate() {
            let duration = self
                .durations
                .and_then(|d| d.get(test).copied())
                .unwrap_or(0);
            buckets[i % workers].push(test.clone(), duration);
        }

        buckets
    }
}
