//! Splitting by known test durations.

use super::{Bucket, CountBasedSplitter, TestsSplitter};
use crate::model::{DurationMap, TestCase};

/// Balances buckets by the recorded duration of their tests.
///
/// Tests are ordered longest first (ties keep their input order). Buckets
/// are then filled one after the other: a bucket opens with the longest
/// remaining test and keeps taking the next one while its total stays
/// within `total / max_workers`. Once `max_workers` buckets are open, every
/// remaining test goes to the bucket with the smallest total, the lowest
/// index winning ties.
///
/// Tests without a recorded duration count as 0ms. If no test has a
/// positive duration the split falls back to [`CountBasedSplitter`].
///
/// # Example
///
/// ```
/// use testsplit::model::{DurationMap, TestCase};
/// use testsplit::scheduler::{DurationBasedSplitter, TestsSplitter};
///
/// let long = TestCase::new("Suite.Long", "/build/tests");
/// let short: Vec<_> = (0..3)
///     .map(|i| TestCase::new(format!("Suite.Short{}", i), "/build/tests"))
///     .collect();
///
/// let mut durations = DurationMap::new();
/// durations.insert(long.clone(), 3);
/// for test in &short {
///     durations.insert(test.clone(), 1);
/// }
///
/// let mut tests = short.clone();
/// tests.push(long);
///
/// let buckets = DurationBasedSplitter::new(&durations).split(&tests, 2);
/// assert_eq!(buckets[0].duration(), 3);
/// assert_eq!(buckets[1].duration(), 3);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DurationBasedSplitter<'a> {
    durations: &'a DurationMap,
}

impl<'a> DurationBasedSplitter<'a> {
    pub fn new(durations: &'a DurationMap) -> Self {
        Self { durations }
    }

    fn duration_of(&self, test: &TestCase) -> u64 {
        self.durations.get(test).copied().unwrap_or(0)
    }
}

impl TestsSplitter for DurationBasedSplitter<'_> {
    fn split(&self, tests: &[TestCase], max_workers: usize) -> Vec<Bucket> {
        if tests.is_empty() {
            return Vec::new();
        }

        let mut sorted: Vec<(&TestCase, u64)> =
            tests.iter().map(|t| (t, self.duration_of(t))).collect();
        // Stable, so equal durations keep their input order.
        sorted.sort_by(|a, b| b.1.cmp(&a.1));

        let total = sorted.iter().fold(0u64, |sum, (_, d)| sum.saturating_add(*d));
        if total == 0 {
            return CountBasedSplitter::with_durations(self.durations).split(tests, max_workers);
        }

        let workers = max_workers.max(1);
        let target = total / workers as u64;

        let mut remaining = sorted.into_iter().peekable();
        let mut buckets: Vec<Bucket> = Vec::with_capacity(workers.min(tests.len()));

        while buckets.len() < workers {
            let Some((test, duration)) = remaining.next() else {
                break;
            };
            let mut bucket = Bucket::new();
            bucket.push(test.clone(), duration);

            loop {
                let current = bucket.duration();
                match remaining.next_if(|&(_, d)| current.saturating_add(d) <= target) {
                    Some((test, duration)) => bucket.push(test.clone(), duration),
                    None => break,
                }
            }

            buckets.push(bucket);
        }

        for (test, duration) in remaining {
            if let Some(bucket) = buckets.iter_mut().min_by_key(|b| b.duration()) {
                bucket.push(test.clone(), duration);
            }
        }

        buckets
    }
}
