//! The seam between scheduling and test execution.
//!
//! testsplit does not start processes itself. Whoever embeds it implements
//! [`BucketRunner`] to run one bucket of tests on one worker slot and hand
//! back what happened.
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//!
//! use async_trait::async_trait;
//! use testsplit::model::{CompletedTestResult, TestOutcome};
//! use testsplit::orchestrator::BucketRunner;
//! use testsplit::scheduler::Bucket;
//!
//! struct EchoRunner;
//!
//! #[async_trait]
//! impl BucketRunner for EchoRunner {
//!     async fn run_bucket(
//!         &self,
//!         _worker: usize,
//!         bucket: &Bucket,
//!     ) -> anyhow::Result<Vec<CompletedTestResult>> {
//!         let mut results = Vec::new();
//!         for test in bucket {
//!             let start = Instant::now();
//!             // ... run `test` ...
//!             results.push(
//!                 CompletedTestResult::new(test.clone(), TestOutcome::Passed)
//!                     .with_duration(start.elapsed()),
//!             );
//!         }
//!         Ok(results)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::model::CompletedTestResult;
use crate::scheduler::Bucket;

/// Executes the tests of one bucket, sequentially, on one worker slot.
///
/// Buckets of the same run are executed concurrently, so implementations
/// must be shareable across tasks.
#[async_trait]
pub trait BucketRunner: Send + Sync {
    /// Runs every test of `bucket` and returns one result per test.
    ///
    /// `worker` is the index of the bucket in the plan. Tests missing from
    /// the returned list are counted as not run.
    ///
    /// # Errors
    ///
    /// An error means the whole bucket could not be executed (e.g. the
    /// executable failed to start). All its tests are then counted as not
    /// run and the other buckets are unaffected.
    async fn run_bucket(
        &self,
        worker: usize,
        bucket: &Bucket,
    ) -> anyhow::Result<Vec<CompletedTestResult>>;
}
