//! Run orchestration: plan, execute, record.
//!
//! # Architecture
//!
//! ```text
//!  Vec<TestCase>
//!       │
//!       │ DurationStore::load()        ──► expected durations ──┐
//!       ▼                                                       │
//!   Scheduler::schedule()                                       │
//!       │                                                       ▼
//!  Vec<Bucket> ──► BucketRunner::run_bucket() (one per worker) SchedulingAnalyzer
//!                        │                                      ▲
//!                        ▼                                      │
//!               Vec<CompletedTestResult> ── actual durations ───┘
//!                        │
//!                        ▼
//!               DurationStore::update()
//! ```
//!
//! # Execution Flow
//!
//! 1. **Planning**: Load the duration history of the tests and split them
//!    into buckets
//! 2. **Execution**: Hand every bucket to the [`BucketRunner`], all buckets
//!    concurrently
//! 3. **Recording**: As each bucket finishes, persist its durations and feed
//!    the accuracy analyzer
//! 4. **Diagnostics**: Log the scheduling accuracy report
//!
//! # Example
//!
//! ```no_run
//! use testsplit::config::load_config;
//! use testsplit::model::TestCase;
//! use testsplit::orchestrator::{BucketRunner, Orchestrator};
//!
//! async fn run_all(runner: impl BucketRunner, tests: &[TestCase]) -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("testsplit.toml"))?;
//!
//!     let orchestrator = Orchestrator::new(config, runner);
//!     let result = orchestrator.run(tests).await;
//!
//!     if !result.success() {
//!         println!("{} tests failed", result.failed);
//!     }
//!     std::process::exit(result.exit_code());
//! }
//! ```

pub mod runner;

pub use runner::BucketRunner;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::analysis::{DiagnosticReport, SchedulingAnalyzer};
use crate::config::Config;
use crate::durations::DurationStore;
use crate::model::{CompletedTestResult, TestCase, TestOutcome};
use crate::scheduler::{Bucket, Scheduler};

/// Aggregated results of an entire test run.
///
/// # Exit Codes
///
/// | Code | Meaning |
/// |------|---------|
/// | 0 | All tests passed or were skipped |
/// | 1 | Some tests failed or weren't run |
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Number of distinct tests scheduled.
    pub total_tests: usize,

    pub passed: usize,

    pub failed: usize,

    pub skipped: usize,

    /// Tests whose bucket could not be executed or that the runner didn't
    /// report.
    pub not_run: usize,

    /// Number of buckets the tests were split into.
    pub buckets: usize,

    /// Wall-clock duration of the entire run.
    pub duration: Duration,

    /// One result per scheduled test.
    pub results: Vec<CompletedTestResult>,
}

impl RunResult {
    fn empty(duration: Duration) -> Self {
        Self {
            total_tests: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            not_run: 0,
            buckets: 0,
            duration,
            results: Vec::new(),
        }
    }

    /// Returns `true` if no test failed and every test was executed.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use testsplit::orchestrator::RunResult;
    ///
    /// let result = RunResult {
    ///     total_tests: 100,
    ///     passed: 95,
    ///     failed: 0,
    ///     skipped: 5,
    ///     not_run: 0,
    ///     buckets: 8,
    ///     duration: Duration::from_secs(60),
    ///     results: vec![],
    /// };
    ///
    /// assert!(result.success());
    /// ```
    pub fn success(&self) -> bool {
        self.failed == 0 && self.not_run == 0
    }

    /// Returns an appropriate process exit code for this result.
    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }
}

/// Ties the duration store, the scheduler, the accuracy analyzer and a
/// [`BucketRunner`] together for one run.
///
/// [`plan`](Self::plan) and [`complete`](Self::complete) can also be used on
/// their own by callers that drive execution themselves.
pub struct Orchestrator<R> {
    config: Config,
    store: Arc<DurationStore>,
    scheduler: Scheduler,
    analyzer: SchedulingAnalyzer,
    runner: R,
}

impl<R> Orchestrator<R> {
    /// Creates an orchestrator from configuration and a runner.
    pub fn new(config: Config, runner: R) -> Self {
        Self {
            store: Arc::new(DurationStore::from_config(&config.durations)),
            scheduler: Scheduler::from_config(&config.scheduling),
            analyzer: SchedulingAnalyzer::new(),
            config,
            runner,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &DurationStore {
        &self.store
    }

    /// Returns the analyzer collecting this orchestrator's samples.
    pub fn analyzer(&self) -> &SchedulingAnalyzer {
        &self.analyzer
    }

    /// Loads the duration history of `tests` and splits them into buckets.
    ///
    /// Every known duration is recorded as the expected duration of its test.
    pub fn plan(&self, tests: &[TestCase]) -> Vec<Bucket> {
        let durations = self.store.load(tests);
        debug!(
            "Found durations for {} of {} tests",
            durations.len(),
            tests.len()
        );

        for test in tests {
            if let Some(&expected) = durations.get(test)
                && !self.analyzer.record_expected(test, expected)
            {
                debug!("Expected duration of {} already recorded", test);
            }
        }

        self.scheduler.schedule(tests, &durations)
    }

    /// Persists the durations of finished tests and records them as actual
    /// durations.
    ///
    /// A store failure is logged and otherwise ignored so that the run can
    /// continue without history.
    ///
    /// This does blocking file I/O; [`run`](Self::run) moves it to tokio's
    /// blocking pool instead.
    pub fn complete(&self, results: &[CompletedTestResult]) {
        if let Err(e) = self.store.update(results) {
            warn!("Failed to persist test durations: {}", e);
        }
        self.record_actual(results);
    }

    fn record_actual(&self, results: &[CompletedTestResult]) {
        for result in results.iter().filter(|r| r.outcome.has_duration()) {
            if !self
                .analyzer
                .record_actual(&result.test_case, result.duration_ms())
            {
                debug!("Actual duration of {} already recorded", result.test_case);
            }
        }
    }

    /// Summarizes the samples collected so far.
    pub fn report(&self) -> DiagnosticReport {
        self.analyzer
            .summarize(self.config.diagnostics.worst_count)
    }
}

impl<R: BucketRunner> Orchestrator<R> {
    /// Plans, executes and records a run of `tests`.
    ///
    /// Buckets are executed concurrently. Results of each bucket are
    /// recorded as soon as it finishes, so durations of completed buckets
    /// survive even if the process is interrupted later.
    pub async fn run(&self, tests: &[TestCase]) -> RunResult {
        let start = Instant::now();

        if tests.is_empty() {
            warn!("No tests to run");
            return RunResult::empty(start.elapsed());
        }

        let buckets = self.plan(tests);
        let total_tests = buckets.iter().map(Bucket::len).sum();
        info!(
            "Scheduled {} tests into {} buckets",
            total_tests,
            buckets.len()
        );

        let runs = buckets
            .iter()
            .enumerate()
            .map(|(worker, bucket)| self.run_bucket(worker, bucket));
        let results: Vec<CompletedTestResult> =
            join_all(runs).await.into_iter().flatten().collect();

        if self.config.diagnostics.enabled {
            self.report().log();
        }

        let count = |outcome: TestOutcome| results.iter().filter(|r| r.outcome == outcome).count();
        RunResult {
            total_tests,
            passed: count(TestOutcome::Passed),
            failed: count(TestOutcome::Failed),
            skipped: count(TestOutcome::Skipped),
            not_run: count(TestOutcome::NotRun),
            buckets: buckets.len(),
            duration: start.elapsed(),
            results,
        }
    }

    async fn run_bucket(&self, worker: usize, bucket: &Bucket) -> Vec<CompletedTestResult> {
        debug!("Worker {} running {} tests", worker, bucket.len());

        let mut results = match self.runner.run_bucket(worker, bucket).await {
            Ok(results) => results,
            Err(e) => {
                error!("Bucket {} execution error: {:#}", worker, e);
                Vec::new()
            }
        };

        // One result per scheduled test: drop strays, fill in what's missing.
        let scheduled: HashSet<&TestCase> = bucket.iter().collect();
        let mut reported = HashSet::new();
        results.retain(|r| scheduled.contains(&r.test_case) && reported.insert(r.test_case.clone()));
        for test in bucket {
            if !reported.contains(test) {
                results.push(CompletedTestResult::new(test.clone(), TestOutcome::NotRun));
            }
        }

        self.persist(&results).await;
        self.record_actual(&results);
        results
    }

    /// Updates the store on the blocking pool so other buckets keep being
    /// polled while sidecar files are written.
    async fn persist(&self, results: &[CompletedTestResult]) {
        let store = Arc::clone(&self.store);
        let results = results.to_vec();
        match tokio::task::spawn_blocking(move || store.update(&results)).await {
            Ok(Ok(written)) => debug!("Updated {} duration files", written),
            Ok(Err(e)) => warn!("Failed to persist test durations: {}", e),
            Err(e) => warn!("Duration store update did not complete: {}", e),
        }
    }
}
