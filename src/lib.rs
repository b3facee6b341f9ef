//! testsplit: duration-aware scheduling of tests across parallel workers.
//!
//! This crate decides which tests each parallel worker runs. It remembers
//! how long every test took, uses that history to balance the next run, and
//! reports how well the history predicted reality.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Durations**: Per-executable duration history in sidecar files
//! - **Scheduler**: Count-based and duration-based splitting into buckets
//! - **Analysis**: Expected-vs-actual scheduling accuracy diagnostics
//! - **Orchestrator**: Plans a run, drives a [`BucketRunner`] per bucket and
//!   records the outcome
//!
//! Test discovery and process execution are left to the embedding
//! application.
//!
//! # Example
//!
//! ```no_run
//! use testsplit::config::load_config;
//! use testsplit::durations::DurationStore;
//! use testsplit::model::TestCase;
//! use testsplit::scheduler::Scheduler;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("testsplit.toml"))?;
//!     let tests = vec![TestCase::new("Suite.Test", "/build/tests")];
//!
//!     let durations = DurationStore::from_config(&config.durations).load(&tests);
//!     let buckets = Scheduler::from_config(&config.scheduling).schedule(&tests, &durations);
//!     // ... hand each bucket to a worker ...
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod durations;
pub mod model;
pub mod orchestrator;
pub mod scheduler;

// Re-export commonly used types
pub use analysis::{DiagnosticReport, SchedulingAnalyzer};
pub use config::{Config, load_config};
pub use durations::{DurationStore, StoreError};
pub use model::{CompletedTestResult, DurationMap, TestCase, TestOutcome};
pub use orchestrator::{BucketRunner, Orchestrator, RunResult};
pub use scheduler::{Bucket, Scheduler, SplitStrategy, TestsSplitter};
