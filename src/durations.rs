//! Persistent per-test duration history.
//!
//! Durations are stored in a sidecar file next to each test executable
//! (`{executable}{extension}`, by default `tests.exe.gta_durations`). Each file
//! holds the last observed duration of every test of that executable, see
//! [`DurationRecord`].
//!
//! # Concurrency
//!
//! Workers finishing at different times call [`DurationStore::update`]
//! concurrently. Updates are read-modify-write of a whole file, so every
//! sidecar path has its own lock: writers of the same executable are
//! serialized, unrelated executables proceed in parallel. Files are replaced
//! atomically through a temporary file in the same directory.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use testsplit::durations::DurationStore;
//! use testsplit::model::{CompletedTestResult, TestCase, TestOutcome};
//!
//! let store = DurationStore::new();
//! let test = TestCase::new("Suite.Test", "/build/tests");
//!
//! store.update(&[CompletedTestResult::new(test.clone(), TestOutcome::Passed)
//!     .with_duration(Duration::from_millis(12))])?;
//!
//! let durations = store.load([&test]);
//! assert_eq!(durations[&test], 12);
//! # Ok::<(), testsplit::durations::StoreError>(())
//! ```

pub mod record;

pub use record::{DurationRecord, RecordError, RecordFormat, TestDuration};

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::config::DurationsConfig;
use crate::model::{CompletedTestResult, DurationMap, TestCase};

/// Result type for duration store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the duration store.
///
/// A missing sidecar file is never an error; it simply means there is no
/// history for that executable yet.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing a sidecar file failed.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A sidecar file exists but does not contain a valid record.
    #[error("Invalid duration record {}: {source}", .path.display())]
    InvalidRecord {
        path: PathBuf,
        #[source]
        source: RecordError,
    },

    /// A record could not be serialized before writing it.
    #[error("Failed to encode duration record {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: RecordError,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and writes per-executable duration records.
///
/// Sidecar files and their locks are keyed by the canonical executable
/// path, so different spellings of the same binary share one record.
#[derive(Debug)]
pub struct DurationStore {
    extension: String,
    format: RecordFormat,
    /// Only holds locks of sidecars currently in use.
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Default for DurationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurationStore {
    /// Creates a store using JSON records and the default extension.
    pub fn new() -> Self {
        Self::from_config(&DurationsConfig::default())
    }

    /// Creates a store from the `[durations]` configuration section.
    pub fn from_config(config: &DurationsConfig) -> Self {
        Self {
            extension: config.extension.clone(),
            format: config.format,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the sidecar file holding the durations of `executable`.
    ///
    /// ```
    /// use std::path::Path;
    /// use testsplit::durations::DurationStore;
    ///
    /// let store = DurationStore::new();
    /// assert_eq!(
    ///     store.durations_file(Path::new("/build/tests")),
    ///     Path::new("/build/tests.gta_durations"),
    /// );
    /// ```
    pub fn durations_file(&self, executable: &Path) -> PathBuf {
        let mut file = OsString::from(executable.as_os_str());
        file.push(&self.extension);
        PathBuf::from(file)
    }

    /// Loads the known durations of the given tests.
    ///
    /// Tests are grouped by executable and each executable's record is read
    /// once. Only tests present both in the input and in a record are
    /// returned; missing or unreadable records contribute nothing.
    pub fn load<'a>(&self, tests: impl IntoIterator<Item = &'a TestCase>) -> DurationMap {
        let mut durations = DurationMap::new();

        for (executable, tests) in group_by_executable(tests, |t| t) {
            let record = match self.read_record(executable) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!("No duration record for {}", executable.display());
                    continue;
                }
                Err(e) => {
                    warn!("Ignoring duration history: {}", e);
                    continue;
                }
            };

            let known = record.durations();
            for test in tests {
                if let Some(&duration) = known.get(test.name()) {
                    durations.insert(test.clone(), duration);
                }
            }
        }

        debug!("Loaded {} known test durations", durations.len());
        durations
    }

    /// Persists the durations of completed tests.
    ///
    /// Results are grouped by executable. For each executable the existing
    /// record is loaded (an unparsable one is replaced), every passed or
    /// failed result overwrites that test's duration, and the whole record is
    /// written back. Skipped and not-run results are ignored.
    ///
    /// # Returns
    ///
    /// The number of records written.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error hit while writing a record. Records of
    /// executables processed before the failure are already persisted.
    pub fn update(&self, results: &[CompletedTestResult]) -> StoreResult<usize> {
        let mut written = 0;

        for (executable, results) in group_by_executable(results, |r| &r.test_case) {
            let durations: Vec<(String, u64)> = results
                .iter()
                .filter(|r| r.outcome.has_duration())
                .map(|r| (r.test_case.name().to_string(), r.duration_ms()))
                .collect();

            if durations.is_empty() {
                continue;
            }

            self.update_executable(executable, durations)?;
            written += 1;
        }

        Ok(written)
    }

    /// Reads the record of `executable`, or `None` if there is none yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar file cannot be read or parsed.
    pub fn read_record(&self, executable: &Path) -> StoreResult<Option<DurationRecord>> {
        let path = self.durations_file(&canonical_path(executable));
        self.with_lock(&path, || self.read_file(&path))
    }

    fn update_executable(&self, executable: &Path, durations: Vec<(String, u64)>) -> StoreResult<()> {
        let executable = canonical_path(executable);
        let path = self.durations_file(&executable);
        self.with_lock(&path, || self.merge_into_file(&path, executable, durations))
    }

    fn merge_into_file(
        &self,
        path: &Path,
        executable: PathBuf,
        durations: Vec<(String, u64)>,
    ) -> StoreResult<()> {
        let mut record = match self.read_file(path) {
            Ok(Some(record)) => record,
            Ok(None) => DurationRecord::default(),
            Err(e @ StoreError::InvalidRecord { .. }) => {
                warn!("Replacing unreadable duration record: {}", e);
                DurationRecord::default()
            }
            Err(e) => return Err(e),
        };

        record.executable = executable;
        record.updated_at = Some(chrono::Utc::now().to_rfc3339());
        let count = durations.len();
        record.merge(durations);

        self.write_file(path, &record)?;
        debug!(
            "Updated {} durations in {} ({} tests total)",
            count,
            path.display(),
            record.len()
        );
        Ok(())
    }

    fn read_file(&self, path: &Path) -> StoreResult<Option<DurationRecord>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        self.format
            .decode(&contents)
            .map(Some)
            .map_err(|source| StoreError::InvalidRecord {
                path: path.to_path_buf(),
                source,
            })
    }

    fn write_file(&self, path: &Path, record: &DurationRecord) -> StoreResult<()> {
        let contents = self
            .format
            .encode(record)
            .map_err(|source| StoreError::Encode {
                path: path.to_path_buf(),
                source,
            })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(path, e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| StoreError::io(path, e))?;
        file.persist(path).map_err(|e| StoreError::io(path, e.error))?;

        Ok(())
    }

    /// Runs `f` while holding the lock of the sidecar at `path`.
    fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // Clones are only taken under the map lock, so a count of two (the
        // map and ours) means nobody else is waiting on this sidecar.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
        result
    }
}

/// Groups items by the executable of their test case, keeping first-seen order.
fn group_by_executable<'a, T>(
    items: impl IntoIterator<Item = &'a T>,
    test_case: impl Fn(&'a T) -> &'a TestCase,
) -> Vec<(&'a Path, Vec<&'a T>)>
where
    T: 'a,
{
    let mut index: HashMap<&'a Path, usize> = HashMap::new();
    let mut groups: Vec<(&'a Path, Vec<&'a T>)> = Vec::new();

    for item in items {
        let executable = test_case(item).executable();
        match index.get(executable) {
            Some(&pos) => groups[pos].1.push(item),
            None => {
                index.insert(executable, groups.len());
                groups.push((executable, vec![item]));
            }
        }
    }

    groups
}

/// Resolves symlinks and `..` of `executable`. If the executable doesn't
/// exist yet, its parent directory is resolved instead.
fn canonical_path(executable: &Path) -> PathBuf {
    if let Ok(path) = std::fs::canonicalize(executable) {
        return path;
    }
    if let (Some(parent), Some(name)) = (executable.parent(), executable.file_name())
        && let Ok(parent) = std::fs::canonicalize(if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        })
    {
        return parent.join(name);
    }
    std::path::absolute(executable).unwrap_or_else(|_| executable.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestOutcome;
    use std::time::Duration;
    use tempfile::TempDir;

    fn executable(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    fn result(name: &str, exe: &Path, outcome: TestOutcome, ms: u64) -> CompletedTestResult {
        CompletedTestResult::new(TestCase::new(name, exe), outcome)
            .with_duration(Duration::from_millis(ms))
    }

    #[test]
    fn test_load_without_record_is_empty() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        let store = DurationStore::new();

        let durations = store.load([&TestCase::new("TestSuite1.Test1", &exe)]);
        assert!(durations.is_empty());
        assert!(store.read_record(&exe).unwrap().is_none());
    }

    #[test]
    fn test_update_writes_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        let store = DurationStore::new();
        let results = vec![
            result("TestSuite1.Test1", &exe, TestOutcome::Passed, 3),
            result("TestSuite1.SkippedTest", &exe, TestOutcome::Skipped, 1),
        ];

        assert_eq!(store.update(&results).unwrap(), 1);
        assert!(store.durations_file(&exe).exists());

        let durations = store.load(results.iter().map(|r| &r.test_case));
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[&results[0].test_case], 3);
        assert!(!durations.contains_key(&results[1].test_case));
    }

    #[test]
    fn test_same_test_in_different_executables() {
        let dir = TempDir::new().unwrap();
        let exe1 = executable(&dir, "tests1");
        let exe2 = executable(&dir, "tests2");
        let store = DurationStore::new();
        let results = vec![
            result("TestSuite1.Test1", &exe1, TestOutcome::Passed, 3),
            result("TestSuite1.Test1", &exe2, TestOutcome::Failed, 4),
        ];

        assert_eq!(store.update(&results).unwrap(), 2);

        let durations = store.load(results.iter().map(|r| &r.test_case));
        assert_eq!(durations.len(), 2);
        assert_eq!(durations[&results[0].test_case], 3);
        assert_eq!(durations[&results[1].test_case], 4);
    }

    #[test]
    fn test_second_update_overwrites_single_test() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        let store = DurationStore::new();

        store
            .update(&[
                result("A", &exe, TestOutcome::Passed, 3),
                result("B", &exe, TestOutcome::Passed, 10),
            ])
            .unwrap();
        store
            .update(&[result("A", &exe, TestOutcome::Failed, 4)])
            .unwrap();

        let record = store.read_record(&exe).unwrap().unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("A"), Some(4));
        assert_eq!(record.get("B"), Some(10));
    }

    #[test]
    fn test_record_without_requested_test() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        let store = DurationStore::new();
        store
            .update(&[result("TestSuite1.Test1", &exe, TestOutcome::Passed, 3)])
            .unwrap();

        let durations = store.load([&TestCase::new("TestSuite1.Test2", &exe)]);
        assert!(durations.is_empty());
    }

    #[test]
    fn test_only_not_run_results_create_no_record() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        let store = DurationStore::new();

        let written = store
            .update(&[result("TestSuite1.Test1", &exe, TestOutcome::NotRun, 3)])
            .unwrap();

        assert_eq!(written, 0);
        assert!(!store.durations_file(&exe).exists());
    }

    #[test]
    fn test_sub_millisecond_duration_rounds_up() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        let store = DurationStore::new();
        let test = TestCase::new("Fast", &exe);

        store
            .update(&[CompletedTestResult::new(test.clone(), TestOutcome::Passed)
                .with_duration(Duration::from_micros(10))])
            .unwrap();

        assert_eq!(store.load([&test])[&test], 1);
    }

    #[test]
    fn test_corrupt_record_is_ignored_then_replaced() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        let store = DurationStore::new();
        std::fs::write(store.durations_file(&exe), "{ invalid json }").unwrap();

        let test = TestCase::new("A", &exe);
        assert!(store.load([&test]).is_empty());
        assert!(matches!(
            store.read_record(&exe),
            Err(StoreError::InvalidRecord { .. })
        ));

        store
            .update(&[result("A", &exe, TestOutcome::Passed, 5)])
            .unwrap();
        assert_eq!(store.load([&test])[&test], 5);
    }

    #[test]
    fn test_record_stores_canonical_executable() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        let store = DurationStore::new();
        store
            .update(&[result("A", &exe, TestOutcome::Passed, 5)])
            .unwrap();

        let record = store.read_record(&exe).unwrap().unwrap();
        assert_eq!(record.executable, std::fs::canonicalize(&exe).unwrap());
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn test_xml_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "Tests.exe");
        let store = DurationStore::from_config(&DurationsConfig {
            extension: ".gta.testdurations".to_string(),
            format: RecordFormat::Xml,
        });
        store
            .update(&[result("Suite.Test", &exe, TestOutcome::Passed, 42)])
            .unwrap();

        let file = dir.path().join("Tests.exe.gta.testdurations");
        let contents = std::fs::read_to_string(&file).unwrap();
        assert!(contents.contains(r#"Test="Suite.Test""#));

        let test = TestCase::new("Suite.Test", &exe);
        assert_eq!(store.load([&test])[&test], 42);
    }

    #[test]
    fn test_concurrent_updates_of_same_executable() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        let store = DurationStore::new();

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let store = &store;
                let exe = &exe;
                scope.spawn(move || {
                    let results: Vec<_> = (0..25)
                        .map(|i| {
                            let name = format!("Worker{}.Test{}", worker, i);
                            result(&name, exe, TestOutcome::Passed, i + 1)
                        })
                        .collect();
                    store.update(&results).unwrap();
                });
            }
        });

        let record = store.read_record(&exe).unwrap().unwrap();
        assert_eq!(record.len(), 200);
        assert_eq!(record.get("Worker7.Test24"), Some(25));
    }

    #[test]
    fn test_aliased_paths_share_one_record() {
        let dir = TempDir::new().unwrap();
        let exe = executable(&dir, "tests");
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let alias = dir.path().join("sub").join("..").join("tests");
        let store = DurationStore::new();

        for round in 0..50 {
            let first = format!("Round{}.First", round);
            let second = format!("Round{}.Second", round);
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    store
                        .update(&[result(&first, &exe, TestOutcome::Passed, 1)])
                        .unwrap()
                });
                scope.spawn(|| {
                    store
                        .update(&[result(&second, &alias, TestOutcome::Passed, 2)])
                        .unwrap()
                });
            });

            let record = store.read_record(&exe).unwrap().unwrap();
            assert_eq!(record.get(&first), Some(1), "round {}", round);
            assert_eq!(record.get(&second), Some(2), "round {}", round);
        }

        assert_eq!(canonical_path(&alias), canonical_path(&exe));
        let test = TestCase::new("Round0.First", &alias);
        assert_eq!(store.load([&test])[&test], 1);
    }

    #[test]
    fn test_locks_are_released_after_use() {
        let dir = TempDir::new().unwrap();
        let exe1 = executable(&dir, "tests1");
        let exe2 = executable(&dir, "tests2");
        let store = DurationStore::new();

        store
            .update(&[
                result("A", &exe1, TestOutcome::Passed, 1),
                result("A", &exe2, TestOutcome::Passed, 1),
            ])
            .unwrap();
        store.read_record(&exe1).unwrap();

        assert!(store.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_encode_error_message() {
        let err = StoreError::Encode {
            path: PathBuf::from("/build/tests.gta_durations"),
            source: RecordError::Encode("bad".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Failed to encode duration record /build/tests.gta_durations: failed to encode record: bad"
        );
    }

    #[test]
    fn test_group_by_executable_keeps_order() {
        let tests = [
            TestCase::new("a", "/x"),
            TestCase::new("b", "/y"),
            TestCase::new("c", "/x"),
        ];
        let groups = group_by_executable(&tests, |t| t);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, Path::new("/x"));
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, Path::new("/y"));
    }
}
