//! Configuration schema definitions for testsplit.
//!
//! This module defines all configuration types that can be deserialized from
//! TOML configuration files. Every section and field has a default, so an
//! empty file (or no file at all) is a valid configuration.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── SchedulingConfig       - Worker count and splitting strategy
//! ├── DurationsConfig        - Sidecar file extension and record format
//! └── DiagnosticsConfig      - Scheduling accuracy report
//! ```

use serde::{Deserialize, Serialize};

use crate::durations::RecordFormat;
use crate::scheduler::SplitStrategy;

/// Root configuration structure for testsplit.
///
/// # TOML Structure
///
/// ```toml
/// [scheduling]
/// max_workers = 8
/// strategy = "auto"
///
/// [durations]
/// extension = ".gta_durations"
/// format = "json"
///
/// [diagnostics]
/// enabled = true
/// worst_count = 10
/// ```
///
/// # Example
///
/// ```
/// use testsplit::config::Config;
///
/// let config: Config = toml::from_str(r#"
///     [scheduling]
///     max_workers = 2
/// "#).unwrap();
///
/// assert_eq!(config.scheduling.max_workers, 2);
/// assert_eq!(config.diagnostics.worst_count, 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// How tests are partitioned across workers.
    #[serde(default)]
    pub scheduling: SchedulingConfig,

    /// Where and how duration history is persisted.
    #[serde(default)]
    pub durations: DurationsConfig,

    /// Scheduling accuracy diagnostics.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Scheduling settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `max_workers` | 0 (number of available CPUs) |
/// | `strategy` | `auto` |
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SchedulingConfig {
    /// Maximum number of parallel worker slots.
    ///
    /// `0` means one worker per available CPU.
    #[serde(default)]
    pub max_workers: usize,

    /// Splitting strategy: `auto`, `count` or `duration`.
    ///
    /// `auto` uses the duration-based splitter when every test has a known
    /// duration and the count-based splitter otherwise.
    #[serde(default)]
    pub strategy: SplitStrategy,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            strategy: SplitStrategy::Auto,
        }
    }
}

/// Duration store settings.
///
/// # Example
///
/// Reading files written by earlier installations:
///
/// ```toml
/// [durations]
/// extension = ".gta.testdurations"
/// format = "xml"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DurationsConfig {
    /// Suffix appended to the executable path to name its sidecar file.
    ///
    /// Default: `.gta_durations`
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Record encoding, `json` or `xml`.
    ///
    /// Default: `json`
    #[serde(default)]
    pub format: RecordFormat,
}

impl Default for DurationsConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            format: RecordFormat::default(),
        }
    }
}

fn default_extension() -> String {
    ".gta_durations".to_string()
}

/// Scheduling accuracy diagnostics settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    /// Log the expected-vs-actual report after each run.
    ///
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of worst predictions listed in the report.
    ///
    /// Default: 10
    #[serde(default = "default_worst_count")]
    pub worst_count: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worst_count: default_worst_count(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_worst_count() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.durations.extension, ".gta_durations");
        assert_eq!(config.durations.format, RecordFormat::Json);
        assert_eq!(config.scheduling.strategy, SplitStrategy::Auto);
        assert!(config.diagnostics.enabled);
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
            [scheduling]
            max_workers = 3
            strategy = "duration"

            [durations]
            extension = ".gta.testdurations"
            format = "xml"

            [diagnostics]
            enabled = false
            worst_count = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduling.max_workers, 3);
        assert_eq!(config.scheduling.strategy, SplitStrategy::Duration);
        assert_eq!(config.durations.format, RecordFormat::Xml);
        assert!(!config.diagnostics.enabled);
        assert_eq!(config.diagnostics.worst_count, 5);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [scheduling]
            strategy = "random"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serializes_back() {
        let text = toml::to_string(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
