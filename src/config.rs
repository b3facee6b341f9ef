//! Configuration loading and schema definitions for testsplit.
//!
//! This module provides types and functions for loading testsplit
//! configuration from TOML files or strings. The schema covers scheduling,
//! duration persistence and accuracy diagnostics.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads testsplit configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use testsplit::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("testsplit.toml"))?;
/// println!("Max workers: {}", config.scheduling.max_workers);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads testsplit configuration from a TOML string.
///
/// # Example
///
/// ```
/// use testsplit::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [scheduling]
///     max_workers = 4
///     strategy = "count"
/// "#)?;
///
/// assert_eq!(config.scheduling.max_workers, 4);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

/// Loads configuration from `path` if it exists, otherwise returns defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(
            "No config file at {}, using defaults",
            path.display()
        );
        Ok(Config::default())
    }
}
