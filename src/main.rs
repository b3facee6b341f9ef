//! testsplit CLI - Duration-aware test scheduling.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use testsplit::config::{self, Config};
use testsplit::durations::DurationStore;
use testsplit::model::{CompletedTestResult, TestCase};
use testsplit::scheduler::{Scheduler, SplitStrategy};

#[derive(Parser)]
#[command(name = "testsplit")]
#[command(about = "Duration-aware scheduling of tests across parallel workers", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults apply if it doesn't exist)
    #[arg(short, long, default_value = "testsplit.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split tests into buckets, one per worker
    Plan {
        /// JSON file with the tests to schedule: [{"name": ..., "executable": ...}]
        #[arg(short, long)]
        tests: PathBuf,

        /// Override maximum number of workers (0 = available CPUs)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Override splitting strategy
        #[arg(short, long, value_enum)]
        strategy: Option<SplitStrategy>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Persist measured durations from completed test results
    Record {
        /// JSON file with completed results:
        /// [{"name": ..., "executable": ..., "outcome": ..., "duration_ms": ...}]
        #[arg(short, long)]
        results: PathBuf,
    },

    /// Show the recorded durations of a test executable
    Show {
        /// Path of the test executable
        executable: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Plan {
            tests,
            workers,
            strategy,
            format,
        } => plan_tests(&cli.config, &tests, workers, strategy, format),
        Commands::Record { results } => record_results(&cli.config, &results),
        Commands::Show { executable } => show_record(&cli.config, &executable),
        Commands::Validate => validate_config(&cli.config),
        Commands::Init { force } => init_config(&cli.config, force),
    }
}

fn load_config(config_path: &Path) -> Result<Config> {
    config::load_config_or_default(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn plan_tests(
    config_path: &Path,
    tests_path: &Path,
    workers_override: Option<usize>,
    strategy_override: Option<SplitStrategy>,
    format: OutputFormat,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    // Apply overrides
    if let Some(workers) = workers_override {
        config.scheduling.max_workers = workers;
    }
    if let Some(strategy) = strategy_override {
        config.scheduling.strategy = strategy;
    }

    let tests: Vec<TestCase> = read_json(tests_path)?;
    info!("Loaded {} tests from {}", tests.len(), tests_path.display());

    let store = DurationStore::from_config(&config.durations);
    let durations = store.load(&tests);
    let scheduler = Scheduler::from_config(&config.scheduling);
    let buckets = scheduler.schedule(&tests, &durations);

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&buckets)?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            println!(
                "Scheduled {} tests into {} buckets ({} with known duration):",
                buckets.iter().map(|b| b.len()).sum::<usize>(),
                buckets.len(),
                durations.len()
            );
            for (worker, bucket) in buckets.iter().enumerate() {
                println!(
                    "  Bucket {} ({} tests, {}ms):",
                    worker,
                    bucket.len(),
                    bucket.duration()
                );
                for test in bucket {
                    println!("    {}", test);
                }
            }
        }
    }

    Ok(())
}

fn record_results(config_path: &Path, results_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    let results: Vec<CompletedTestResult> = read_json(results_path)?;
    let store = DurationStore::from_config(&config.durations);
    let written = store
        .update(&results)
        .context("Failed to record test durations")?;

    println!(
        "Recorded durations of {} results into {} duration files",
        results.iter().filter(|r| r.outcome.has_duration()).count(),
        written
    );
    Ok(())
}

fn show_record(config_path: &Path, executable: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = DurationStore::from_config(&config.durations);

    let Some(record) = store.read_record(executable)? else {
        anyhow::bail!(
            "No recorded durations for {} (looked for {})",
            executable.display(),
            store.durations_file(executable).display()
        );
    };

    println!("Executable: {}", record.executable.display());
    if let Some(updated_at) = &record.updated_at {
        println!("Updated: {}", updated_at);
    }
    println!("{} tests:", record.len());

    let mut entries: Vec<_> = record.test_durations.iter().collect();
    entries.sort_by(|a, b| b.duration.cmp(&a.duration).then_with(|| a.test.cmp(&b.test)));
    for entry in entries {
        println!("  {:>8}ms  {}", entry.duration, entry.test);
    }

    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    match config::load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            let workers = Scheduler::from_config(&config.scheduling).max_workers();
            println!(
                "  Max workers: {} (effective {})",
                config.scheduling.max_workers, workers
            );
            println!("  Strategy: {:?}", config.scheduling.strategy);
            println!("  Duration file extension: {}", config.durations.extension);
            println!("  Duration file format: {:?}", config.durations.format);
            println!(
                "  Diagnostics: {} (worst {})",
                if config.diagnostics.enabled {
                    "enabled"
                } else {
                    "disabled"
                },
                config.diagnostics.worst_count
            );

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

const CONFIG_TEMPLATE: &str = r#"# testsplit configuration file

[scheduling]
# Maximum number of parallel workers, 0 = one per available CPU
max_workers = 0
# auto: by duration if every test has a recorded duration, by count otherwise
# count: round-robin, duration: balance by recorded durations
strategy = "auto"

[durations]
# Duration files are stored next to each test executable as <executable><extension>
extension = ".gta_durations"
# json, or xml to read and write files of older installations
format = "json"

[diagnostics]
enabled = true
worst_count = 10
"#;

fn init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        eprintln!(
            "{} already exists. Use --force to overwrite it or edit it manually.",
            config_path.display()
        );
        std::process::exit(1);
    }

    std::fs::write(config_path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created {}", config_path.display());
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  testsplit plan --tests tests.json");

    Ok(())
}
