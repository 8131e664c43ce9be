//! rfdash - Robot Framework results dashboard
//!
//! A CLI tool that runs Robot Framework suites and turns the produced
//! output.xml into pass/fail statistics, trends and failure rankings.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, missing runner, unreadable results, etc.)
//!   2 - Failures found and --fail-on-failure set

mod analysis;
mod cli;
mod config;
mod error;
mod loader;
mod models;
mod parser;
mod report;
mod runner;
mod scanner;

use anyhow::{bail, Context, Result};
use cli::{Args, Command};
use config::{Config, ReportFormat, CONFIG_FILE_NAME};
use loader::{DashboardLoader, LoaderConfig, RefreshOutcome};
use report::ReportMetadata;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // Load configuration before logging so general.verbose applies
    let (config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&args, &config);

    info!("rfdash v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    source.log();

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .rfdash.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize directories, runner and dashboard settings.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Dispatch the selected command. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    config.validate().context("Invalid configuration")?;
    debug!("Effective config: {:?}", config);

    match &args.command {
        Command::List { .. } => handle_list(&config),
        Command::Run { tests, .. } => handle_run(&config, tests.as_deref(), args.quiet).await,
        Command::Stats {
            output,
            fail_on_failure,
            ..
        } => handle_stats(&config, output.as_ref(), *fail_on_failure),
        Command::Watch { .. } => handle_watch(&config).await,
        Command::Export { .. } => handle_export(&config),
        Command::Clean => handle_clean(&config),
        Command::InitConfig => handle_init_config().map(|_| 0),
    }
}

/// Print the suite files of the test directory.
fn handle_list(config: &Config) -> Result<i32> {
    let test_dir = test_dir(config)?;
    let files = scanner::SuiteScanner::new(test_dir.clone()).scan()?;

    if files.is_empty() {
        println!("❌ No .robot files found in {}", test_dir.display());
        return Ok(1);
    }

    println!("📂 {}\n", test_dir.display());
    for file in &files {
        println!("   📄 {} ({} bytes)", file.name, file.size);
    }
    println!("\n   Total: {} suites", files.len());
    Ok(0)
}

/// Run the selected suites, then summarize the produced report.
async fn handle_run(config: &Config, tests: Option<&[String]>, quiet: bool) -> Result<i32> {
    let test_dir = test_dir(config)?;
    let suites = scanner::SuiteScanner::new(test_dir.clone()).select(tests)?;

    if suites.is_empty() {
        bail!("No .robot files found in {}", test_dir.display());
    }

    let results_dir = runner::absolute(&config.general.results_dir)?;
    std::fs::create_dir_all(&results_dir)
        .with_context(|| format!("Failed to create {}", results_dir.display()))?;

    let plan = runner::RunPlan::new(&config.runner, &test_dir, &results_dir, &suites);

    println!("🤖 Running {} suite(s)", suites.len());
    println!("   Command: {}", plan.display());
    println!("   Results: {}\n", results_dir.display());

    let outcome = runner::execute(&plan, !quiet).await?;
    if !outcome.stdout.is_empty() {
        debug!("Runner output:\n{}", outcome.stdout);
    }
    if !outcome.stderr.is_empty() {
        debug!("Runner errors:\n{}", outcome.stderr);
    }

    if !config.dashboard.auto_refresh {
        println!("✅ Run finished in {:.1}s", outcome.duration_seconds);
        return Ok(0);
    }

    let loader = DashboardLoader::new(LoaderConfig {
        results_dir,
        ..LoaderConfig::from(config)
    });
    let stats = match loader.refresh(true) {
        RefreshOutcome::Loaded(stats) => stats,
        _ => bail!("Results could not be loaded after the run"),
    };

    if stats.is_empty() {
        warn!("The runner produced no results (exit code {:?})", outcome.exit_code);
        eprintln!("{}", outcome.stderr.trim());
        return Ok(1);
    }

    let marker = if stats.failed_count > 0 { "❌" } else { "✅" };
    println!(
        "{} {} ({:.1}s)",
        marker,
        report::summary_line(&stats),
        outcome.duration_seconds
    );
    Ok(0)
}

/// Print the dashboard for the current results.
fn handle_stats(config: &Config, output: Option<&PathBuf>, fail_on_failure: bool) -> Result<i32> {
    let loader = DashboardLoader::new(LoaderConfig::from(config));
    let stats = match loader.refresh(true) {
        RefreshOutcome::Loaded(stats) => stats,
        _ => bail!("Results could not be loaded"),
    };

    let metadata = ReportMetadata::new(
        config.general.results_dir.clone(),
        config.general.report_file.clone(),
    );
    let content = match config.report.format {
        ReportFormat::Json => report::generate_json_report(&stats, &metadata)?,
        ReportFormat::Markdown => report::generate_markdown_report(&stats, &metadata),
    };

    match output {
        Some(path) => {
            std::fs::write(path, &content)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✅ Report saved to: {}", path.display());
        }
        None => println!("{}", content),
    }

    if fail_on_failure && stats.failed_count > 0 {
        eprintln!(
            "\n⛔ {} failed test(s). Failing (exit code 2).",
            stats.failed_count
        );
        return Ok(2);
    }

    Ok(0)
}

/// Poll the report and print a summary whenever it changes.
async fn handle_watch(config: &Config) -> Result<i32> {
    let loader = Arc::new(DashboardLoader::new(LoaderConfig::from(config)));
    let mut updates = loader.subscribe();

    println!(
        "👀 Watching {} (every {}s, Ctrl+C to stop)",
        config.report_path().display(),
        config.dashboard.refresh_interval_secs
    );

    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(stats) if stats.is_empty() => println!("   No results yet"),
                Ok(stats) => println!("   {}", report::summary_line(&stats)),
                Err(RecvError::Lagged(missed)) => debug!("Missed {} snapshot(s)", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.dashboard.refresh_interval_secs));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if loader.is_loading() {
                    debug!("Previous refresh still running");
                    continue;
                }
                let worker = Arc::clone(&loader);
                match tokio::task::spawn_blocking(move || worker.refresh(false)).await {
                    Ok(RefreshOutcome::Busy) => debug!("Previous refresh still running"),
                    Ok(_) => {}
                    Err(e) => warn!("Refresh task failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n👋 Stopped watching");
                break;
            }
        }
    }

    drop(loader);
    let _ = printer.await;
    Ok(0)
}

/// Export every record of the current report.
fn handle_export(config: &Config) -> Result<i32> {
    let loader = DashboardLoader::new(LoaderConfig::from(config));
    let parsed = loader
        .load_parsed()
        .context("Run tests first to generate the report")?;

    if parsed.skipped > 0 {
        warn!("Skipped {} malformed test record(s)", parsed.skipped);
    }

    let (summary, _) = analysis::summary_counts(&parsed);
    let metadata = ReportMetadata::new(
        config.general.results_dir.clone(),
        config.general.report_file.clone(),
    );
    let doc = report::ExportDocument {
        metadata: &metadata,
        summary,
        records: &parsed.records,
    };

    let content = report::render_export(&doc, config.report.format)?;
    report::write_export(&config.report.output, &content)?;

    println!(
        "✅ Exported {} record(s) to: {}",
        parsed.records.len(),
        config.report.output.display()
    );
    Ok(0)
}

/// Empty the results directory.
fn handle_clean(config: &Config) -> Result<i32> {
    let dir = &config.general.results_dir;
    match runner::clean_results_dir(dir)? {
        Some(removed) => {
            println!(
                "🧹 The results folder has been emptied ({} entries removed)",
                removed
            );
            Ok(0)
        }
        None => {
            println!("❌ No results folder found at {}", dir.display());
            Ok(1)
        }
    }
}

fn test_dir(config: &Config) -> Result<PathBuf> {
    match &config.general.test_dir {
        Some(dir) => Ok(dir.clone()),
        None => bail!("No test directory given. Pass one or set general.test_dir in {}", CONFIG_FILE_NAME),
    }
}

/// Where the configuration came from, logged once logging is up.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    Builtin,
    Unreadable(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE_NAME),
            ConfigSource::Builtin => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults, then apply CLI arguments.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    let (mut config, source) = if let Some(ref config_path) = args.config {
        // An explicit path must load
        (
            Config::load(config_path)?,
            ConfigSource::Explicit(config_path.clone()),
        )
    } else {
        match Config::load_default() {
            Ok(Some(config)) => (config, ConfigSource::DefaultFile),
            Ok(None) => (Config::default(), ConfigSource::Builtin),
            Err(e) => (Config::default(), ConfigSource::Unreadable(e)),
        }
    };

    config.merge_with_args(args);
    Ok((config, source))
}
