//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.rfdash.toml` files.

use crate::analysis::{
    TrendBase, DEFAULT_HISTOGRAM_BINS, DEFAULT_RECENT_WINDOW, DEFAULT_TOP_MESSAGES,
    DEFAULT_TOP_TESTS,
};
use crate::cli::{Args, Command};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".rfdash.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Test runner settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Dashboard aggregation settings.
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory the runner writes results into and the dashboard reads from.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Report file name inside the results directory.
    #[serde(default = "default_report_file")]
    pub report_file: String,

    /// Default directory holding `.robot` files.
    #[serde(default)]
    pub test_dir: Option<PathBuf>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            report_file: default_report_file(),
            test_dir: None,
            verbose: false,
        }
    }
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("Results")
}

fn default_report_file() -> String {
    "output.xml".to_string()
}

/// Robot Framework runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Parallel processes; 1 runs `robot`, more runs `pabot`.
    #[serde(default = "default_processes")]
    pub processes: usize,

    /// Serial runner executable.
    #[serde(default = "default_robot_command")]
    pub robot_command: String,

    /// Parallel runner executable.
    #[serde(default = "default_pabot_command")]
    pub pabot_command: String,

    /// Title of the generated HTML report.
    #[serde(default = "default_report_title")]
    pub report_title: String,

    /// Title of the generated HTML log.
    #[serde(default = "default_log_title")]
    pub log_title: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            processes: default_processes(),
            robot_command: default_robot_command(),
            pabot_command: default_pabot_command(),
            report_title: default_report_title(),
            log_title: default_log_title(),
        }
    }
}

fn default_processes() -> usize {
    2
}

fn default_robot_command() -> String {
    "robot".to_string()
}

fn default_pabot_command() -> String {
    "pabot".to_string()
}

fn default_report_title() -> String {
    "AUTOS TESTS - REPORT".to_string()
}

fn default_log_title() -> String {
    "AUTOS TESTS - LOG".to_string()
}

/// Dashboard aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Deduplicated runs shown in the recent runs table.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,

    /// Entries in the top failure messages list.
    #[serde(default = "default_top_messages")]
    pub top_messages: usize,

    /// Entries in the top failing tests list.
    #[serde(default = "default_top_tests")]
    pub top_tests: usize,

    /// Buckets in the duration histogram.
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,

    /// Records grouped into the daily trend.
    #[serde(default)]
    pub trend_base: TrendBase,

    /// Refresh automatically after a run and while watching.
    #[serde(default = "default_true")]
    pub auto_refresh: bool,

    /// Poll interval of `watch`, in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            recent_window: default_recent_window(),
            top_messages: default_top_messages(),
            top_tests: default_top_tests(),
            histogram_bins: default_histogram_bins(),
            trend_base: TrendBase::default(),
            auto_refresh: true,
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

fn default_recent_window() -> usize {
    DEFAULT_RECENT_WINDOW
}

fn default_top_messages() -> usize {
    DEFAULT_TOP_MESSAGES
}

fn default_top_tests() -> usize {
    DEFAULT_TOP_TESTS
}

fn default_histogram_bins() -> usize {
    DEFAULT_HISTOGRAM_BINS
}

fn default_true() -> bool {
    true
}

fn default_refresh_interval() -> u64 {
    5
}

const MAX_PROCESSES: u64 = 256;
const MAX_LIST_LEN: u64 = 1000;
const MAX_HISTOGRAM_BINS: u64 = 200;
const MAX_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;

fn check_range(key: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 || value > max {
        bail!("{} must be between 1 and {}, got {}", key, max, value);
    }
    Ok(())
}

/// Output format of rendered reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Default output format.
    #[serde(default)]
    pub format: ReportFormat,

    /// Default export file path.
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::default(),
            output: default_output(),
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("rfdash_report.md")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref results_dir) = args.results_dir {
            self.general.results_dir = results_dir.clone();
        }

        if args.verbose {
            self.general.verbose = true;
        }

        match &args.command {
            Command::Run {
                dir, processes, ..
            } => {
                if let Some(dir) = dir {
                    self.general.test_dir = Some(dir.clone());
                }
                if let Some(processes) = processes {
                    self.runner.processes = *processes;
                }
            }
            Command::Stats {
                format,
                trend_base,
                window,
                ..
            } => {
                if let Some(format) = format {
                    self.report.format = *format;
                }
                if let Some(trend_base) = trend_base {
                    self.dashboard.trend_base = *trend_base;
                }
                if let Some(window) = window {
                    self.dashboard.recent_window = *window;
                }
            }
            Command::Watch { interval } => {
                if let Some(interval) = interval {
                    self.dashboard.refresh_interval_secs = *interval;
                }
            }
            Command::Export { format, output } => {
                if let Some(format) = format {
                    self.report.format = *format;
                }
                if let Some(output) = output {
                    self.report.output = output.clone();
                }
            }
            Command::List { dir } => {
                if let Some(dir) = dir {
                    self.general.test_dir = Some(dir.clone());
                }
            }
            Command::Clean | Command::InitConfig => {}
        }
    }

    /// Reject values the commands cannot work with.
    ///
    /// Runs after CLI arguments were merged, so it covers both sources.
    pub fn validate(&self) -> Result<()> {
        if self.general.report_file.trim().is_empty() {
            bail!("general.report_file must not be empty");
        }

        check_range("runner.processes", self.runner.processes as u64, MAX_PROCESSES)?;
        check_range("dashboard.recent_window", self.dashboard.recent_window as u64, MAX_LIST_LEN)?;
        check_range("dashboard.top_messages", self.dashboard.top_messages as u64, MAX_LIST_LEN)?;
        check_range("dashboard.top_tests", self.dashboard.top_tests as u64, MAX_LIST_LEN)?;
        check_range("dashboard.histogram_bins", self.dashboard.histogram_bins as u64, MAX_HISTOGRAM_BINS)?;
        check_range(
            "dashboard.refresh_interval_secs",
            self.dashboard.refresh_interval_secs,
            MAX_REFRESH_INTERVAL_SECS,
        )?;

        Ok(())
    }

    /// Location of the report document under the results directory.
    pub fn report_path(&self) -> PathBuf {
        self.general.results_dir.join(&self.general.report_file)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.report_file, "output.xml");
        assert_eq!(config.runner.processes, 2);
        assert_eq!(config.dashboard.recent_window, 10);
        assert_eq!(config.dashboard.top_messages, 5);
        assert_eq!(config.dashboard.top_tests, 10);
        assert_eq!(config.dashboard.trend_base, TrendBase::All);
        assert_eq!(config.report_path(), PathBuf::from("Results/output.xml"));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
results_dir = "out/results"
test_dir = "suites"

[runner]
processes = 4
report_title = "Nightly"

[dashboard]
recent_window = 5
trend_base = "recent"

[report]
format = "json"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.results_dir, PathBuf::from("out/results"));
        assert_eq!(config.general.test_dir, Some(PathBuf::from("suites")));
        assert_eq!(config.runner.processes, 4);
        assert_eq!(config.runner.report_title, "Nightly");
        assert_eq!(config.runner.robot_command, "robot");
        assert_eq!(config.dashboard.recent_window, 5);
        assert_eq!(config.dashboard.trend_base, TrendBase::Recent);
        assert_eq!(config.dashboard.top_tests, 10);
        assert_eq!(config.report.format, ReportFormat::Json);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[runner]"));
        assert!(toml_str.contains("[dashboard]"));
        assert!(toml_str.contains("[report]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.dashboard.refresh_interval_secs, 5);
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::parse_from([
            "rfdash",
            "--results-dir",
            "custom",
            "stats",
            "--format",
            "json",
            "--window",
            "3",
        ]);
        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.general.results_dir, PathBuf::from("custom"));
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.dashboard.recent_window, 3);
        assert_eq!(config.runner.processes, 2);
    }

    #[test]
    fn test_validate_defaults() {
        assert!(Config::default().validate().is_ok());
        let reparsed: Config = toml::from_str(&Config::default_toml()).unwrap();
        assert!(reparsed.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval_from_file() {
        let config: Config = toml::from_str("[dashboard]\nrefresh_interval_secs = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dashboard.refresh_interval_secs"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        for content in [
            "[runner]\nprocesses = 0",
            "[runner]\nprocesses = 100000",
            "[dashboard]\nrecent_window = 0",
            "[dashboard]\ntop_messages = 0",
            "[dashboard]\ntop_tests = 5000",
            "[dashboard]\nhistogram_bins = 0",
            "[dashboard]\nhistogram_bins = 1000000000",
            "[dashboard]\nrefresh_interval_secs = 1000000",
            "[general]\nreport_file = \"  \"",
        ] {
            let config: Config = toml::from_str(content).unwrap();
            assert!(config.validate().is_err(), "accepted: {}", content);
        }
    }

    #[test]
    fn test_validate_covers_merged_flags() {
        let args = Args::parse_from(["rfdash", "stats", "--window", "5000"]);
        let mut config = Config::default();
        config.merge_with_args(&args);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_verbose_from_file_survives_merge() {
        let mut config: Config = toml::from_str("[general]\nverbose = true").unwrap();
        let args = Args::parse_from(["rfdash", "stats"]);
        config.merge_with_args(&args);

        assert!(config.general.verbose);
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);
    }

    #[test]
    fn test_merge_keeps_file_values_without_flags() {
        let args = Args::parse_from(["rfdash", "run", "--processes", "1"]);
        let mut config = Config::default();
        config.general.test_dir = Some(PathBuf::from("suites"));
        config.merge_with_args(&args);

        assert_eq!(config.general.test_dir, Some(PathBuf::from("suites")));
        assert_eq!(config.runner.processes, 1);
    }
}
