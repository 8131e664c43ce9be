//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::TrendBase;
use crate::config::ReportFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rfdash - Robot Framework results dashboard
///
/// Discover and run `.robot` suites, then turn the produced output.xml
/// into pass/fail statistics, trends and failure rankings.
///
/// Examples:
///   rfdash list ./tests
///   rfdash run ./tests --processes 4
///   rfdash stats --results-dir ./Results --format json
///   rfdash watch --interval 10
///   rfdash export -o results.json --format json
///   rfdash init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .rfdash.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the runner's results (output.xml)
    #[arg(
        short,
        long,
        value_name = "DIR",
        global = true,
        env = "RFDASH_RESULTS_DIR"
    )]
    pub results_dir: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the .robot files of a test directory
    List {
        /// Directory to search (defaults to general.test_dir)
        dir: Option<PathBuf>,
    },

    /// Run test suites with robot (1 process) or pabot (several)
    Run {
        /// Directory holding the .robot files (defaults to general.test_dir)
        dir: Option<PathBuf>,

        /// Suites to run (comma-separated file names); all when omitted
        ///
        /// Example: --tests login.robot,checkout.robot
        #[arg(long, value_name = "FILES", value_delimiter = ',')]
        tests: Option<Vec<String>>,

        /// Number of parallel processes
        #[arg(short = 'n', long, value_name = "NUM")]
        processes: Option<usize>,
    },

    /// Print dashboard statistics for the current results
    Stats {
        /// Output format (markdown, json)
        #[arg(long, value_name = "FORMAT")]
        format: Option<ReportFormat>,

        /// Write the report to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Records grouped into the daily trend (all, recent)
        #[arg(long, value_name = "BASE")]
        trend_base: Option<TrendBase>,

        /// Number of recent runs to show
        #[arg(long, value_name = "COUNT")]
        window: Option<usize>,

        /// Exit with code 2 when the results contain failures
        ///
        /// Useful for CI pipelines.
        #[arg(long)]
        fail_on_failure: bool,
    },

    /// Re-read the results whenever output.xml changes
    Watch {
        /// Poll interval in seconds
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },

    /// Export every parsed test record with the summary
    Export {
        /// Output file path (defaults to report.output)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format (markdown, json)
        #[arg(long, value_name = "FORMAT")]
        format: Option<ReportFormat>,
    },

    /// Delete everything inside the results directory
    Clean,

    /// Generate a default .rfdash.toml configuration file
    InitConfig,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::Run { dir, processes, .. } => {
                if *processes == Some(0) {
                    return Err("Processes must be at least 1".to_string());
                }
                if let Some(dir) = dir {
                    if !dir.is_dir() {
                        return Err(format!("Test directory does not exist: {}", dir.display()));
                    }
                }
            }
            Command::List { dir: Some(dir) } => {
                if !dir.is_dir() {
                    return Err(format!("Test directory does not exist: {}", dir.display()));
                }
            }
            Command::Stats { window, .. } => {
                if *window == Some(0) {
                    return Err("Window must be at least 1".to_string());
                }
            }
            Command::Watch { interval } => {
                if *interval == Some(0) {
                    return Err("Interval must be at least 1 second".to_string());
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `general.verbose` from the configuration file;
    /// `--quiet` still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let args = Args::parse_from([
            "rfdash",
            "run",
            "--tests",
            "a.robot,b.robot",
            "-n",
            "3",
        ]);
        match args.command {
            Command::Run {
                dir,
                tests,
                processes,
            } => {
                assert!(dir.is_none());
                assert_eq!(
                    tests,
                    Some(vec!["a.robot".to_string(), "b.robot".to_string()])
                );
                assert_eq!(processes, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["rfdash", "stats", "--results-dir", "out", "-v"]);
        assert_eq!(args.results_dir, Some(PathBuf::from("out")));
        assert!(args.verbose);
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = Args::parse_from(["rfdash", "stats", "--verbose", "--quiet"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_values() {
        assert!(Args::parse_from(["rfdash", "run", "-n", "0"]).validate().is_err());
        assert!(Args::parse_from(["rfdash", "watch", "--interval", "0"])
            .validate()
            .is_err());
        assert!(Args::parse_from(["rfdash", "stats", "--window", "0"])
            .validate()
            .is_err());
        assert!(Args::parse_from(["rfdash", "stats"]).validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = Args::parse_from(["rfdash", "clean"]);
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
