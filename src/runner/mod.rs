//! Robot Framework runner invocation.
//!
//! One process runs `robot`; more run `pabot`. The command is executed in
//! the test directory and writes its results into the results directory.

use crate::config::RunnerConfig;
use crate::scanner::SuiteFile;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A fully resolved runner command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory of the runner.
    pub cwd: PathBuf,
}

impl RunPlan {
    /// Build the command for the selected suites.
    ///
    /// `results_dir` should be absolute since the command runs in `test_dir`.
    pub fn new(
        config: &RunnerConfig,
        test_dir: &Path,
        results_dir: &Path,
        suites: &[SuiteFile],
    ) -> Self {
        let results = results_dir.to_string_lossy().to_string();

        let (program, mut args) = if config.processes <= 1 {
            (
                config.robot_command.clone(),
                vec!["-d".to_string(), results],
            )
        } else {
            (
                config.pabot_command.clone(),
                vec![
                    "--processes".to_string(),
                    config.processes.to_string(),
                    "--outputdir".to_string(),
                    results,
                    "--reporttitle".to_string(),
                    config.report_title.clone(),
                    "--logtitle".to_string(),
                    config.log_title.clone(),
                ],
            )
        };

        args.extend(suites.iter().map(|s| s.path.to_string_lossy().to_string()));

        Self {
            program,
            args,
            cwd: test_dir.to_path_buf(),
        }
    }

    /// Human-readable command line.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push_str(&format!("\"{}\"", arg));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Result of a finished runner process.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
}

/// Execute the plan and wait for it.
///
/// A non-zero exit code is not an error: the runner exits with the number
/// of failed tests. Only a runner that cannot be started is.
pub async fn execute(plan: &RunPlan, show_progress: bool) -> Result<RunOutcome> {
    info!("Running: {}", plan.display());
    debug!("Working directory: {}", plan.cwd.display());

    let spinner = if show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Running {}...", plan.program));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let output = tokio::process::Command::new(&plan.program)
        .args(&plan.args)
        .current_dir(&plan.cwd)
        .output()
        .await;

    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    let output = output.with_context(|| {
        format!(
            "Failed to start '{}'. Is Robot Framework installed and on PATH?",
            plan.program
        )
    })?;

    let outcome = RunOutcome {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_seconds: start.elapsed().as_secs_f64(),
    };

    match outcome.exit_code {
        Some(0) => info!("Runner finished in {:.1}s", outcome.duration_seconds),
        Some(code) => info!(
            "Runner finished in {:.1}s with exit code {}",
            outcome.duration_seconds, code
        ),
        None => warn!("Runner terminated by a signal"),
    }

    Ok(outcome)
}

/// Make a path absolute against the current directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

/// Delete everything inside the results directory.
///
/// Returns the number of removed entries, or `None` when the directory
/// does not exist. The directory itself is kept.
pub fn clean_results_dir(dir: &Path) -> Result<Option<usize>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("Cannot read {}", dir.display()))? {
        let path = entry?.path();
        let file_type = fs::symlink_metadata(&path)?.file_type();

        let result = if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.with_context(|| format!("Deletion error: {}", path.display()))?;

        debug!("Removed {}", path.display());
        removed += 1;
    }

    Ok(Some(removed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suites(dir: &Path) -> Vec<SuiteFile> {
        ["a.robot", "b.robot"]
            .iter()
            .map(|name| SuiteFile {
                name: name.to_string(),
                path: dir.join(name),
                size: 0,
            })
            .collect()
    }

    #[test]
    fn test_single_process_uses_robot() {
        let config = RunnerConfig {
            processes: 1,
            ..Default::default()
        };
        let plan = RunPlan::new(
            &config,
            Path::new("/suites"),
            Path::new("/out"),
            &suites(Path::new("/suites")),
        );

        assert_eq!(plan.program, "robot");
        assert_eq!(
            plan.args,
            vec!["-d", "/out", "/suites/a.robot", "/suites/b.robot"]
        );
        assert_eq!(plan.cwd, PathBuf::from("/suites"));
    }

    #[test]
    fn test_several_processes_use_pabot() {
        let config = RunnerConfig {
            processes: 4,
            ..Default::default()
        };
        let plan = RunPlan::new(
            &config,
            Path::new("/suites"),
            Path::new("/out"),
            &suites(Path::new("/suites"))[..1],
        );

        assert_eq!(plan.program, "pabot");
        assert_eq!(
            plan.args,
            vec![
                "--processes",
                "4",
                "--outputdir",
                "/out",
                "--reporttitle",
                "AUTOS TESTS - REPORT",
                "--logtitle",
                "AUTOS TESTS - LOG",
                "/suites/a.robot",
            ]
        );
        assert!(plan.display().contains("\"AUTOS TESTS - LOG\""));
    }

    #[test]
    fn test_clean_results_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("output.xml"), "<robot/>").unwrap();
        fs::write(dir.path().join("log.html"), "").unwrap();
        fs::create_dir_all(dir.path().join("pabot_results").join("0")).unwrap();

        assert_eq!(clean_results_dir(dir.path()).unwrap(), Some(3));
        assert!(dir.path().is_dir());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        assert_eq!(clean_results_dir(&dir.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn test_absolute() {
        assert_eq!(absolute(Path::new("/out")).unwrap(), PathBuf::from("/out"));
        assert!(absolute(Path::new("Results")).unwrap().is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let plan = RunPlan {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo ran; exit 3".to_string()],
            cwd: dir.path().to_path_buf(),
        };

        let outcome = tokio_test::block_on(execute(&plan, false)).unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout.trim(), "ran");
    }

    #[test]
    fn test_execute_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let plan = RunPlan {
            program: "rfdash-no-such-runner".to_string(),
            args: Vec::new(),
            cwd: dir.path().to_path_buf(),
        };

        assert!(tokio_test::block_on(execute(&plan, false)).is_err());
    }
}
