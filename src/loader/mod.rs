//! Dashboard data loading.
//!
//! [`DashboardLoader`] locates the report of a results directory, parses it,
//! aggregates it and publishes the snapshot. It skips work when the report
//! has not changed since the last successful pass and runs at most one pass
//! at a time.

use crate::analysis::{aggregate, AggregateOptions};
use crate::error::ReportError;
use crate::models::{AggregateStatistics, TestCaseResult};
use crate::parser::{locate_report, parse_report, ParsedReport};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the snapshot notification channel.
const CHANNEL_CAPACITY: usize = 16;

/// Where and how the loader reads results.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub results_dir: PathBuf,
    pub report_file: String,
    pub options: AggregateOptions,
}

impl From<&crate::config::Config> for LoaderConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            results_dir: config.general.results_dir.clone(),
            report_file: config.general.report_file.clone(),
            options: AggregateOptions::from(&config.dashboard),
        }
    }
}

/// Result of a [`DashboardLoader::refresh`] call.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// A new snapshot was built (possibly the empty one) and published.
    Loaded(Arc<AggregateStatistics>),
    /// The report has not changed since the last successful pass.
    Unchanged,
    /// Another refresh was already running; this request was dropped.
    Busy,
}

impl RefreshOutcome {
    /// The snapshot, if this call produced one.
    pub fn snapshot(&self) -> Option<&Arc<AggregateStatistics>> {
        match self {
            RefreshOutcome::Loaded(stats) => Some(stats),
            _ => None,
        }
    }
}

/// Clears the in-flight flag on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What the last completed refresh published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watermark {
    /// Nothing published yet.
    Initial,
    /// The empty snapshot, after a missing or unreadable report.
    Empty,
    /// A parsed report with this modification time.
    Report(Option<SystemTime>),
}

/// Loads and aggregates the report of one results directory.
pub struct DashboardLoader {
    config: LoaderConfig,
    watermark: Mutex<Watermark>,
    loading: AtomicBool,
    sender: broadcast::Sender<Arc<AggregateStatistics>>,
}

impl DashboardLoader {
    /// Create a loader for a results directory.
    pub fn new(config: LoaderConfig) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            config,
            watermark: Mutex::new(Watermark::Initial),
            loading: AtomicBool::new(false),
            sender,
        }
    }

    /// Subscribe to snapshots published by future refreshes.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AggregateStatistics>> {
        self.sender.subscribe()
    }

    /// Whether a refresh is currently running.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Re-read the report.
    ///
    /// Without `force` nothing happens when the report's modification time
    /// is not newer than the last successfully parsed one, or when the
    /// report is still unavailable after an empty snapshot was published.
    /// Errors never escape: a missing, empty or malformed report yields the
    /// empty snapshot.
    pub fn refresh(&self, force: bool) -> RefreshOutcome {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in progress, dropping request");
            return RefreshOutcome::Busy;
        }
        let _guard = InFlight(&self.loading);

        let path = match locate_report(&self.config.results_dir, &self.config.report_file) {
            Ok(path) => path,
            Err(e) => return self.publish_empty(&e, force),
        };

        let modified = report_modified(&path);
        if !force {
            if let (Some(current), Watermark::Report(Some(seen))) = (modified, self.watermark()) {
                if current <= seen {
                    debug!("Report unchanged since last refresh: {}", path.display());
                    return RefreshOutcome::Unchanged;
                }
            }
        }

        let parsed = match parse_report(&path) {
            Ok(parsed) => parsed,
            Err(e) => return self.publish_empty(&e, force),
        };

        if parsed.skipped > 0 {
            warn!(
                "Skipped {} malformed test record(s) in {}",
                parsed.skipped,
                path.display()
            );
        }

        let stats = Arc::new(aggregate(&parsed, &self.config.options));
        self.set_watermark(Watermark::Report(modified));

        info!(
            "Loaded {}: total={}, passed={}, failed={}",
            path.display(),
            stats.total_tests,
            stats.passed_count,
            stats.failed_count
        );

        self.publish(stats)
    }

    /// Every valid record of the current report, for exports.
    ///
    /// Unlike the snapshot this is not deduplicated or truncated.
    pub fn load_records(&self) -> Result<Vec<TestCaseResult>, ReportError> {
        self.load_parsed().map(|parsed| parsed.records)
    }

    /// Parse the current report without aggregating it.
    pub fn load_parsed(&self) -> Result<ParsedReport, ReportError> {
        let path = locate_report(&self.config.results_dir, &self.config.report_file)?;
        parse_report(&path)
    }

    fn watermark(&self) -> Watermark {
        self.watermark
            .lock()
            .map(|w| *w)
            .unwrap_or(Watermark::Initial)
    }

    fn set_watermark(&self, value: Watermark) {
        if let Ok(mut watermark) = self.watermark.lock() {
            *watermark = value;
        }
    }

    fn publish_empty(&self, error: &ReportError, force: bool) -> RefreshOutcome {
        if !force && self.watermark() == Watermark::Empty {
            debug!("Still no results: {}", error);
            return RefreshOutcome::Unchanged;
        }

        if error.is_expected() {
            info!("No results available: {}", error);
        } else {
            warn!("Showing empty dashboard: {}", error);
        }
        self.set_watermark(Watermark::Empty);
        self.publish(Arc::new(AggregateStatistics::default()))
    }

    fn publish(&self, stats: Arc<AggregateStatistics>) -> RefreshOutcome {
        // No subscribers is fine; the snapshot is also returned.
        let _ = self.sender.send(Arc::clone(&stats));
        RefreshOutcome::Loaded(stats)
    }
}

fn report_modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const REPORT: &str = r#"<robot>
  <suite name="Suite">
    <test name="test_login">
      <status status="PASS" starttime="20230101 10:00:00.000" endtime="20230101 10:00:02.500"/>
    </test>
    <test name="test_login">
      <status status="FAIL" starttime="20230102 10:00:00.000" endtime="20230102 10:00:05.000">AssertionError: mismatch</status>
    </test>
    <test name="test_logout">
      <status status="PASS" starttime="20230102 11:00:00.000" endtime="20230102 11:00:01.000"/>
    </test>
  </suite>
</robot>"#;

    fn loader_for(dir: &Path) -> DashboardLoader {
        DashboardLoader::new(LoaderConfig {
            results_dir: dir.to_path_buf(),
            report_file: "output.xml".to_string(),
            options: AggregateOptions::default(),
        })
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn test_missing_directory_yields_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_for(&dir.path().join("nope"));

        let outcome = loader.refresh(false);
        let stats = outcome.snapshot().expect("snapshot");

        assert_eq!(stats.total_tests, 0);
        assert!(stats.recent_runs.is_empty());
        assert!(stats.execution_durations.is_empty());
        assert!(stats.failure_message_counts.is_empty());
        assert!(stats.daily_trend.is_empty());
        assert!(!loader.is_loading());
    }

    #[test]
    fn test_missing_report_publishes_empty_snapshot_once() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_for(dir.path());
        let mut rx = loader.subscribe();

        assert!(matches!(loader.refresh(false), RefreshOutcome::Loaded(_)));
        assert!(matches!(loader.refresh(false), RefreshOutcome::Unchanged));
        assert!(matches!(loader.refresh(false), RefreshOutcome::Unchanged));
        assert!(matches!(loader.refresh(true), RefreshOutcome::Loaded(_)));

        assert!(rx.try_recv().unwrap().is_empty());
        assert!(rx.try_recv().unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        std::fs::write(dir.path().join("output.xml"), REPORT).unwrap();
        let outcome = loader.refresh(false);
        assert_eq!(outcome.snapshot().expect("snapshot").total_tests, 3);
    }

    #[test]
    fn test_out_of_range_elapsed_does_not_escape_refresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("output.xml"),
            r#"<robot><suite name="S">
  <test name="huge"><status status="PASS" start="2024-03-05T08:15:00.000000" elapsed="1e15"/></test>
  <test name="ok"><status status="FAIL" start="2024-03-05T08:15:00.000000" elapsed="2.0">boom</status></test>
</suite></robot>"#,
        )
        .unwrap();

        let outcome = loader_for(dir.path()).refresh(true);
        let stats = outcome.snapshot().expect("snapshot");
        assert_eq!(stats.total_tests, 1);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.skipped_records, 1);
    }

    #[test]
    fn test_malformed_report_yields_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("output.xml"), "<robot><suite>").unwrap();

        let outcome = loader_for(dir.path()).refresh(true);
        assert_eq!(
            **outcome.snapshot().expect("snapshot"),
            AggregateStatistics::default()
        );
    }

    #[test]
    fn test_refresh_skips_unchanged_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("output.xml");
        std::fs::write(&report, REPORT).unwrap();
        let base = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&report, base);

        let loader = loader_for(dir.path());

        let first = loader.refresh(false);
        assert_eq!(first.snapshot().expect("snapshot").total_tests, 3);

        assert!(matches!(loader.refresh(false), RefreshOutcome::Unchanged));
        assert!(matches!(loader.refresh(true), RefreshOutcome::Loaded(_)));

        set_mtime(&report, base + Duration::from_secs(60));
        assert!(matches!(loader.refresh(false), RefreshOutcome::Loaded(_)));
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("output.xml"), REPORT).unwrap();
        let loader = loader_for(dir.path());

        let a = loader.refresh(true);
        let b = loader.refresh(true);
        assert_eq!(a.snapshot().unwrap(), b.snapshot().unwrap());
    }

    #[test]
    fn test_concurrent_refresh_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("output.xml"), REPORT).unwrap();
        let loader = loader_for(dir.path());

        loader.loading.store(true, Ordering::Release);
        assert!(matches!(loader.refresh(true), RefreshOutcome::Busy));
        assert!(loader.is_loading());

        loader.loading.store(false, Ordering::Release);
        assert!(matches!(loader.refresh(true), RefreshOutcome::Loaded(_)));
        assert!(!loader.is_loading());
    }

    #[test]
    fn test_load_records_returns_every_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("output.xml"), REPORT).unwrap();
        let loader = loader_for(dir.path());

        let records = loader.load_records().unwrap();
        assert_eq!(records.len(), 3);

        let stats = loader.refresh(true);
        assert_eq!(stats.snapshot().unwrap().recent_runs.len(), 2);
    }

    #[tokio::test]
    async fn test_subscribers_receive_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("output.xml"), REPORT).unwrap();
        let loader = Arc::new(loader_for(dir.path()));
        let mut rx = loader.subscribe();

        let worker = Arc::clone(&loader);
        tokio::task::spawn_blocking(move || worker.refresh(true))
            .await
            .unwrap();

        let stats = rx.recv().await.unwrap();
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.message_count("AssertionError: mismatch"), Some(1));
    }
}
