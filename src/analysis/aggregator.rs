//! Result aggregation and statistics.
//!
//! This module turns the records of one parsed report into the
//! [`AggregateStatistics`] snapshot consumed by dashboards and exports.

use super::distribution::{histogram, trim_outliers};
use crate::models::{
    AggregateStatistics, DailyTrend, MessageCount, SummaryCounts, SummarySource, TestCaseResult,
    TestFailureCount, TestStatus,
};
use crate::parser::ParsedReport;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Number of deduplicated runs kept in `recent_runs`.
pub const DEFAULT_RECENT_WINDOW: usize = 10;
/// Length of the top failure message list.
pub const DEFAULT_TOP_MESSAGES: usize = 5;
/// Length of the top failing test list.
pub const DEFAULT_TOP_TESTS: usize = 10;
/// Buckets in the duration histogram.
pub const DEFAULT_HISTOGRAM_BINS: usize = 10;

/// Which records feed the per-date trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TrendBase {
    /// Every parsed record.
    #[default]
    All,
    /// Only the deduplicated recent runs.
    Recent,
}

/// Tunables of the aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub recent_window: usize,
    pub top_messages: usize,
    pub top_tests: usize,
    pub histogram_bins: usize,
    pub trend_base: TrendBase,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            recent_window: DEFAULT_RECENT_WINDOW,
            top_messages: DEFAULT_TOP_MESSAGES,
            top_tests: DEFAULT_TOP_TESTS,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            trend_base: TrendBase::All,
        }
    }
}

impl From<&crate::config::DashboardConfig> for AggregateOptions {
    fn from(config: &crate::config::DashboardConfig) -> Self {
        Self {
            recent_window: config.recent_window,
            top_messages: config.top_messages,
            top_tests: config.top_tests,
            histogram_bins: config.histogram_bins,
            trend_base: config.trend_base,
        }
    }
}

/// Build the statistics snapshot for one parsed report.
pub fn aggregate(report: &ParsedReport, options: &AggregateOptions) -> AggregateStatistics {
    let records = &report.records;
    let (counts, summary_source) = summary_counts(report);

    let execution_durations: Vec<f64> = records.iter().map(|r| r.duration_seconds).collect();
    let recent_runs = recent_runs(records, options.recent_window);

    let daily_trend = match options.trend_base {
        TrendBase::All => daily_trend(records),
        TrendBase::Recent => daily_trend(&recent_runs),
    };

    let failure_message_counts = failure_message_counts(records);
    let top_failure_messages = top_failure_messages(&failure_message_counts, options.top_messages);
    let top_failing_tests = top_failing_tests(records, options.top_tests);

    let histogram_durations = trim_outliers(&execution_durations);
    let duration_histogram = histogram(&histogram_durations, options.histogram_bins);

    AggregateStatistics {
        total_tests: counts.total,
        passed_count: counts.passed,
        failed_count: counts.failed,
        summary_source,
        execution_durations,
        recent_runs,
        failure_message_counts,
        daily_trend,
        top_failure_messages,
        top_failing_tests,
        histogram_durations,
        duration_histogram,
        skipped_records: report.skipped,
    }
}

/// Total/passed/failed counts, preferring the report's own statistics block.
///
/// A block that is missing or reports zero tests is ignored and the counts
/// are tallied from the records instead.
pub fn summary_counts(report: &ParsedReport) -> (SummaryCounts, SummarySource) {
    match report.summary {
        Some(summary) if summary.total > 0 => (summary, SummarySource::Report),
        _ => (tally(&report.records), SummarySource::Records),
    }
}

/// Count records by status.
pub fn tally(records: &[TestCaseResult]) -> SummaryCounts {
    let mut counts = SummaryCounts {
        total: records.len(),
        ..Default::default()
    };

    for record in records {
        match record.status {
            TestStatus::Pass => counts.passed += 1,
            TestStatus::Fail => counts.failed += 1,
            TestStatus::Unknown => {}
        }
    }

    counts
}

/// Latest run of each test name, newest first, at most `window` entries.
///
/// When two runs of a name share the latest start time the one that appears
/// first in the report is kept.
pub fn recent_runs(records: &[TestCaseResult], window: usize) -> Vec<TestCaseResult> {
    let mut latest: Vec<&TestCaseResult> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        match index.get(record.name.as_str()) {
            Some(&i) => {
                if record.start_time > latest[i].start_time {
                    latest[i] = record;
                }
            }
            None => {
                index.insert(record.name.as_str(), latest.len());
                latest.push(record);
            }
        }
    }

    latest.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    latest.truncate(window);

    latest.into_iter().cloned().collect()
}

/// Group records by the calendar date they started on.
pub fn daily_trend(records: &[TestCaseResult]) -> BTreeMap<NaiveDate, DailyTrend> {
    let mut trend: BTreeMap<NaiveDate, DailyTrend> = BTreeMap::new();

    for record in records {
        let day = trend.entry(record.date()).or_default();
        match record.status {
            TestStatus::Pass => day.pass_count += 1,
            TestStatus::Fail => day.fail_count += 1,
            TestStatus::Unknown => {}
        }
        day.total_count += 1;
        day.total_duration += record.duration_seconds;
    }

    trend
}

/// Occurrences of each failure message, in the order messages first appear.
pub fn failure_message_counts(records: &[TestCaseResult]) -> Vec<MessageCount> {
    let mut counts: Vec<MessageCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        if record.status != TestStatus::Fail || record.message.is_empty() {
            continue;
        }
        // First line only.
        let message = record.message.lines().next().unwrap_or("").trim();
        if message.is_empty() {
            continue;
        }

        match index.get(message) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(message, counts.len());
                counts.push(MessageCount {
                    message: message.to_string(),
                    count: 1,
                });
            }
        }
    }

    counts
}

/// The `n` most frequent failure messages; ties keep first-seen order.
pub fn top_failure_messages(counts: &[MessageCount], n: usize) -> Vec<MessageCount> {
    let mut sorted = counts.to_vec();
    sorted.sort_by_key(|m| std::cmp::Reverse(m.count));
    sorted.truncate(n);
    sorted
}

/// Failed executions per test name, in first-seen order.
pub fn failing_test_counts(records: &[TestCaseResult]) -> Vec<TestFailureCount> {
    let mut counts: Vec<TestFailureCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records.iter().filter(|r| r.status == TestStatus::Fail) {
        match index.get(record.name.as_str()) {
            Some(&i) => counts[i].failures += 1,
            None => {
                index.insert(record.name.as_str(), counts.len());
                counts.push(TestFailureCount {
                    name: record.name.clone(),
                    failures: 1,
                });
            }
        }
    }

    counts
}

/// The `n` tests with the most failures; ties keep first-seen order.
pub fn top_failing_tests(records: &[TestCaseResult], n: usize) -> Vec<TestFailureCount> {
    let mut counts = failing_test_counts(records);
    counts.sort_by_key(|t| std::cmp::Reverse(t.failures));
    counts.truncate(n);
    counts
}
