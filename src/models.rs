//! Data models for the results dashboard.
//!
//! This module contains the records produced by the report parser and the
//! statistics snapshot handed to every presentation layer.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of a single executed test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    /// Anything the report marks other than PASS or FAIL (e.g. SKIP, NOT RUN)
    Unknown,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl From<&str> for TestStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "PASS" => TestStatus::Pass,
            "FAIL" => TestStatus::Fail,
            _ => TestStatus::Unknown,
        }
    }
}

impl TestStatus {
    /// Returns an emoji representation of the status.
    pub fn emoji(&self) -> &'static str {
        match self {
            TestStatus::Pass => "🟢",
            TestStatus::Fail => "🔴",
            TestStatus::Unknown => "⚪",
        }
    }
}

/// One executed test case, as read from the report document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    /// Test name (not unique across suites).
    pub name: String,
    /// Innermost suite containing the test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_name: Option<String>,
    /// Execution status.
    pub status: TestStatus,
    /// Start of execution.
    pub start_time: NaiveDateTime,
    /// End of execution.
    pub end_time: NaiveDateTime,
    /// `end_time - start_time` in seconds, never negative.
    pub duration_seconds: f64,
    /// First line of the failure text; empty for passing tests.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl TestCaseResult {
    /// Calendar date the test started on.
    pub fn date(&self) -> NaiveDate {
        self.start_time.date()
    }
}

/// Where the total/passed/failed counts of a snapshot came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// The report's own `All Tests` statistics block.
    Report,
    /// Tallied from the individually parsed test records.
    #[default]
    Records,
}

/// Authoritative counts read from the report's statistics block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Occurrences of one failure message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCount {
    pub message: String,
    pub count: usize,
}

/// Number of failed executions of one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailureCount {
    pub name: String,
    pub failures: usize,
}

/// Per-date accumulation used by the trend charts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub pass_count: usize,
    pub fail_count: usize,
    /// All records of the day, including ones that neither passed nor failed.
    pub total_count: usize,
    pub total_duration: f64,
}

impl DailyTrend {
    /// Share of the day's executions that failed, between 0.0 and 1.0.
    pub fn failure_rate(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.fail_count as f64 / self.total_count as f64
        }
    }
}

/// One equal-width bucket of the duration histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Inclusive lower bound in seconds.
    pub lower: f64,
    /// Upper bound in seconds (inclusive for the last bucket only).
    pub upper: f64,
    pub count: usize,
}

/// Statistics snapshot built from one report document.
///
/// Every field is derived from the records of a single parse pass. The
/// default value is the "no data" state rendered by empty dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatistics {
    pub total_tests: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    pub summary_source: SummarySource,
    /// One duration per valid record, in parse order.
    pub execution_durations: Vec<f64>,
    /// Latest run per test name, newest first.
    pub recent_runs: Vec<TestCaseResult>,
    /// Failure message frequencies in first-seen order.
    pub failure_message_counts: Vec<MessageCount>,
    pub daily_trend: BTreeMap<NaiveDate, DailyTrend>,
    pub top_failure_messages: Vec<MessageCount>,
    pub top_failing_tests: Vec<TestFailureCount>,
    /// `execution_durations` with upper outliers removed.
    pub histogram_durations: Vec<f64>,
    pub duration_histogram: Vec<HistogramBucket>,
    /// Test elements dropped because they were malformed.
    pub skipped_records: usize,
}

impl AggregateStatistics {
    /// True when no test data was available.
    pub fn is_empty(&self) -> bool {
        self.total_tests == 0 && self.execution_durations.is_empty()
    }

    /// Tests that neither passed nor failed.
    pub fn other_count(&self) -> usize {
        self.total_tests
            .saturating_sub(self.passed_count + self.failed_count)
    }

    /// Pass percentage rounded to two decimals.
    pub fn success_rate(&self) -> f64 {
        if self.total_tests == 0 {
            return 0.0;
        }
        let rate = self.passed_count as f64 / self.total_tests as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }

    /// Mean execution time in seconds.
    pub fn average_duration(&self) -> f64 {
        if self.execution_durations.is_empty() {
            0.0
        } else {
            self.execution_durations.iter().sum::<f64>() / self.execution_durations.len() as f64
        }
    }

    /// Count recorded for a failure message, if any.
    pub fn message_count(&self, message: &str) -> Option<usize> {
        self.failure_message_counts
            .iter()
            .find(|m| m.message == message)
            .map(|m| m.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_str() {
        assert_eq!(TestStatus::from("PASS"), TestStatus::Pass);
        assert_eq!(TestStatus::from("fail"), TestStatus::Fail);
        assert_eq!(TestStatus::from(" Pass "), TestStatus::Pass);
        assert_eq!(TestStatus::from("SKIP"), TestStatus::Unknown);
        assert_eq!(TestStatus::from(""), TestStatus::Unknown);
    }

    #[test]
    fn test_default_statistics_are_empty() {
        let stats = AggregateStatistics::default();
        assert!(stats.is_empty());
        assert_eq!(stats.success_rate(), 0.0);
        assert_eq!(stats.average_duration(), 0.0);
        assert!(stats.daily_trend.is_empty());
        assert_eq!(stats.summary_source, SummarySource::Records);
    }

    #[test]
    fn test_success_rate_and_remainder() {
        let stats = AggregateStatistics {
            total_tests: 3,
            passed_count: 1,
            failed_count: 1,
            ..Default::default()
        };
        assert_eq!(stats.success_rate(), 33.33);
        assert_eq!(stats.other_count(), 1);
    }

    #[test]
    fn test_daily_failure_rate() {
        let day = DailyTrend {
            pass_count: 3,
            fail_count: 1,
            total_count: 4,
            total_duration: 10.0,
        };
        assert_eq!(day.failure_rate(), 0.25);
        assert_eq!(DailyTrend::default().failure_rate(), 0.0);
    }
}
