//! Dashboard report generation.
//!
//! This module renders a statistics snapshot as a Markdown dashboard or as
//! pretty JSON.

use crate::models::{AggregateStatistics, SummarySource, TestStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Width of the text bars in the Markdown dashboard.
const BAR_WIDTH: usize = 30;

/// Context printed alongside the statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub results_dir: PathBuf,
    pub report_file: String,
    pub generated_at: DateTime<Utc>,
}

impl ReportMetadata {
    pub fn new(results_dir: PathBuf, report_file: impl Into<String>) -> Self {
        Self {
            results_dir,
            report_file: report_file.into(),
            generated_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct DashboardReport<'a> {
    metadata: &'a ReportMetadata,
    success_rate: f64,
    average_duration: f64,
    statistics: &'a AggregateStatistics,
}

/// Generate the complete Markdown dashboard.
pub fn generate_markdown_report(stats: &AggregateStatistics, metadata: &ReportMetadata) -> String {
    let mut output = String::new();

    output.push_str("# Robot Framework Dashboard\n\n");
    output.push_str(&generate_metadata_section(metadata, stats));

    if stats.is_empty() {
        output.push_str("No test results available. Run some tests first.\n\n");
        output.push_str(&generate_footer());
        return output;
    }

    output.push_str(&generate_summary_section(stats));
    output.push_str(&generate_recent_runs_section(stats));
    output.push_str(&generate_trend_section(stats));
    output.push_str(&generate_failures_section(stats));
    output.push_str(&generate_histogram_section(stats));
    output.push_str(&generate_footer());

    output
}

/// Generate a JSON dashboard.
pub fn generate_json_report(stats: &AggregateStatistics, metadata: &ReportMetadata) -> Result<String> {
    let report = DashboardReport {
        metadata,
        success_rate: stats.success_rate(),
        average_duration: stats.average_duration(),
        statistics: stats,
    };
    serde_json::to_string_pretty(&report).map_err(Into::into)
}

/// One-line summary, used after runs and while watching.
pub fn summary_line(stats: &AggregateStatistics) -> String {
    format!(
        "Total: {} | Passed: {} | Failed: {}",
        stats.total_tests, stats.passed_count, stats.failed_count
    )
}

fn generate_metadata_section(metadata: &ReportMetadata, stats: &AggregateStatistics) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Results:** `{}`\n",
        metadata.results_dir.join(&metadata.report_file).display()
    ));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    let source = match stats.summary_source {
        SummarySource::Report => "report statistics",
        SummarySource::Records => "test records",
    };
    section.push_str(&format!("- **Counts from:** {}\n", source));
    if stats.skipped_records > 0 {
        section.push_str(&format!(
            "- **Skipped records:** {}\n",
            stats.skipped_records
        ));
    }
    section.push('\n');

    section
}

fn generate_summary_section(stats: &AggregateStatistics) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Total | Passed | Failed | Success Rate | Avg Duration |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| **{}** | {} {} | {} {} | {:.2}% | {:.2}s |\n\n",
        stats.total_tests,
        TestStatus::Pass.emoji(),
        stats.passed_count,
        TestStatus::Fail.emoji(),
        stats.failed_count,
        stats.success_rate(),
        stats.average_duration(),
    ));

    // Pass/fail distribution
    if stats.total_tests > 0 {
        section.push_str("### Distribution\n\n```\n");
        let mut rows = vec![
            ("Passed", stats.passed_count),
            ("Failed", stats.failed_count),
        ];
        if stats.other_count() > 0 {
            rows.push(("Other", stats.other_count()));
        }
        for (label, count) in rows {
            section.push_str(&format!(
                "{:<7} {:<width$} {}\n",
                label,
                bar(count, stats.total_tests),
                count,
                width = BAR_WIDTH
            ));
        }
        section.push_str("```\n\n");
    }

    section
}

fn generate_recent_runs_section(stats: &AggregateStatistics) -> String {
    if stats.recent_runs.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Recent Runs\n\n");
    section.push_str("| Test | Status | Started | Duration | Message |\n");
    section.push_str("|:---|:---:|:---|---:|:---|\n");

    for run in &stats.recent_runs {
        section.push_str(&format!(
            "| {} | {} {} | {} | {:.2}s | {} |\n",
            escape_cell(&run.name),
            run.status.emoji(),
            run.status,
            run.start_time.format("%Y-%m-%d %H:%M:%S"),
            run.duration_seconds,
            escape_cell(&run.message),
        ));
    }
    section.push('\n');

    section
}

fn generate_trend_section(stats: &AggregateStatistics) -> String {
    if stats.daily_trend.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Daily Trend\n\n");
    section.push_str("| Date | Passed | Failed | Total | Failure Rate | Avg Duration |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|---:|\n");

    for (date, day) in &stats.daily_trend {
        let average = if day.total_count == 0 {
            0.0
        } else {
            day.total_duration / day.total_count as f64
        };
        section.push_str(&format!(
            "| {} | {} | {} | {} | {:.1}% | {:.2}s |\n",
            date,
            day.pass_count,
            day.fail_count,
            day.total_count,
            day.failure_rate() * 100.0,
            average,
        ));
    }
    section.push('\n');

    section
}

fn generate_failures_section(stats: &AggregateStatistics) -> String {
    if stats.top_failure_messages.is_empty() && stats.top_failing_tests.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Failures\n\n");

    if !stats.top_failure_messages.is_empty() {
        section.push_str("### Top Failure Messages\n\n");
        section.push_str("| Message | Count |\n");
        section.push_str("|:---|:---:|\n");
        for entry in &stats.top_failure_messages {
            section.push_str(&format!(
                "| {} | {} |\n",
                escape_cell(&entry.message),
                entry.count
            ));
        }
        section.push('\n');
    }

    if !stats.top_failing_tests.is_empty() {
        section.push_str("### Most Failing Tests\n\n");
        section.push_str("| Test | Failures |\n");
        section.push_str("|:---|:---:|\n");
        for entry in &stats.top_failing_tests {
            section.push_str(&format!(
                "| `{}` | {} |\n",
                escape_cell(&entry.name),
                entry.failures
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_histogram_section(stats: &AggregateStatistics) -> String {
    if stats.duration_histogram.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    let largest = stats
        .duration_histogram
        .iter()
        .map(|b| b.count)
        .max()
        .unwrap_or(0);

    section.push_str("## Execution Time Distribution\n\n");
    let trimmed = stats.execution_durations.len() - stats.histogram_durations.len();
    if trimmed > 0 {
        section.push_str(&format!("*{} outlier(s) excluded*\n\n", trimmed));
    }

    section.push_str("```\n");
    for bucket in &stats.duration_histogram {
        section.push_str(&format!(
            "{:>8.2}s - {:>8.2}s {:<width$} {}\n",
            bucket.lower,
            bucket.upper,
            bar(bucket.count, largest),
            bucket.count,
            width = BAR_WIDTH
        ));
    }
    section.push_str("```\n\n");

    section
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by rfdash v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

fn bar(count: usize, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let filled = (count * BAR_WIDTH + max / 2) / max;
    "#".repeat(filled.min(BAR_WIDTH))
}

/// Make text safe inside a Markdown table cell.
pub(crate) fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{aggregate, AggregateOptions};
    use crate::parser::parse_document;

    const REPORT: &str = r#"<robot>
  <suite name="Suite">
    <test name="test_login">
      <status status="PASS" starttime="20230101 10:00:00.000" endtime="20230101 10:00:02.500"/>
    </test>
    <test name="test_login">
      <status status="FAIL" starttime="20230102 10:00:00.000" endtime="20230102 10:00:05.000">AssertionError: a | b</status>
    </test>
    <test name="test_logout">
      <status status="PASS" starttime="20230102 11:00:00.000" endtime="20230102 11:00:01.000"/>
    </test>
  </suite>
</robot>"#;

    fn create_test_stats() -> AggregateStatistics {
        let parsed = parse_document(REPORT).unwrap();
        aggregate(&parsed, &AggregateOptions::default())
    }

    fn metadata() -> ReportMetadata {
        ReportMetadata::new(PathBuf::from("Results"), "output.xml")
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_stats(), &metadata());

        assert!(markdown.contains("# Robot Framework Dashboard"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("## Recent Runs"));
        assert!(markdown.contains("## Daily Trend"));
        assert!(markdown.contains("| 2023-01-02 | 1 | 1 | 2 | 50.0% |"));
        assert!(markdown.contains("### Top Failure Messages"));
        assert!(markdown.contains("AssertionError: a \\| b"));
        assert!(markdown.contains("## Execution Time Distribution"));
        assert!(markdown.contains("66.67%"));
    }

    #[test]
    fn test_markdown_report_without_data() {
        let markdown =
            generate_markdown_report(&AggregateStatistics::default(), &metadata());

        assert!(markdown.contains("No test results available"));
        assert!(!markdown.contains("## Summary"));
        assert!(markdown.contains("rfdash v"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_stats(), &metadata()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["statistics"]["total_tests"], 3);
        assert_eq!(value["statistics"]["failed_count"], 1);
        assert_eq!(value["success_rate"], 66.67);
        assert_eq!(value["metadata"]["report_file"], "output.xml");
        assert!(value["statistics"]["daily_trend"]["2023-01-01"].is_object());
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(
            summary_line(&create_test_stats()),
            "Total: 3 | Passed: 2 | Failed: 1"
        );
    }

    #[test]
    fn test_bar() {
        assert_eq!(bar(0, 0), "");
        assert_eq!(bar(5, 10).len(), BAR_WIDTH / 2);
        assert_eq!(bar(10, 10).len(), BAR_WIDTH);
    }
}
