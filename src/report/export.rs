//! Export of every parsed test record.
//!
//! Unlike the dashboard, exports list each execution (suite, test, status,
//! duration) followed by the pass/fail summary.

use super::generator::{escape_cell, ReportMetadata};
use crate::config::ReportFormat;
use crate::error::ExportError;
use crate::models::{SummaryCounts, TestCaseResult, TestStatus};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Windows "file in use by another process".
const ERROR_SHARING_VIOLATION: i32 = 32;

/// Data written by an export.
#[derive(Debug, Serialize)]
pub struct ExportDocument<'a> {
    pub metadata: &'a ReportMetadata,
    pub summary: SummaryCounts,
    pub records: &'a [TestCaseResult],
}

/// Render the export in the requested format.
pub fn render_export(doc: &ExportDocument<'_>, format: ReportFormat) -> Result<String, ExportError> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(doc)?),
        ReportFormat::Markdown => Ok(render_markdown(doc)),
    }
}

fn render_markdown(doc: &ExportDocument<'_>) -> String {
    let mut output = String::new();

    output.push_str("# Test Results\n\n");
    output.push_str(&format!(
        "*Exported from `{}` on {}*\n\n",
        doc.metadata.results_dir.join(&doc.metadata.report_file).display(),
        doc.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output.push_str("| Suite Name | Test Name | Status | Duration (s) |\n");
    output.push_str("|:---|:---|:---:|---:|\n");
    for record in doc.records {
        let status = match record.status {
            TestStatus::Pass => "Passed",
            TestStatus::Fail => "Failed",
            TestStatus::Unknown => "Other",
        };
        output.push_str(&format!(
            "| {} | {} | {} {} | {:.3} |\n",
            escape_cell(record.suite_name.as_deref().unwrap_or("")),
            escape_cell(&record.name),
            record.status.emoji(),
            status,
            record.duration_seconds,
        ));
    }
    output.push('\n');

    output.push_str("## Summary\n\n");
    output.push_str("| Status | Count |\n");
    output.push_str("|:---|:---:|\n");
    output.push_str(&format!("| Passed | {} |\n", doc.summary.passed));
    output.push_str(&format!("| Failed | {} |\n", doc.summary.failed));
    output.push_str(&format!("| **Total** | **{}** |\n", doc.summary.total));

    output
}

/// Write rendered export content to `path`.
///
/// A target that is locked or not writable yields [`ExportError::Blocked`].
pub fn write_export(path: &Path, content: &str) -> Result<(), ExportError> {
    let classify = |source: io::Error| {
        if is_blocked(&source) {
            ExportError::Blocked(path.to_path_buf())
        } else {
            ExportError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    };

    let mut file = std::fs::File::create(path).map_err(classify)?;
    file.write_all(content.as_bytes()).map_err(classify)?;

    info!("Exported results to {}", path.display());
    Ok(())
}

fn is_blocked(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::PermissionDenied
        || (cfg!(windows) && error.raw_os_error() == Some(ERROR_SHARING_VIOLATION))
}
