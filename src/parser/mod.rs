//! Robot Framework `output.xml` parsing.
//!
//! The document is read with a streaming `quick-xml` reader. Every `test`
//! element becomes a [`TestCaseResult`]; malformed test elements are logged
//! and skipped so one bad record never costs the rest of the report.

use crate::error::{RecordError, ReportError};
use crate::models::{SummaryCounts, TestCaseResult, TestStatus};
use chrono::{Duration, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

const TAG_SUITE: &str = "suite";
const TAG_TEST: &str = "test";
const TAG_STATUS: &str = "status";
const TAG_STATISTICS: &str = "statistics";
const TAG_TOTAL: &str = "total";
const TAG_STAT: &str = "stat";
const TAG_PASS: &str = "pass";
const TAG_FAIL: &str = "fail";

const ALL_TESTS: &str = "All Tests";
const UNNAMED_TEST: &str = "Unnamed Test";

/// Timestamp layout of `starttime`/`endtime` (e.g. `20230101 10:00:00.000000`).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d %H:%M:%S%.f";
/// Timestamp layout of the `start` attribute written by Robot Framework 7.
const ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Everything one parse pass could establish.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReport {
    /// Well-formed test records in document order.
    pub records: Vec<TestCaseResult>,
    /// Counts from the `All Tests` statistics block, when present.
    pub summary: Option<SummaryCounts>,
    /// Number of test elements dropped as malformed.
    pub skipped: usize,
}

/// Parse the report at `path`.
pub fn parse_report(path: &Path) -> Result<ParsedReport, ReportError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReportError::SourceMissing(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ReportError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_file() {
        return Err(ReportError::SourceMissing(path.to_path_buf()));
    }
    if metadata.len() == 0 {
        return Err(ReportError::SourceEmpty(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::InvalidData {
            ReportError::ParseMalformed {
                path: path.to_path_buf(),
                reason: "document is not valid UTF-8".to_string(),
            }
        } else {
            ReportError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    debug!("Parsing report: {}", path.display());

    parse_document(&content).map_err(|reason| ReportError::ParseMalformed {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse an in-memory report document.
///
/// Returns the reason as `Err` when the document is not well-formed.
pub fn parse_document(xml: &str) -> Result<ParsedReport, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut parser = ReportParser::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("{} at byte {}", e, reader.buffer_position()))?;

        match event {
            Event::Eof => break,
            Event::Start(e) => parser.open(&e, false),
            Event::Empty(e) => parser.open(&e, true),
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                parser.close(&name);
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|e| format!("{} at byte {}", e, reader.buffer_position()))?;
                parser.text(&text);
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                parser.text(&String::from_utf8_lossy(&raw));
            }
            _ => (),
        }
    }

    parser.finish()
}

/// Parse a `YYYYMMDD HH:MM:SS.ffffff` timestamp.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, RecordError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| RecordError::InvalidTimestamp(value.to_string()))
}

/// Find the report file for a results directory.
///
/// `<results_dir>/<report_file>` is preferred. Otherwise the most recently
/// modified file of that name anywhere below `results_dir` is used, which
/// covers runners that write into per-run subfolders.
pub fn locate_report(results_dir: &Path, report_file: &str) -> Result<PathBuf, ReportError> {
    if !results_dir.is_dir() {
        return Err(ReportError::SourceMissing(results_dir.to_path_buf()));
    }

    let direct = results_dir.join(report_file);
    if direct.is_file() {
        return Ok(direct);
    }

    let newest = WalkDir::new(results_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == report_file)
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.into_path())
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

    match newest {
        Some((_, path)) => {
            debug!("Using nested report: {}", path.display());
            Ok(path)
        }
        None => Err(ReportError::SourceMissing(direct)),
    }
}

#[derive(Debug, Default)]
struct StatusAttrs {
    status: Option<String>,
    starttime: Option<String>,
    endtime: Option<String>,
    start: Option<String>,
    elapsed: Option<String>,
}

#[derive(Debug)]
struct PendingTest {
    name: String,
    suite: Option<String>,
    /// Element depth of the `test` tag itself.
    depth: usize,
    status: Option<StatusAttrs>,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountField {
    Total,
    Pass,
    Fail,
}

#[derive(Debug, Default)]
struct PendingStat {
    name: Option<String>,
    label: String,
    pass_attr: Option<String>,
    fail_attr: Option<String>,
    skip_attr: Option<String>,
    total: Option<String>,
    pass: Option<String>,
    fail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    StatusMessage,
    StatLabel,
    StatCount(CountField),
}

#[derive(Debug, Default)]
struct ReportParser {
    stack: Vec<String>,
    suites: Vec<String>,
    saw_root: bool,
    current_test: Option<PendingTest>,
    current_stat: Option<PendingStat>,
    text_target: Option<TextTarget>,
    records: Vec<TestCaseResult>,
    summary: Option<SummaryCounts>,
    skipped: usize,
}

impl ReportParser {
    fn open(&mut self, e: &BytesStart, empty: bool) {
        self.saw_root = true;
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let parent = self.stack.last().cloned();

        match name.as_str() {
            TAG_SUITE if !empty => {
                self.suites.push(attr(e, "name").unwrap_or_default());
            }
            TAG_TEST => {
                if self.current_test.is_none() {
                    self.current_test = Some(PendingTest {
                        name: attr(e, "name").unwrap_or_else(|| UNNAMED_TEST.to_string()),
                        suite: self.suites.last().filter(|s| !s.is_empty()).cloned(),
                        depth: self.stack.len() + 1,
                        status: None,
                        message: String::new(),
                    });
                    if empty {
                        self.finish_test();
                    }
                }
            }
            TAG_STATUS if parent.as_deref() == Some(TAG_TEST) => {
                let depth = self.stack.len();
                if let Some(test) = self.current_test.as_mut() {
                    if test.depth == depth && test.status.is_none() {
                        test.status = Some(StatusAttrs {
                            status: attr(e, "status"),
                            starttime: attr(e, "starttime"),
                            endtime: attr(e, "endtime"),
                            start: attr(e, "start"),
                            elapsed: attr(e, "elapsed"),
                        });
                        if !empty {
                            self.text_target = Some(TextTarget::StatusMessage);
                        }
                    }
                }
            }
            TAG_STAT if self.in_total_statistics() => {
                self.current_stat = Some(PendingStat {
                    name: attr(e, "name"),
                    pass_attr: attr(e, "pass"),
                    fail_attr: attr(e, "fail"),
                    skip_attr: attr(e, "skip"),
                    ..Default::default()
                });
                if empty {
                    self.finish_stat();
                } else {
                    self.text_target = Some(TextTarget::StatLabel);
                }
            }
            TAG_TOTAL | TAG_PASS | TAG_FAIL
                if !empty && parent.as_deref() == Some(TAG_STAT) && self.current_stat.is_some() =>
            {
                let field = match name.as_str() {
                    TAG_TOTAL => CountField::Total,
                    TAG_PASS => CountField::Pass,
                    _ => CountField::Fail,
                };
                self.text_target = Some(TextTarget::StatCount(field));
            }
            _ => (),
        }

        if !empty {
            self.stack.push(name);
        }
    }

    fn close(&mut self, name: &str) {
        let depth = self.stack.len();
        self.stack.pop();

        match name {
            TAG_SUITE => {
                self.suites.pop();
            }
            TAG_TEST => {
                if self.current_test.as_ref().map(|t| t.depth) == Some(depth) {
                    self.finish_test();
                }
            }
            TAG_STATUS => {
                if self.text_target == Some(TextTarget::StatusMessage) {
                    self.text_target = None;
                }
            }
            TAG_TOTAL | TAG_PASS | TAG_FAIL => {
                if matches!(self.text_target, Some(TextTarget::StatCount(_))) {
                    self.text_target = Some(TextTarget::StatLabel);
                }
            }
            TAG_STAT => {
                if self.current_stat.is_some() {
                    self.finish_stat();
                }
            }
            _ => (),
        }
    }

    fn text(&mut self, text: &str) {
        match self.text_target {
            Some(TextTarget::StatusMessage) => {
                if let Some(test) = self.current_test.as_mut() {
                    test.message.push_str(text);
                }
            }
            Some(TextTarget::StatLabel) => {
                if let Some(stat) = self.current_stat.as_mut() {
                    stat.label.push_str(text);
                }
            }
            Some(TextTarget::StatCount(field)) => {
                if let Some(stat) = self.current_stat.as_mut() {
                    let slot = match field {
                        CountField::Total => &mut stat.total,
                        CountField::Pass => &mut stat.pass,
                        CountField::Fail => &mut stat.fail,
                    };
                    slot.get_or_insert_with(String::new).push_str(text);
                }
            }
            None => (),
        }
    }

    fn finish(self) -> Result<ParsedReport, String> {
        if let Some(open) = self.stack.last() {
            return Err(format!("unexpected end of document inside <{}>", open));
        }
        if !self.saw_root {
            return Err("document has no root element".to_string());
        }

        Ok(ParsedReport {
            records: self.records,
            summary: self.summary,
            skipped: self.skipped,
        })
    }

    /// True when the open elements end with `statistics/total`.
    fn in_total_statistics(&self) -> bool {
        let n = self.stack.len();
        n >= 2 && self.stack[n - 1] == TAG_TOTAL && self.stack[n - 2] == TAG_STATISTICS
    }

    fn finish_test(&mut self) {
        let Some(pending) = self.current_test.take() else {
            return;
        };
        self.text_target = None;

        match build_record(&pending) {
            Ok(record) => self.records.push(record),
            Err(e) => {
                warn!("Skipping test '{}': {}", pending.name, e);
                self.skipped += 1;
            }
        }
    }

    fn finish_stat(&mut self) {
        let Some(stat) = self.current_stat.take() else {
            return;
        };
        self.text_target = None;

        let is_all_tests = stat.name.as_deref() == Some(ALL_TESTS) || stat.label.trim() == ALL_TESTS;
        if !is_all_tests || self.summary.is_some() {
            return;
        }

        let has_children = stat.total.is_some() || stat.pass.is_some() || stat.fail.is_some();
        let counts = if has_children {
            let passed = parse_count(stat.pass.as_deref());
            let failed = parse_count(stat.fail.as_deref());
            let total = match stat.total.as_deref() {
                Some(total) => parse_count(Some(total)),
                None => passed + failed,
            };
            SummaryCounts {
                total,
                passed,
                failed,
            }
        } else {
            let passed = parse_count(stat.pass_attr.as_deref());
            let failed = parse_count(stat.fail_attr.as_deref());
            let skipped = parse_count(stat.skip_attr.as_deref());
            SummaryCounts {
                total: passed + failed + skipped,
                passed,
                failed,
            }
        };

        debug!(
            "Found statistics block: total={}, passed={}, failed={}",
            counts.total, counts.passed, counts.failed
        );
        self.summary = Some(counts);
    }
}

fn attr(e: &BytesStart, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_count(value: Option<&str>) -> usize {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

fn first_line(text: &str) -> String {
    text.trim().lines().next().unwrap_or("").trim().to_string()
}

fn build_record(pending: &PendingTest) -> Result<TestCaseResult, RecordError> {
    let status = pending.status.as_ref().ok_or(RecordError::MissingStatus)?;
    let (start_time, end_time) = status_times(status)?;

    if end_time < start_time {
        return Err(RecordError::NegativeDuration);
    }
    let duration_seconds = (end_time - start_time)
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or_else(|| (end_time - start_time).num_milliseconds() as f64 / 1000.0);

    let status_value = TestStatus::from(status.status.as_deref().unwrap_or("UNKNOWN"));
    let message = if status_value == TestStatus::Pass {
        String::new()
    } else {
        first_line(&pending.message)
    };

    Ok(TestCaseResult {
        name: pending.name.clone(),
        suite_name: pending.suite.clone(),
        status: status_value,
        start_time,
        end_time,
        duration_seconds,
        message,
    })
}

/// Start and end of a test from either timestamp style.
fn status_times(status: &StatusAttrs) -> Result<(NaiveDateTime, NaiveDateTime), RecordError> {
    if status.starttime.is_some() || status.endtime.is_some() {
        let start = status
            .starttime
            .as_deref()
            .ok_or(RecordError::MissingTimestamp("starttime"))?;
        let end = status
            .endtime
            .as_deref()
            .ok_or(RecordError::MissingTimestamp("endtime"))?;
        return Ok((parse_timestamp(start)?, parse_timestamp(end)?));
    }

    let start = status
        .start
        .as_deref()
        .ok_or(RecordError::MissingTimestamp("starttime"))?;
    let elapsed = status
        .elapsed
        .as_deref()
        .ok_or(RecordError::MissingTimestamp("endtime"))?;

    let start_time = NaiveDateTime::parse_from_str(start.trim(), ISO_TIMESTAMP_FORMAT)
        .map_err(|_| RecordError::InvalidTimestamp(start.to_string()))?;
    let seconds: f64 = elapsed
        .trim()
        .parse()
        .map_err(|_| RecordError::InvalidTimestamp(elapsed.to_string()))?;
    if !seconds.is_finite() {
        return Err(RecordError::InvalidTimestamp(elapsed.to_string()));
    }
    if seconds < 0.0 {
        return Err(RecordError::NegativeDuration);
    }
    let micros = (seconds * 1_000_000.0).round();
    if micros >= i64::MAX as f64 {
        return Err(RecordError::InvalidTimestamp(elapsed.to_string()));
    }
    let end_time = start_time
        .checked_add_signed(Duration::microseconds(micros as i64))
        .ok_or_else(|| RecordError::InvalidTimestamp(elapsed.to_string()))?;

    Ok((start_time, end_time))
}
