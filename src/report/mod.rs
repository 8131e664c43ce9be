//! Report rendering.

pub mod export;
pub mod generator;

pub use export::{render_export, write_export, ExportDocument};
pub use generator::{generate_json_report, generate_markdown_report, summary_line, ReportMetadata};
