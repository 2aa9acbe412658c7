//! High-level pipeline API: load rows, resolve groups, enrich.
//!
//! # Example
//!
//! ```rust,ignore
//! use screener::transform::pipeline::{enrich_file, EnrichOptions};
//! use screener::ReportType;
//! use std::path::Path;
//!
//! let options = EnrichOptions {
//!     report_type: Some(ReportType::Legacy),
//!     ..Default::default()
//! };
//! let result = enrich_file(Path::new("screener_legacy_fo.json"), options)?;
//! println!("Enriched {} rows", result.summary.row_count);
//! ```

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::enrich::enrich_json;
use crate::api::logs::{log_info, log_success, log_warning, log_warning_indent};
use crate::config::ReportGroups;
use crate::error::PipelineResult;
use crate::models::{Group, ReportType};
use crate::parser::{load_rows, parse_rows_auto, ParseResult};
use crate::validation::validate_screener_rows;

/// Options for the enrichment pipeline
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Report type whose groups are used; with neither this nor `groups`
    /// set, rows get no per-group fields
    pub report_type: Option<ReportType>,

    /// Explicit groups, bypassing the report type lookup
    pub groups: Option<Vec<Group>>,

    /// Report-groups file overriding the built-in groups
    pub groups_file: Option<PathBuf>,

    /// Check rows against the row schema before enriching (warnings only)
    pub validate: bool,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            report_type: None,
            groups: None,
            groups_file: None,
            validate: true,
        }
    }
}

/// Result of an enrichment run
#[derive(Debug, Clone, Serialize)]
pub struct EnrichResult {
    /// Enriched rows, in input order
    pub rows: Vec<Value>,

    pub summary: EnrichSummary,

    /// Parsing metadata, when rows were read from a file or bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichSummary {
    pub row_count: usize,
    pub group_count: usize,
    /// Rows where `all_long`/`all_short` are set
    pub rows_with_aggregates: usize,
    /// Rows where `all_change_long`/`all_change_short` are set
    pub rows_with_change_aggregates: usize,
}

/// Input file information
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// Enrich the rows of a file (JSON array or CSV).
pub fn enrich_file(path: &Path, options: EnrichOptions) -> PipelineResult<EnrichResult> {
    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = load_rows(path)?;
    enrich_parsed(parsed, &options)
}

/// Same as [`enrich_file`] for raw bytes (uploads).
pub fn enrich_bytes(bytes: &[u8], options: EnrichOptions) -> PipelineResult<EnrichResult> {
    log_info(format!("📖 Reading {} bytes...", bytes.len()));
    let parsed = parse_rows_auto(bytes)?;
    enrich_parsed(parsed, &options)
}

/// Enrich already-parsed rows with the given groups.
pub fn enrich_records(mut rows: Vec<Value>, groups: &[Group]) -> EnrichResult {
    log_info(format!(
        "⚙️  Enriching {} rows with {} groups...",
        rows.len(),
        groups.len()
    ));
    enrich_json(&mut rows, groups);

    let summary = summarize(&rows, groups.len());
    log_success(format!(
        "{} rows enriched ({} with aggregates, {} with change aggregates)",
        summary.row_count, summary.rows_with_aggregates, summary.rows_with_change_aggregates
    ));

    EnrichResult {
        rows,
        summary,
        source: None,
    }
}

/// Groups to use for a run.
///
/// Explicit groups win, then the groups file, then the built-in groups.
/// Without a report type there is nothing to look up and the list is empty.
pub fn resolve_groups(options: &EnrichOptions) -> PipelineResult<Vec<Group>> {
    if let Some(ref groups) = options.groups {
        return Ok(groups.clone());
    }
    let Some(report_type) = options.report_type else {
        log_warning("No groups or report type given; only aggregates will be written");
        return Ok(Vec::new());
    };

    let registry = match options.groups_file {
        Some(ref path) => {
            log_info(format!("Using groups file: {}", path.display()));
            ReportGroups::defaults().merged(ReportGroups::from_file(path)?)
        }
        None => ReportGroups::defaults(),
    };

    let groups = registry.get(report_type).to_vec();
    if groups.is_empty() {
        log_warning(format!(
            "No groups configured for {}; only aggregates will be written",
            report_type
        ));
    }
    Ok(groups)
}

fn enrich_parsed(parsed: ParseResult, options: &EnrichOptions) -> PipelineResult<EnrichResult> {
    log_success(format!("Read {} rows", parsed.records.len()));
    if parsed.delimiter != ',' {
        log_success(format!("Detected separator: '{}'", parsed.delimiter));
    }

    if options.validate {
        check_rows(&parsed.records);
    }

    let groups = resolve_groups(options)?;
    let source = SourceInfo {
        encoding: parsed.encoding,
        delimiter: parsed.delimiter,
        headers: parsed.headers,
    };

    let mut result = enrich_records(parsed.records, &groups);
    result.source = Some(source);
    Ok(result)
}

/// Log schema violations. Enrichment still runs; bad values become nulls.
fn check_rows(rows: &[Value]) {
    log_info("✔️  Validating rows...");
    let doc = Value::Array(rows.to_vec());
    match validate_screener_rows(&doc) {
        Ok(()) => log_success("All rows valid"),
        Err(errors) => {
            log_warning(format!("{} schema violations", errors.len()));
            for err in errors.iter().take(3) {
                log_warning_indent(format!("• {}", err), 1);
            }
        }
    }
}

fn summarize(rows: &[Value], group_count: usize) -> EnrichSummary {
    let has = |row: &Value, key: &str| row.get(key).is_some_and(|v| !v.is_null());

    EnrichSummary {
        row_count: rows.len(),
        group_count,
        rows_with_aggregates: rows.iter().filter(|r| has(r, "all_long")).count(),
        rows_with_change_aggregates: rows.iter().filter(|r| has(r, "all_change_long")).count(),
    }
}
