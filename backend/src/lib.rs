//! # Screener - Commitment of Traders screener rows
//!
//! Builds one row per market from weekly CFTC positioning data, derives
//! per-group totals, short ratios and `% of open interest`, aggregates all
//! groups, and serves the result from stored snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ weeks JSON  │────▶│   Builder   │────▶│  Snapshot   │────▶│  Enricher   │──▶ API / CLI
//! │ / CSV rows  │     │ (raw rows)  │     │   store     │     │ (+ cache)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use screener::{enrich_json, Group};
//! use serde_json::json;
//!
//! let mut rows = vec![json!({ "open_interest": 1000, "comm_long": 300, "comm_short": 100 })];
//! enrich_json(&mut rows, &[Group::new("comm")]);
//! assert_eq!(rows[0]["comm_pct_oi_total"], 40);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types
//! - [`models`] - Report types, groups, structured rows
//! - [`transform`] - Enrichment, flat row codec, pipeline
//! - [`calculator`] - Weekly nets, COT indices, crowded levels, stats
//! - [`builder`] - Raw screener rows from computed weeks
//! - [`config`] - Settings, report groups, market categories
//! - [`parser`] / [`export`] - Row input (JSON/CSV) and CSV output
//! - [`validation`] - JSON Schema checks
//! - [`cache`] - Snapshot store and TTL cache
//! - [`api`] - HTTP server and log streaming

// Core modules
pub mod error;
pub mod models;

// Input / output
pub mod export;
pub mod parser;

// Computation
pub mod builder;
pub mod calculator;
pub mod transform;

pub mod config;
pub mod validation;

pub mod cache;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{
    ConfigError, ConfigResult, PipelineError, PipelineResult, ServerError, ServerResult,
    StoreError, StoreResult,
};

pub use models::{
    AllAggregates, Group, GroupMetrics, GroupPositions, GroupRole, ReportType, ScreenerRow,
    Subtype,
};

pub use transform::{
    enrich_bytes, enrich_file, enrich_json, enrich_records, enrich_row, enrich_rows,
    resolve_groups, EnrichOptions, EnrichResult, EnrichSummary,
};

pub use builder::{
    build_market_detail, build_market_meta, build_screener_entry, build_screener_row,
    categorize_market, MarketRef,
};

pub use calculator::{CotAnalytics, CotCalculator, CrowdedThresholds, Signal};

pub use config::{
    default_market_categories, default_report_groups, MarketCategory, ReportGroups, Settings,
};

pub use parser::{load_rows, parse_rows_auto, ParseError, ParseResult};

pub use export::{rows_to_csv, rows_to_csv_string, ExportError};

pub use cache::{SnapshotStore, TtlCache};

pub use api::start_server;
