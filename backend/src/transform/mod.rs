//! Transformation module.
//!
//! - Enrich: derived per-group columns and cross-group aggregates
//! - Flat: mapping between flat JSON rows and structured rows
//! - Pipeline: load, resolve groups, enrich, summarize

pub mod enrich;
pub mod flat;
pub mod pipeline;

pub use enrich::{enrich_json, enrich_row, enrich_rows};
pub use pipeline::{
    enrich_bytes, enrich_file, enrich_records, resolve_groups, EnrichOptions, EnrichResult,
    EnrichSummary,
};
