//! Domain models for the screener.
//!
//! This module contains the core data structures used throughout the backend:
//!
//! - [`Group`] - Trader category of a report (key, display names, role)
//! - [`ReportType`] / [`Subtype`] - CFTC report family and variant
//! - [`GroupPositions`] - Raw long/short counts of one group in one row
//! - [`GroupMetrics`] - Derived per-group columns
//! - [`AllAggregates`] - Derived all-groups columns
//! - [`ScreenerRow`] - One instrument row with structured per-group records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// =============================================================================
// Report Type / Subtype
// =============================================================================

/// CFTC report family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    /// Legacy report (speculators, commercials, small traders).
    Legacy,
    /// Disaggregated report.
    Disagg,
    /// Traders in Financial Futures.
    Tff,
}

impl ReportType {
    /// All report types, in display order.
    pub const ALL: [ReportType; 3] = [ReportType::Legacy, ReportType::Disagg, ReportType::Tff];

    /// Short identifier used in file names and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Disagg => "disagg",
            Self::Tff => "tff",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Legacy => "Legacy",
            Self::Disagg => "Disaggregated",
            Self::Tff => "Traders in Financial Futures",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "disagg" => Ok(Self::Disagg),
            "tff" => Ok(Self::Tff),
            _ => Err(ConfigError::UnknownReportType(s.to_string())),
        }
    }
}

/// Report variant: futures only or futures and options combined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Subtype {
    /// Futures only.
    Fo,
    /// Futures + options combined.
    Co,
}

impl Subtype {
    /// All subtypes.
    pub const ALL: [Subtype; 2] = [Subtype::Fo, Subtype::Co];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fo => "fo",
            Self::Co => "co",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fo => "Futures Only",
            Self::Co => "Futures + Options Combined",
        }
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subtype {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fo" => Ok(Self::Fo),
            "co" => Ok(Self::Co),
            _ => Err(ConfigError::UnknownSubtype(s.to_string())),
        }
    }
}

// =============================================================================
// Group
// =============================================================================

/// Market role of a trader group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    /// Hedgers (producers, merchants, dealers).
    Commercial,
    /// Large speculators and funds.
    Speculative,
    /// Non-reportable small traders.
    Small,
}

/// A trader category reported for every market.
///
/// Only `key` takes part in enrichment: it addresses the `{key}_long`,
/// `{key}_short`, ... columns of a row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    /// Column prefix, e.g. `g1`.
    pub key: String,
    /// Display name, e.g. "Managed Money".
    #[serde(default)]
    pub name: String,
    /// Abbreviation used in signal lists, e.g. "MM".
    #[serde(default)]
    pub short: String,
    #[serde(default)]
    pub role: Option<GroupRole>,
    /// Whether the report publishes spreading positions for this group.
    #[serde(default)]
    pub has_spread: bool,
}

impl Group {
    /// Create a group with only a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: String::new(),
            short: String::new(),
            role: None,
            has_spread: false,
        }
    }

    /// Create a fully described group.
    pub fn described(
        key: &str,
        name: &str,
        short: &str,
        role: GroupRole,
        has_spread: bool,
    ) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            short: short.to_string(),
            role: Some(role),
            has_spread,
        }
    }
}

// =============================================================================
// Row records
// =============================================================================

/// Raw positions of one group in one row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupPositions {
    pub long: Option<f64>,
    pub short: Option<f64>,
    pub change_long: Option<f64>,
    pub change_short: Option<f64>,
}

impl GroupPositions {
    /// Positions with long/short only.
    pub fn new(long: f64, short: f64) -> Self {
        Self {
            long: Some(long),
            short: Some(short),
            change_long: None,
            change_short: None,
        }
    }

    /// Attach week-over-week changes.
    pub fn with_changes(mut self, change_long: f64, change_short: f64) -> Self {
        self.change_long = Some(change_long);
        self.change_short = Some(change_short);
        self
    }

    /// Long and short, when both are present.
    pub fn long_short(&self) -> Option<(f64, f64)> {
        Some((self.long?, self.short?))
    }

    /// Change long and change short, when both are present.
    pub fn changes(&self) -> Option<(f64, f64)> {
        Some((self.change_long?, self.change_short?))
    }
}

/// Derived columns for one group.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupMetrics {
    pub total: Option<f64>,
    pub short_ratio: Option<f64>,
    pub change_total: Option<f64>,
    pub pct_oi_total: Option<f64>,
    pub pct_oi_total_change: Option<f64>,
}

/// Derived columns across all groups of a row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AllAggregates {
    pub all_long: Option<f64>,
    pub all_short: Option<f64>,
    pub all_change_long: Option<f64>,
    pub all_change_short: Option<f64>,
    pub all_short_ratio: Option<f64>,
}

/// One screener row.
///
/// Per-group inputs live in [`GroupPositions`] keyed by group key, derived
/// values in [`GroupMetrics`]. Every other column (code, name, category,
/// signals, ...) is kept verbatim in `extra`. See [`crate::transform::flat`]
/// for the conversion from and to the flat `{key}_{field}` shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenerRow {
    pub open_interest: Option<f64>,
    pub positions: BTreeMap<String, GroupPositions>,
    pub metrics: BTreeMap<String, GroupMetrics>,
    pub aggregates: AllAggregates,
    pub extra: Map<String, Value>,
}

impl ScreenerRow {
    /// Row with the given open interest and no groups.
    pub fn new(open_interest: Option<f64>) -> Self {
        Self {
            open_interest,
            ..Self::default()
        }
    }

    /// Builder-style helper to add a group's positions.
    pub fn with_group(mut self, key: impl Into<String>, positions: GroupPositions) -> Self {
        self.positions.insert(key.into(), positions);
        self
    }

    /// Derived columns of a group, if enrichment has run for it.
    pub fn metrics_for(&self, key: &str) -> Option<&GroupMetrics> {
        self.metrics.get(key)
    }
}
