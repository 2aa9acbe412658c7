//! Flat row shape used by the screener data source and the UI.
//!
//! Rows travel as JSON objects whose per-group columns are prefixed with the
//! group key:
//!
//! ```text
//! { "open_interest": 1000, "g1_long": 300, "g1_short": 100, "g1_total": 400, ... }
//! ```
//!
//! This module is the only place that builds those column names. The rest of
//! the crate works on [`GroupPositions`] / [`GroupMetrics`].

use serde_json::{Map, Number, Value};

use crate::models::{AllAggregates, Group, GroupMetrics, GroupPositions, ScreenerRow};

pub const OPEN_INTEREST: &str = "open_interest";

const AGGREGATE_COLUMNS: [&str; 5] = [
    "all_long",
    "all_short",
    "all_change_long",
    "all_change_short",
    "all_short_ratio",
];

const METRIC_SUFFIXES: [&str; 5] = [
    "total",
    "short_ratio",
    "change_total",
    "pct_oi_total",
    "pct_oi_total_change",
];

const POSITION_SUFFIXES: [&str; 4] = ["long", "short", "change_long", "change_short"];

fn column(key: &str, suffix: &str) -> String {
    format!("{}_{}", key, suffix)
}

/// Read a numeric column. Absent, null and non-numeric values read as `None`.
pub fn read_number(map: &Map<String, Value>, name: &str) -> Option<f64> {
    map.get(name).and_then(Value::as_f64)
}

/// Read the raw positions of a group.
pub fn read_positions(map: &Map<String, Value>, key: &str) -> GroupPositions {
    GroupPositions {
        long: read_number(map, &column(key, "long")),
        short: read_number(map, &column(key, "short")),
        change_long: read_number(map, &column(key, "change_long")),
        change_short: read_number(map, &column(key, "change_short")),
    }
}

/// Write the derived columns of a group, overwriting previous values.
pub fn write_metrics(map: &mut Map<String, Value>, key: &str, metrics: &GroupMetrics) {
    let values = [
        metrics.total,
        metrics.short_ratio,
        metrics.change_total,
        metrics.pct_oi_total,
        metrics.pct_oi_total_change,
    ];
    for (suffix, value) in METRIC_SUFFIXES.iter().zip(values) {
        map.insert(column(key, suffix), number_or_null(value));
    }
}

/// Write the `all_*` columns, overwriting previous values.
pub fn write_aggregates(map: &mut Map<String, Value>, aggregates: &AllAggregates) {
    let values = [
        aggregates.all_long,
        aggregates.all_short,
        aggregates.all_change_long,
        aggregates.all_change_short,
        aggregates.all_short_ratio,
    ];
    for (name, value) in AGGREGATE_COLUMNS.iter().zip(values) {
        map.insert((*name).to_string(), number_or_null(value));
    }
}

/// JSON number for `v`, integral values stay integers (`400`, not `400.0`).
pub fn number_value(v: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if v.fract() == 0.0 && v.abs() <= MAX_SAFE {
        Value::from(v as i64)
    } else {
        Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn number_or_null(v: Option<f64>) -> Value {
    v.map(number_value).unwrap_or(Value::Null)
}

impl ScreenerRow {
    /// Build a structured row from a flat JSON object.
    ///
    /// Derived columns already present for `groups` are dropped, they are
    /// recomputed by enrichment. Non-object values produce an empty row.
    pub fn from_flat(value: &Value, groups: &[Group]) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };

        let mut extra = map.clone();
        for name in AGGREGATE_COLUMNS {
            extra.remove(name);
        }

        let mut positions = std::collections::BTreeMap::new();
        for group in groups {
            for suffix in METRIC_SUFFIXES {
                extra.remove(&column(&group.key, suffix));
            }
            positions.insert(group.key.clone(), read_positions(map, &group.key));
        }

        Self {
            open_interest: read_number(map, OPEN_INTEREST),
            positions,
            metrics: Default::default(),
            aggregates: AllAggregates::default(),
            extra,
        }
    }

    /// Flatten back to the external shape.
    ///
    /// Raw columns absent from the source stay absent unless a value was set
    /// on the structured row.
    pub fn to_flat(&self) -> Value {
        let mut map = self.extra.clone();

        if let Some(oi) = self.open_interest {
            map.insert(OPEN_INTEREST.to_string(), number_value(oi));
        }

        for (key, positions) in &self.positions {
            let values = [
                positions.long,
                positions.short,
                positions.change_long,
                positions.change_short,
            ];
            for (suffix, value) in POSITION_SUFFIXES.iter().zip(values) {
                if let Some(v) = value {
                    map.insert(column(key, suffix), number_value(v));
                }
            }
        }

        for (key, metrics) in &self.metrics {
            write_metrics(&mut map, key, metrics);
        }
        write_aggregates(&mut map, &self.aggregates);

        Value::Object(map)
    }
}
