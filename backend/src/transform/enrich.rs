//! Row enrichment: per-group totals, short ratios, OI percentages and
//! all-groups aggregates.
//!
//! # Columns
//!
//! ```text
//! per group g                          per row
//! ┌──────────────────────────────┐     ┌──────────────────────────────┐
//! │ g_total        = long + short │     │ all_long / all_short         │
//! │ g_short_ratio  = short / total│     │ all_change_long / _short     │
//! │ g_change_total = cl + cs      │     │ all_short_ratio              │
//! │ g_pct_oi_total(_change)       │     └──────────────────────────────┘
//! └──────────────────────────────┘
//! ```
//!
//! Every missing input yields a null output. Zero or missing open interest
//! disables the percentage columns, a non-positive total disables the short
//! ratio. Nothing here can fail.
//!
//! The all-groups sums include only groups that supplied both members of a
//! pair; one complete group is enough to make the aggregate non-null.

use serde_json::Value;

use crate::models::{AllAggregates, Group, GroupMetrics, GroupPositions, ScreenerRow};

use super::flat::{read_number, read_positions, write_aggregates, write_metrics, OPEN_INTEREST};

/// Enrich structured rows in place and hand the same slice back.
///
/// Groups are read in order. With no groups only the aggregates are written,
/// all null.
pub fn enrich_rows<'a>(rows: &'a mut [ScreenerRow], groups: &[Group]) -> &'a mut [ScreenerRow] {
    for row in rows.iter_mut() {
        enrich_row(row, groups);
    }
    rows
}

/// Enrich a single structured row.
pub fn enrich_row(row: &mut ScreenerRow, groups: &[Group]) {
    let mut totals = Aggregator::default();

    for group in groups {
        let positions = row.positions.get(&group.key).copied().unwrap_or_default();
        let metrics = group_metrics(&positions, row.open_interest);
        row.metrics.insert(group.key.clone(), metrics);
        totals.add(&positions);
    }

    row.aggregates = totals.finish();
}

/// Enrich flat JSON rows (`{key}_long`, `{key}_short`, ...) in place.
///
/// Rows that are not JSON objects are left as they are.
pub fn enrich_json<'a>(rows: &'a mut [Value], groups: &[Group]) -> &'a mut [Value] {
    for row in rows.iter_mut() {
        let Some(map) = row.as_object_mut() else {
            continue;
        };

        let open_interest = read_number(map, OPEN_INTEREST);
        let mut totals = Aggregator::default();

        for group in groups {
            let positions = read_positions(map, &group.key);
            let metrics = group_metrics(&positions, open_interest);
            write_metrics(map, &group.key, &metrics);
            totals.add(&positions);
        }

        write_aggregates(map, &totals.finish());
    }
    rows
}

/// Derived columns for one group.
pub fn group_metrics(positions: &GroupPositions, open_interest: Option<f64>) -> GroupMetrics {
    let total = positions.long_short().map(|(long, short)| long + short);
    let short_ratio = match (total, positions.short) {
        (Some(total), Some(short)) if total > 0.0 => Some(short / total),
        _ => None,
    };
    let change_total = positions.changes().map(|(cl, cs)| cl + cs);

    let oi = truthy(open_interest);

    GroupMetrics {
        total,
        short_ratio,
        change_total,
        pct_oi_total: total.zip(oi).map(|(t, oi)| pct_of_oi(t, oi)),
        pct_oi_total_change: change_total.zip(oi).map(|(c, oi)| pct_of_oi(c, oi)),
    }
}

/// Percentage of open interest with one decimal.
///
/// `oi` must be non-zero.
pub fn pct_of_oi(value: f64, oi: f64) -> f64 {
    round_half_up(value / oi * 1000.0) / 10.0
}

/// Round to the nearest integer, halves towards positive infinity.
///
/// `2.5 -> 3`, `-2.5 -> -2`.
pub fn round_half_up(x: f64) -> f64 {
    // `(x + 0.5).floor()` misrounds 0.49999999999999994 since the sum rounds up to 1.0
    let r = x.round();
    if r - x == -0.5 {
        r + 1.0
    } else {
        r
    }
}

/// Open interest usable as a denominator: zero and NaN count as missing.
fn truthy(open_interest: Option<f64>) -> Option<f64> {
    open_interest.filter(|oi| *oi != 0.0 && !oi.is_nan())
}

/// Running all-groups sums for one row.
#[derive(Debug, Default)]
struct Aggregator {
    long: f64,
    short: f64,
    valid: bool,
    change_long: f64,
    change_short: f64,
    change_valid: bool,
}

impl Aggregator {
    fn add(&mut self, positions: &GroupPositions) {
        if let Some((long, short)) = positions.long_short() {
            self.long += long;
            self.short += short;
            self.valid = true;
        }
        if let Some((cl, cs)) = positions.changes() {
            self.change_long += cl;
            self.change_short += cs;
            self.change_valid = true;
        }
    }

    fn finish(self) -> AllAggregates {
        let all_short_ratio = if self.valid && self.long + self.short > 0.0 {
            Some(self.short / (self.long + self.short))
        } else {
            None
        };

        AllAggregates {
            all_long: self.valid.then_some(self.long),
            all_short: self.valid.then_some(self.short),
            all_change_long: self.change_valid.then_some(self.change_long),
            all_change_short: self.change_valid.then_some(self.change_short),
            all_short_ratio,
        }
    }
}
