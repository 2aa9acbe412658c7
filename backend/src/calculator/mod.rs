//! Weekly COT analytics computed from raw report rows.
//!
//! Raw rows come straight from the CFTC tables, newest first. Each one
//! becomes a computed week holding net positions, net changes and `% net OI`
//! per group, then the series pass adds:
//!
//! ```text
//! cot_index_{g}_{3m,1y,3y}   (net - min) / (max - min) * 100 over 13/52/156 weeks
//! wci_{g}                    same over 26 weeks
//! crowded_{g}                { value: 1y index, signal: BUY | SELL | null }
//! ```
//!
//! Windows start at the current week and reach back into older weeks. A
//! window with fewer than two known nets gives null; a flat window gives 50.
//! Computed weeks are the input of [`crate::builder::build_screener_entry`].

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::Settings;
use crate::models::{Group, GroupRole};

/// COT index windows, in weeks.
pub const COT_INDEX_WINDOWS: [(&str, usize); 3] = [("3m", 13), ("1y", 52), ("3y", 156)];
/// Willco index window, in weeks.
pub const WCI_WEEKS: usize = 26;
/// Weeks covered by the five-year extremes.
pub const EXTREMES_5Y_WEEKS: usize = 260;
/// Weeks covered by the short average.
pub const AVG_13W_WEEKS: usize = 13;

const INDEX_MIDPOINT: f64 = 50.0;

/// COT index levels at which a group counts as crowded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrowdedThresholds {
    /// Index at or above this is crowded long.
    pub buy: f64,
    /// Index at or below this is crowded short.
    pub sell: f64,
}

impl Default for CrowdedThresholds {
    fn default() -> Self {
        Self {
            buy: 80.0,
            sell: 20.0,
        }
    }
}

/// Crowded-level signal of a group.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Computed weeks (newest first) and summary statistics of one market.
#[derive(Debug, Clone, Serialize)]
pub struct CotAnalytics {
    pub weeks: Vec<Value>,
    /// `{max, min, max_5y, min_5y, avg_13w}`, each mapping a field to a
    /// number or null; an empty object when there are no weeks.
    pub stats: Value,
}

/// Computes weekly analytics for any report type.
#[derive(Debug, Clone, Default)]
pub struct CotCalculator {
    thresholds: CrowdedThresholds,
}

impl CotCalculator {
    pub fn new(thresholds: CrowdedThresholds) -> Self {
        Self { thresholds }
    }

    /// Calculator using the crowded thresholds of the settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.crowded)
    }

    pub fn thresholds(&self) -> CrowdedThresholds {
        self.thresholds
    }

    /// Compute weeks and stats from raw rows sorted newest first.
    pub fn compute(&self, rows: &[Value], groups: &[Group]) -> CotAnalytics {
        let mut weeks: Vec<Map<String, Value>> =
            rows.iter().map(|row| build_week(row, groups)).collect();
        self.compute_indices(&mut weeks, groups);

        let weeks: Vec<Value> = weeks.into_iter().map(Value::Object).collect();
        let stats = compute_stats(&weeks, groups);
        CotAnalytics { weeks, stats }
    }

    /// BUY/SELL reading of a COT index for a group role.
    ///
    /// Commercials follow the index; speculators and small traders are read
    /// against it. Groups without a role never signal.
    pub fn determine_signal(&self, cot_index: f64, role: Option<GroupRole>) -> Option<Signal> {
        let high = cot_index >= self.thresholds.buy;
        let low = cot_index <= self.thresholds.sell;

        match role? {
            GroupRole::Commercial if high => Some(Signal::Buy),
            GroupRole::Commercial if low => Some(Signal::Sell),
            GroupRole::Speculative | GroupRole::Small if high => Some(Signal::Sell),
            GroupRole::Speculative | GroupRole::Small if low => Some(Signal::Buy),
            _ => None,
        }
    }

    fn compute_indices(&self, weeks: &mut [Map<String, Value>], groups: &[Group]) {
        for group in groups {
            let gk = group.key.as_str();
            let net_key = format!("{}_net", gk);
            let nets: Vec<Option<f64>> = weeks.iter().map(|w| number(w, &net_key)).collect();

            for (i, week) in weeks.iter_mut().enumerate() {
                let Some(current) = nets[i] else {
                    for (suffix, _) in COT_INDEX_WINDOWS {
                        week.insert(format!("cot_index_{}_{}", gk, suffix), Value::Null);
                    }
                    week.insert(format!("wci_{}", gk), Value::Null);
                    week.insert(format!("crowded_{}", gk), json!({ "value": null, "signal": null }));
                    continue;
                };

                let mut index_1y = None;
                for (suffix, len) in COT_INDEX_WINDOWS {
                    let index = cot_index(current, window(&nets, i, len));
                    if suffix == "1y" {
                        index_1y = index;
                    }
                    week.insert(format!("cot_index_{}_{}", gk, suffix), opt_number(index));
                }

                let wci = cot_index(current, window(&nets, i, WCI_WEEKS));
                week.insert(format!("wci_{}", gk), opt_number(wci));

                let crowded = match index_1y {
                    Some(index) => {
                        let signal = self.determine_signal(index, group.role);
                        json!({ "value": index, "signal": signal.map(|s| s.as_str()) })
                    }
                    None => json!({ "value": null, "signal": null }),
                };
                week.insert(format!("crowded_{}", gk), crowded);
            }
        }
    }
}

/// One computed week: date, open interest and per-group nets and changes.
///
/// Reads `report_date` (or `date`), `open_interest`, `oi_change` and
/// `{g}_long`, `{g}_short`, `{g}_long_change`, `{g}_short_change`.
pub fn build_week(row: &Value, groups: &[Group]) -> Map<String, Value> {
    let oi = row
        .get("open_interest")
        .and_then(Value::as_f64)
        .filter(|v| *v != 0.0 && !v.is_nan());
    let oi_change = row.get("oi_change").and_then(Value::as_f64);
    let date = row
        .get("report_date")
        .or_else(|| row.get("date"))
        .cloned()
        .unwrap_or(Value::Null);

    let mut week = Map::new();
    week.insert("date".to_string(), date);
    week.insert("open_interest".to_string(), field(row, "open_interest"));
    week.insert("oi_change".to_string(), field(row, "oi_change"));
    week.insert("oi_pct".to_string(), opt_number(percent_of(oi_change, oi)));

    for group in groups {
        let gk = group.key.as_str();
        let long = row.get(format!("{}_long", gk)).and_then(Value::as_f64);
        let short = row.get(format!("{}_short", gk)).and_then(Value::as_f64);
        let change_long = row.get(format!("{}_long_change", gk)).and_then(Value::as_f64);
        let change_short = row.get(format!("{}_short_change", gk)).and_then(Value::as_f64);

        let net = long.zip(short).map(|(l, s)| l - s);
        let net_change = change_long.zip(change_short).map(|(l, s)| l - s);

        week.insert(format!("{}_long", gk), opt_integer(long));
        week.insert(format!("{}_short", gk), opt_integer(short));
        week.insert(format!("{}_net", gk), opt_integer(net));
        week.insert(format!("{}_change", gk), opt_integer(net_change));
        week.insert(format!("{}_change_long", gk), opt_integer(change_long));
        week.insert(format!("{}_change_short", gk), opt_integer(change_short));
        week.insert(format!("{}_pct_net_oi", gk), opt_number(percent_of(net, oi)));
    }

    week
}

/// Position of `current` between the min and max of `window`, 0 to 100.
///
/// `None` below two known values; 50 when the window is flat.
pub fn cot_index(current: f64, window: &[Option<f64>]) -> Option<f64> {
    let known: Vec<f64> = window.iter().flatten().copied().collect();
    if known.len() < 2 {
        return None;
    }
    let min = known.iter().copied().fold(f64::INFINITY, f64::min);
    let max = known.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max == min {
        return Some(INDEX_MIDPOINT);
    }
    Some(round_one_decimal((current - min) / (max - min) * 100.0))
}

/// Extremes over all weeks and the last five years, plus the 13-week average.
pub fn compute_stats(weeks: &[Value], groups: &[Group]) -> Value {
    if weeks.is_empty() {
        return json!({});
    }

    let mut keys: Vec<(String, bool)> = vec![
        ("open_interest".to_string(), false),
        ("oi_change".to_string(), false),
        ("oi_pct".to_string(), true),
    ];
    for group in groups {
        let gk = group.key.as_str();
        for suffix in ["net", "change", "change_long", "change_short"] {
            keys.push((format!("{}_{}", gk, suffix), false));
        }
        keys.push((format!("{}_pct_net_oi", gk), true));
    }

    let recent_5y = &weeks[..weeks.len().min(EXTREMES_5Y_WEEKS)];
    let recent_13w = &weeks[..weeks.len().min(AVG_13W_WEEKS)];

    let max = |a: &[f64]| a.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = |a: &[f64]| a.iter().copied().fold(f64::INFINITY, f64::min);
    let avg = |a: &[f64]| a.iter().sum::<f64>() / a.len() as f64;

    json!({
        "max": reduce(weeks, &keys, max),
        "min": reduce(weeks, &keys, min),
        "max_5y": reduce(recent_5y, &keys, max),
        "min_5y": reduce(recent_5y, &keys, min),
        "avg_13w": reduce(recent_13w, &keys, avg)
    })
}

/// Apply `f` to the known values of each key; percentages keep one decimal.
fn reduce<F>(weeks: &[Value], keys: &[(String, bool)], f: F) -> Value
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = Map::new();
    for (key, is_pct) in keys {
        let values: Vec<f64> = weeks
            .iter()
            .filter_map(|w| w.get(key).and_then(Value::as_f64))
            .collect();
        let value = if values.is_empty() {
            Value::Null
        } else if *is_pct {
            json!(round_one_decimal(f(&values)))
        } else {
            opt_integer(Some(f(&values)))
        };
        out.insert(key.clone(), value);
    }
    Value::Object(out)
}

/// `nets[i..i + len]`, clipped to the series.
fn window(nets: &[Option<f64>], i: usize, len: usize) -> &[Option<f64>] {
    &nets[i..nets.len().min(i + len)]
}

fn percent_of(value: Option<f64>, oi: Option<f64>) -> Option<f64> {
    value.zip(oi).map(|(v, oi)| round_one_decimal(v / oi * 100.0))
}

fn field(row: &Value, key: &str) -> Value {
    row.get(key).cloned().unwrap_or(Value::Null)
}

fn number(week: &Map<String, Value>, key: &str) -> Option<f64> {
    week.get(key).and_then(Value::as_f64)
}

fn opt_number(value: Option<f64>) -> Value {
    value.map_or(Value::Null, |v| json!(v))
}

fn opt_integer(value: Option<f64>) -> Value {
    value.map_or(Value::Null, |v| json!(v.round() as i64))
}

fn round_one_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_screener_entry, MarketRef};
    use crate::config::default_report_groups;
    use crate::models::ReportType;

    fn g1(role: GroupRole) -> Vec<Group> {
        vec![Group::described("g1", "Group 1", "G1", role, false)]
    }

    /// Raw rows (newest first) whose g1 net equals each given value.
    fn rows_with_nets(nets: &[f64]) -> Vec<Value> {
        nets.iter()
            .enumerate()
            .map(|(i, net)| {
                json!({
                    "report_date": format!("week-{}", i),
                    "open_interest": 2000,
                    "g1_long": net + 100.0,
                    "g1_short": 100
                })
            })
            .collect()
    }

    fn f(week: &Value, key: &str) -> Option<f64> {
        week.get(key).and_then(Value::as_f64)
    }

    #[test]
    fn test_build_week() {
        let row = json!({
            "report_date": "2024-06-04",
            "open_interest": 1000,
            "oi_change": -50,
            "g1_long": 300, "g1_short": 100,
            "g1_long_change": 20, "g1_short_change": 5
        });
        let week = build_week(&row, &g1(GroupRole::Speculative));

        assert_eq!(week["date"], "2024-06-04");
        assert_eq!(week["g1_net"], json!(200));
        assert_eq!(week["g1_change"], json!(15));
        assert_eq!(week["g1_change_long"], json!(20));
        assert_eq!(week["g1_pct_net_oi"].as_f64(), Some(20.0));
        assert_eq!(week["oi_pct"].as_f64(), Some(-5.0));
    }

    #[test]
    fn test_build_week_missing_inputs() {
        let row = json!({ "open_interest": 0, "g1_long": 300, "g1_long_change": 4 });
        let week = build_week(&row, &g1(GroupRole::Speculative));

        assert_eq!(week["g1_long"], json!(300));
        assert!(week["g1_net"].is_null());
        assert!(week["g1_change"].is_null());
        assert!(week["g1_pct_net_oi"].is_null());
        assert!(week["oi_pct"].is_null());
        assert!(week["date"].is_null());
    }

    #[test]
    fn test_pct_net_oi_without_open_interest() {
        let row = json!({ "open_interest": 0, "g1_long": 300, "g1_short": 100 });
        let week = build_week(&row, &g1(GroupRole::Commercial));
        assert_eq!(week["g1_net"], json!(200));
        assert!(week["g1_pct_net_oi"].is_null());
    }

    #[test]
    fn test_cot_index() {
        assert_eq!(cot_index(5.0, &[Some(5.0), Some(0.0), Some(10.0)]), Some(50.0));
        assert_eq!(cot_index(10.0, &[Some(10.0), None, Some(0.0)]), Some(100.0));
        assert_eq!(cot_index(7.0, &[Some(7.0), Some(7.0)]), Some(50.0));
        assert_eq!(cot_index(7.0, &[Some(7.0), None]), None);
        assert_eq!(cot_index(7.0, &[]), None);
    }

    #[test]
    fn test_index_windows_stop_at_their_length() {
        // Week 13 (the 14th) is outside the 3m window but inside 1y
        let mut nets = vec![50.0, 0.0, 100.0];
        nets.extend(std::iter::repeat(25.0).take(10));
        nets.push(1000.0);
        assert_eq!(nets.len(), 14);

        let rows = rows_with_nets(&nets);
        let analytics = CotCalculator::default().compute(&rows, &g1(GroupRole::Speculative));
        let latest = &analytics.weeks[0];

        assert_eq!(f(latest, "cot_index_g1_3m"), Some(50.0));
        assert_eq!(f(latest, "cot_index_g1_1y"), Some(5.0));
        assert_eq!(f(latest, "cot_index_g1_3y"), Some(5.0));
        assert_eq!(f(latest, "wci_g1"), Some(5.0));

        // The oldest week only sees itself
        let oldest = &analytics.weeks[13];
        assert!(oldest["cot_index_g1_1y"].is_null());
        assert!(oldest["wci_g1"].is_null());
        assert!(oldest["crowded_g1"]["value"].is_null());
        assert!(oldest["crowded_g1"]["signal"].is_null());
    }

    #[test]
    fn test_flat_series_is_midpoint() {
        let rows = rows_with_nets(&[40.0, 40.0]);
        let analytics = CotCalculator::default().compute(&rows, &g1(GroupRole::Commercial));
        assert_eq!(f(&analytics.weeks[0], "cot_index_g1_1y"), Some(50.0));
        assert_eq!(analytics.weeks[0]["crowded_g1"], json!({ "value": 50.0, "signal": null }));
    }

    #[test]
    fn test_signal_depends_on_role() {
        let calc = CotCalculator::default();

        assert_eq!(calc.determine_signal(85.0, Some(GroupRole::Commercial)), Some(Signal::Buy));
        assert_eq!(calc.determine_signal(15.0, Some(GroupRole::Commercial)), Some(Signal::Sell));
        assert_eq!(calc.determine_signal(85.0, Some(GroupRole::Speculative)), Some(Signal::Sell));
        assert_eq!(calc.determine_signal(15.0, Some(GroupRole::Speculative)), Some(Signal::Buy));
        assert_eq!(calc.determine_signal(90.0, Some(GroupRole::Small)), Some(Signal::Sell));
        assert_eq!(calc.determine_signal(50.0, Some(GroupRole::Commercial)), None);
        assert_eq!(calc.determine_signal(95.0, None), None);
    }

    #[test]
    fn test_signal_thresholds_are_inclusive() {
        let calc = CotCalculator::new(CrowdedThresholds { buy: 70.0, sell: 30.0 });
        assert_eq!(calc.determine_signal(70.0, Some(GroupRole::Commercial)), Some(Signal::Buy));
        assert_eq!(calc.determine_signal(30.0, Some(GroupRole::Commercial)), Some(Signal::Sell));
        assert_eq!(calc.determine_signal(69.9, Some(GroupRole::Commercial)), None);
    }

    #[test]
    fn test_crowded_level_from_1y_index() {
        // Latest net at the top of its range
        let rows = rows_with_nets(&[100.0, 0.0, 50.0]);

        let comm = CotCalculator::default().compute(&rows, &g1(GroupRole::Commercial));
        assert_eq!(comm.weeks[0]["crowded_g1"], json!({ "value": 100.0, "signal": "BUY" }));

        let speculative = CotCalculator::default().compute(&rows, &g1(GroupRole::Speculative));
        assert_eq!(speculative.weeks[0]["crowded_g1"], json!({ "value": 100.0, "signal": "SELL" }));
    }

    #[test]
    fn test_stats() {
        let rows = vec![
            json!({ "open_interest": 1000, "oi_change": 100, "g1_long": 300, "g1_short": 100 }),
            json!({ "open_interest": 900, "oi_change": -50, "g1_long": 100, "g1_short": 200 }),
            json!({ "open_interest": 950, "g1_long": 150, "g1_short": 150 }),
        ];
        let analytics = CotCalculator::default().compute(&rows, &g1(GroupRole::Speculative));
        let stats = &analytics.stats;

        assert_eq!(stats["max"]["g1_net"], json!(200));
        assert_eq!(stats["min"]["g1_net"], json!(-100));
        assert_eq!(stats["max"]["open_interest"], json!(1000));
        assert_eq!(stats["min_5y"]["open_interest"], json!(900));
        assert_eq!(stats["avg_13w"]["g1_net"], json!(33));
        assert_eq!(stats["avg_13w"]["oi_change"], json!(25));
        assert_eq!(f(&stats["max"], "g1_pct_net_oi"), Some(20.0));
        assert_eq!(f(&stats["min"], "g1_pct_net_oi"), Some(-11.1));
        assert!(stats["max"]["g1_change"].is_null());
    }

    #[test]
    fn test_stats_without_weeks() {
        let analytics = CotCalculator::default().compute(&[], &g1(GroupRole::Small));
        assert!(analytics.weeks.is_empty());
        assert_eq!(analytics.stats, json!({}));
    }

    #[test]
    fn test_computed_weeks_feed_screener_rows() {
        let groups = default_report_groups(ReportType::Legacy);
        let rows = vec![
            json!({
                "report_date": "2024-06-04", "open_interest": 1000, "oi_change": 20,
                "g1_long": 500, "g1_short": 100, "g2_long": 100, "g2_short": 400
            }),
            json!({
                "report_date": "2024-05-28", "open_interest": 1000,
                "g1_long": 300, "g1_short": 200, "g2_long": 200, "g2_short": 300
            }),
        ];
        let analytics = CotCalculator::default().compute(&rows, &groups);

        let market = MarketRef {
            code: "088691",
            name: "GOLD - COMMODITY EXCHANGE INC.",
            exchange_code: "CMX",
        };
        let row = build_screener_entry(market, &analytics.weeks, &groups, &[]).unwrap();

        assert_eq!(row["date"], "2024-06-04");
        assert_eq!(row["g1_net"], json!(400));
        assert_eq!(row["g1_pct_oi"].as_f64(), Some(40.0));
        assert_eq!(row["g1_pct_oi_change"].as_f64(), Some(30.0));
        assert_eq!(row["cot_g1_1y"].as_f64(), Some(100.0));
        assert_eq!(row["signal_g1"], "SELL");
        assert_eq!(row["signal_g2"], "SELL");
        assert!(row["crowded_g3"].is_null());

        let signals = row["signals"].as_array().unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0]["group"], "L.S");
    }
}
