//! Build raw screener rows from computed weekly positioning data.
//!
//! [`crate::calculator`] turns report rows into one computed week per market
//! per week (positions, changes, `% of OI`, COT index, crowded levels). A
//! screener row keeps the latest week and the change of `% net OI` against
//! the previous week:
//!
//! ```text
//! weeks (newest first)             screener row
//! ┌──────────────────────┐        ┌──────────────────────────────┐
//! │ 2024-06-04  g1_long… │  ───▶  │ code, name, category, date   │
//! │ 2024-05-28  g1_long… │        │ g1_long, g1_pct_oi_change …  │
//! └──────────────────────┘        │ signals: [{group, signal}]   │
//!                                 └──────────────────────────────┘
//! ```
//!
//! Rows produced here are the input of [`crate::transform::enrich`].

use serde_json::{json, Map, Value};

use crate::calculator::CotAnalytics;
use crate::config::MarketCategory;
use crate::models::{Group, ReportType, Subtype};

const OTHER_KEY: &str = "other";
const OTHER_DISPLAY: &str = "Other";

/// Find the category of a market from its name.
///
/// Categories are tried in order and the first keyword contained in the
/// upper-cased name wins. Unmatched names fall into `("other", "Other")`.
pub fn categorize_market(name: &str, categories: &[MarketCategory]) -> (String, String) {
    let upper = name.to_uppercase();
    categories
        .iter()
        .find(|c| c.keywords.iter().any(|kw| upper.contains(kw.as_str())))
        .map(|c| (c.key.clone(), c.display.clone()))
        .unwrap_or_else(|| (OTHER_KEY.to_string(), OTHER_DISPLAY.to_string()))
}

/// Market metadata with category and report display names.
pub fn build_market_meta(
    code: &str,
    name: &str,
    exchange: &str,
    report_type: ReportType,
    subtype: Subtype,
    categories: &[MarketCategory],
) -> Value {
    let (category, category_display) = categorize_market(name, categories);
    json!({
        "code": code,
        "name": name,
        "exchange": exchange,
        "category": category,
        "category_display": category_display,
        "report_type": report_type.as_str(),
        "report_type_display": report_type.display_name(),
        "subtype": subtype.as_str(),
        "subtype_display": subtype.display_name()
    })
}

/// Identity of the market a row describes.
#[derive(Debug, Clone, Copy)]
pub struct MarketRef<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub exchange_code: &'a str,
}

/// Build one screener row from the latest and previous week.
///
/// `prev` may be an empty object when only one week is known; the `% OI`
/// change columns are then null.
pub fn build_screener_row(
    market: MarketRef<'_>,
    latest: &Value,
    prev: &Value,
    groups: &[Group],
    categories: &[MarketCategory],
) -> Value {
    let (category, category_display) = categorize_market(market.name, categories);

    let mut row = Map::new();
    row.insert("code".to_string(), json!(market.code));
    row.insert("name".to_string(), json!(market.name));
    row.insert("exchange_code".to_string(), json!(market.exchange_code));
    row.insert("category".to_string(), json!(category));
    row.insert("category_display".to_string(), json!(category_display));
    row.insert("date".to_string(), field(latest, "date"));
    row.insert("open_interest".to_string(), field(latest, "open_interest"));
    row.insert("oi_change".to_string(), field(latest, "oi_change"));

    let mut signals = Vec::new();

    for group in groups {
        let gk = group.key.as_str();

        for suffix in ["long", "short", "net", "change", "change_long", "change_short"] {
            let name = format!("{}_{}", gk, suffix);
            row.insert(name.clone(), field(latest, &name));
        }

        let pct_key = format!("{}_pct_net_oi", gk);
        let cur_pct = latest.get(&pct_key).and_then(Value::as_f64);
        let prev_pct = prev.get(&pct_key).and_then(Value::as_f64);
        row.insert(format!("{}_pct_oi", gk), field(latest, &pct_key));
        row.insert(
            format!("{}_pct_oi_change", gk),
            match (cur_pct, prev_pct) {
                (Some(cur), Some(prev)) => json!(round_one_decimal(cur - prev)),
                _ => Value::Null,
            },
        );

        row.insert(
            format!("cot_{}_1y", gk),
            field(latest, &format!("cot_index_{}_1y", gk)),
        );

        let crowded = latest.get(format!("crowded_{}", gk)).filter(|v| v.is_object());
        let crowded_value = crowded.and_then(|c| c.get("value")).cloned().unwrap_or(Value::Null);
        let signal = crowded.and_then(|c| c.get("signal")).cloned().unwrap_or(Value::Null);

        if is_present_signal(&signal) {
            signals.push(json!({ "group": group.short, "signal": signal }));
        }

        row.insert(format!("crowded_{}", gk), crowded_value);
        row.insert(format!("signal_{}", gk), signal);
    }

    row.insert("signals".to_string(), Value::Array(signals));
    Value::Object(row)
}

/// Build a screener row from a market's computed weeks, newest first.
///
/// Returns `None` when there is no computed week.
pub fn build_screener_entry(
    market: MarketRef<'_>,
    weeks: &[Value],
    groups: &[Group],
    categories: &[MarketCategory],
) -> Option<Value> {
    let latest = weeks.first()?;
    let empty = Value::Object(Map::new());
    let prev = weeks.get(1).unwrap_or(&empty);
    Some(build_screener_row(market, latest, prev, groups, categories))
}

/// Detail payload of one market: metadata, groups, computed weeks and stats.
///
/// Returns `None` when there is no computed week.
pub fn build_market_detail(
    market: MarketRef<'_>,
    report_type: ReportType,
    subtype: Subtype,
    groups: &[Group],
    analytics: CotAnalytics,
    categories: &[MarketCategory],
) -> Option<Value> {
    if analytics.weeks.is_empty() {
        return None;
    }
    let meta = build_market_meta(
        market.code,
        market.name,
        market.exchange_code,
        report_type,
        subtype,
        categories,
    );
    Some(json!({
        "market": meta,
        "groups": groups,
        "weeks": analytics.weeks,
        "stats": analytics.stats
    }))
}

fn field(record: &Value, name: &str) -> Value {
    record.get(name).cloned().unwrap_or(Value::Null)
}

fn is_present_signal(signal: &Value) -> bool {
    match signal {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Bool(b) => *b,
        _ => true,
    }
}

fn round_one_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
