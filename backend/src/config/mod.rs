//! Runtime settings, report groups and market categories.
//!
//! Settings come from the environment (a `.env` file is loaded by the CLI
//! through `dotenvy`):
//!
//! | Variable               | Default                | Meaning                         |
//! |------------------------|------------------------|---------------------------------|
//! | `SCREENER_DATA_DIR`    | `.screener/snapshots`  | Snapshot directory              |
//! | `SCREENER_PORT`        | `3000`                 | HTTP port                       |
//! | `SCREENER_CACHE_TTL`   | `300`                  | Screener cache TTL (seconds)    |
//! | `SCREENER_GROUPS_FILE` | unset                  | JSON file overriding the groups |
//! | `SCREENER_CROWDED_BUY` | `80`                   | COT index of a crowded long     |
//! | `SCREENER_CROWDED_SELL`| `20`                   | COT index of a crowded short    |

use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calculator::CrowdedThresholds;
use crate::error::{ConfigError, ConfigResult};
use crate::models::{Group, GroupRole, ReportType};
use crate::validation::validate_report_groups;

const DEFAULT_DATA_DIR: &str = ".screener/snapshots";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Backend settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub port: u16,
    pub cache_ttl: Duration,
    pub groups_file: Option<PathBuf>,
    pub crowded: CrowdedThresholds,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            port: DEFAULT_PORT,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            groups_file: None,
            crowded: CrowdedThresholds::default(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(dir) = lookup("SCREENER_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("SCREENER_PORT") {
            settings.port = parse_env("SCREENER_PORT", &port)?;
        }
        if let Some(ttl) = lookup("SCREENER_CACHE_TTL") {
            settings.cache_ttl = Duration::from_secs(parse_env("SCREENER_CACHE_TTL", &ttl)?);
        }
        settings.groups_file = lookup("SCREENER_GROUPS_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        if let Some(buy) = lookup("SCREENER_CROWDED_BUY") {
            settings.crowded.buy = parse_env("SCREENER_CROWDED_BUY", &buy)?;
        }
        if let Some(sell) = lookup("SCREENER_CROWDED_SELL") {
            settings.crowded.sell = parse_env("SCREENER_CROWDED_SELL", &sell)?;
        }

        Ok(settings)
    }

    /// Report groups: defaults, overridden by the groups file when set.
    pub fn report_groups(&self) -> ConfigResult<ReportGroups> {
        match self.groups_file {
            Some(ref path) => Ok(ReportGroups::defaults().merged(ReportGroups::from_file(path)?)),
            None => Ok(ReportGroups::defaults()),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}

// =============================================================================
// Report groups
// =============================================================================

/// Trader groups of each report type.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportGroups {
    groups: BTreeMap<ReportType, Vec<Group>>,
}

impl ReportGroups {
    /// Groups published by the CFTC for each report family.
    pub fn defaults() -> Self {
        let groups = ReportType::ALL
            .into_iter()
            .map(|rt| (rt, default_report_groups(rt)))
            .collect();
        Self { groups }
    }

    /// Load and validate a `{ "<report_type>": [groups] }` file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        Self::from_value(&value)
    }

    /// Build from an already-parsed document.
    pub fn from_value(value: &Value) -> ConfigResult<Self> {
        validate_report_groups(value).map_err(ConfigError::InvalidGroups)?;

        let mut groups = BTreeMap::new();
        if let Some(map) = value.as_object() {
            for (name, list) in map {
                let report_type: ReportType = name.parse()?;
                let list: Vec<Group> = serde_json::from_value(list.clone())?;
                groups.insert(report_type, list);
            }
        }
        Ok(Self { groups })
    }

    /// Replace report types present in `other`, keep the rest.
    pub fn merged(mut self, other: ReportGroups) -> Self {
        self.groups.extend(other.groups);
        self
    }

    /// Groups for a report type. Empty when none are configured.
    pub fn get(&self, report_type: ReportType) -> &[Group] {
        self.groups
            .get(&report_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for ReportGroups {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Default trader groups of a report type.
pub fn default_report_groups(report_type: ReportType) -> Vec<Group> {
    use GroupRole::{Commercial, Small, Speculative};

    match report_type {
        ReportType::Legacy => vec![
            Group::described("g1", "Large Speculators", "L.S", Speculative, true),
            Group::described("g2", "Commercials", "Comm", Commercial, false),
            Group::described("g3", "Small Traders", "ST", Small, false),
        ],
        ReportType::Disagg => vec![
            Group::described("g1", "Producer/Merchant", "PM", Commercial, false),
            Group::described("g2", "Swap Dealers", "SD", Commercial, true),
            Group::described("g3", "Managed Money", "MM", Speculative, true),
            Group::described("g4", "Other Reportables", "OR", Speculative, true),
            Group::described("g5", "Non-Reportable", "NR", Small, false),
        ],
        ReportType::Tff => vec![
            Group::described("g1", "Dealer/Intermediary", "Dealer", Commercial, true),
            Group::described("g2", "Asset Manager", "AM", Speculative, true),
            Group::described("g3", "Leveraged Funds", "LevFn", Speculative, true),
            Group::described("g4", "Other Reportables", "OR", Speculative, true),
            Group::described("g5", "Non-Reportable", "NR", Small, false),
        ],
    }
}

// =============================================================================
// Market categories
// =============================================================================

/// A market category matched by keywords in the market name.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketCategory {
    pub key: String,
    pub display: String,
    /// Upper-case substrings of the market name.
    pub keywords: Vec<String>,
}

impl MarketCategory {
    pub fn new(key: &str, display: &str, keywords: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            display: display.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Categories checked in order; the first keyword hit wins.
pub fn default_market_categories() -> Vec<MarketCategory> {
    vec![
        MarketCategory::new(
            "currencies",
            "Currencies",
            &[
                "USD INDEX", "EURO FX", "BRITISH POUND", "JAPANESE YEN", "SWISS FRANC",
                "CANADIAN DOLLAR", "AUSTRALIAN DOLLAR", "NEW ZEALAND DOLLAR", "MEXICAN PESO",
                "BRAZILIAN REAL", "RUSSIAN RUBLE", "S. AFRICAN RAND", "RENMINBI",
            ],
        ),
        MarketCategory::new(
            "crypto",
            "Crypto",
            &[
                "BITCOIN", "MICRO BITCOIN", "ETHER", "NANO BITCOIN", "NANO ETHER", "SHIB",
                "SOLANA", "XRP", "DOGECOIN", "LITECOIN", "POLKADOT", "CHAINLINK", "AVALANCHE",
                "CARDONA", "STELLAR", "HEDERA", "SUI", "BITCOIN CASH",
            ],
        ),
        MarketCategory::new(
            "metals",
            "Metals",
            &["GOLD", "SILVER", "COPPER", "PLATINUM", "PALLADIUM", "ALUMINUM"],
        ),
        MarketCategory::new(
            "energy",
            "Energy",
            &[
                "CRUDE OIL", "NATURAL GAS", "HEATING OIL", "RBOB GASOLINE", "BRENT CRUDE",
                "ETHANOL",
            ],
        ),
        MarketCategory::new(
            "grains",
            "Grains",
            &[
                "WHEAT", "CORN", "SOYBEANS", "SOYBEAN OIL", "SOYBEAN MEAL", "OATS",
                "ROUGH RICE", "CANOLA",
            ],
        ),
        MarketCategory::new(
            "softs",
            "Softs",
            &["COFFEE", "COCOA", "SUGAR", "COTTON", "ORANGE JUICE", "LUMBER"],
        ),
        MarketCategory::new(
            "livestock",
            "Livestock",
            &["LIVE CATTLE", "FEEDER CATTLE", "LEAN HOGS"],
        ),
        MarketCategory::new(
            "indices",
            "Indices",
            &["S&P 500", "E-MINI S&P", "NASDAQ", "DOW JONES", "RUSSELL", "VIX", "NIKKEI", "MIDCAP"],
        ),
        MarketCategory::new(
            "rates",
            "Rates",
            &[
                "2-YEAR", "5-YEAR", "10-YEAR", "30-YEAR", "EURODOLLAR", "FED FUNDS", "TREASURY",
                "T-NOTE", "T-BOND", "ULTRA", "SOFR",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_settings_from_vars() {
        let settings = Settings::from_lookup(lookup(&[
            ("SCREENER_DATA_DIR", "/var/lib/screener"),
            ("SCREENER_PORT", "8080"),
            ("SCREENER_CACHE_TTL", "60"),
            ("SCREENER_GROUPS_FILE", "groups.json"),
        ]))
        .unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/screener"));
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.cache_ttl, Duration::from_secs(60));
        assert_eq!(settings.groups_file, Some(PathBuf::from("groups.json")));
        assert_eq!(settings.crowded, CrowdedThresholds::default());
    }

    #[test]
    fn test_crowded_thresholds_from_vars() {
        let settings = Settings::from_lookup(lookup(&[
            ("SCREENER_CROWDED_BUY", "75"),
            ("SCREENER_CROWDED_SELL", "25.5"),
        ]))
        .unwrap();
        assert_eq!(settings.crowded.buy, 75.0);
        assert_eq!(settings.crowded.sell, 25.5);

        let err = Settings::from_lookup(lookup(&[("SCREENER_CROWDED_BUY", "high")])).unwrap_err();
        assert!(err.to_string().contains("SCREENER_CROWDED_BUY"));
    }

    #[test]
    fn test_invalid_port() {
        let err = Settings::from_lookup(lookup(&[("SCREENER_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("SCREENER_PORT"));
    }

    #[test]
    fn test_default_groups() {
        let groups = ReportGroups::defaults();
        assert_eq!(groups.get(ReportType::Legacy).len(), 3);
        assert_eq!(groups.get(ReportType::Disagg).len(), 5);
        assert_eq!(groups.get(ReportType::Tff)[2].name, "Leveraged Funds");
        assert_eq!(groups.get(ReportType::Disagg)[2].short, "MM");
    }

    #[test]
    fn test_groups_from_value() {
        let doc = json!({ "legacy": [{ "key": "comm" }, { "key": "noncomm" }] });
        let groups = ReportGroups::from_value(&doc).unwrap();
        let keys: Vec<&str> = groups.get(ReportType::Legacy).iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["comm", "noncomm"]);
        assert!(groups.get(ReportType::Tff).is_empty());
    }

    #[test]
    fn test_groups_from_invalid_value() {
        let doc = json!({ "legacy": [{ "name": "no key" }] });
        assert!(matches!(
            ReportGroups::from_value(&doc),
            Err(ConfigError::InvalidGroups(_))
        ));
    }

    #[test]
    fn test_groups_file_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("groups.json");
        fs::write(&path, r#"{ "tff": [{ "key": "dealer", "name": "Dealers" }] }"#).unwrap();

        let settings = Settings {
            groups_file: Some(path),
            ..Settings::default()
        };
        let groups = settings.report_groups().unwrap();

        assert_eq!(groups.get(ReportType::Tff).len(), 1);
        assert_eq!(groups.get(ReportType::Tff)[0].key, "dealer");
        // Untouched report types keep their defaults
        assert_eq!(groups.get(ReportType::Legacy).len(), 3);
    }

    #[test]
    fn test_categories_order() {
        let categories = default_market_categories();
        assert_eq!(categories[0].key, "currencies");
        assert_eq!(categories.last().unwrap().key, "rates");
        assert!(categories.iter().all(|c| c.keywords.iter().all(|k| k.to_uppercase() == *k)));
    }
}
