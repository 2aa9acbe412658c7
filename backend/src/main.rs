//! Screener CLI - enrich COT screener rows and serve snapshots
//!
//! # Main Commands
//!
//! ```bash
//! screener serve                              # Start HTTP server (port 3000)
//! screener enrich rows.json                   # Enrich rows, print JSON
//! screener enrich rows.csv --csv -o out.csv   # Enrich CSV rows, write CSV
//! screener build markets.json --save          # Build rows from weekly data
//! screener build reports.json --raw           # Same, from raw report rows
//! screener detail reports.json 088691         # Weeks and stats of one market
//! screener snapshot list                      # Manage stored snapshots
//! ```
//!
//! # Lookup Commands
//!
//! ```bash
//! screener groups disagg                      # Trader groups of a report
//! screener categorize "GOLD - COMMODITY EXCHANGE INC."
//! ```

use clap::{Parser, Subcommand};
use screener::api::types::{PageQuery, PaginatedResponse};
use screener::{
    build_market_detail, build_screener_entry, categorize_market, default_market_categories,
    enrich_file, enrich_json, rows_to_csv_string, start_server, CotCalculator, EnrichOptions,
    MarketRef, ReportType, Settings, SnapshotStore, Subtype,
};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "screener")]
#[command(about = "Commitment of Traders screener: enrich rows, manage snapshots, serve the API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich a JSON or CSV file of screener rows
    Enrich {
        /// Input file (JSON array or CSV)
        input: PathBuf,

        /// Report type whose groups are used
        #[arg(short, long, default_value = "legacy")]
        report_type: ReportType,

        /// Report-groups JSON file overriding the built-in groups
        #[arg(short, long)]
        groups: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write CSV instead of JSON
        #[arg(long)]
        csv: bool,

        /// Skip row schema checks
        #[arg(long)]
        no_validate: bool,
    },

    /// Build raw screener rows from per-market weekly data
    Build {
        /// JSON file: [{ code, name, exchange_code, weeks: [newest first] }]
        input: PathBuf,

        #[arg(short, long, default_value = "legacy")]
        report_type: ReportType,

        #[arg(short, long, default_value = "fo")]
        subtype: Subtype,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also store the rows as the snapshot of this report type and subtype
        #[arg(long)]
        save: bool,

        /// Weeks are raw report rows; compute nets, COT indices and crowded levels first
        #[arg(long)]
        raw: bool,
    },

    /// Show computed weeks and stats of one market from raw report rows
    Detail {
        /// JSON file: [{ code, name, exchange_code, weeks: [raw rows, newest first] }]
        input: PathBuf,

        /// CFTC contract code
        code: String,

        #[arg(short, long, default_value = "legacy")]
        report_type: ReportType,

        #[arg(short, long, default_value = "fo")]
        subtype: Subtype,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the trader groups of a report type
    Groups {
        report_type: ReportType,
    },

    /// Show the category of a market name
    Categorize {
        name: String,
    },

    /// Manage stored screener snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: SCREENER_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List stored snapshots
    List,

    /// Import a JSON array of rows as a snapshot
    Import {
        file: PathBuf,
        report_type: ReportType,
        subtype: Subtype,
    },

    /// Print the enriched rows of a snapshot
    Show {
        report_type: ReportType,
        subtype: Subtype,

        /// Number of rows (0 = all)
        #[arg(short, long, default_value = "10")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Delete a snapshot
    Delete {
        report_type: ReportType,
        subtype: Subtype,
    },
}

/// One market of the `build` input file.
#[derive(Debug, Deserialize)]
struct MarketWeeks {
    code: String,
    name: String,
    #[serde(default)]
    exchange_code: String,
    #[serde(default)]
    weeks: Vec<Value>,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match Settings::from_env() {
        Ok(settings) => run(cli.command, settings).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, settings: Settings) -> CliResult {
    match command {
        Commands::Enrich {
            input,
            report_type,
            groups,
            output,
            csv,
            no_validate,
        } => {
            let options = EnrichOptions {
                report_type: Some(report_type),
                groups: None,
                groups_file: groups.or_else(|| settings.groups_file.clone()),
                validate: !no_validate,
            };
            cmd_enrich(&input, options, output.as_deref(), csv)
        }

        Commands::Build {
            input,
            report_type,
            subtype,
            output,
            save,
            raw,
        } => {
            let target = BuildTarget {
                report_type,
                subtype,
                save,
                raw,
            };
            cmd_build(&input, target, output.as_deref(), &settings)
        }

        Commands::Detail {
            input,
            code,
            report_type,
            subtype,
            output,
        } => cmd_detail(&input, &code, report_type, subtype, output.as_deref(), &settings),

        Commands::Groups { report_type } => cmd_groups(report_type, &settings),

        Commands::Categorize { name } => cmd_categorize(&name),

        Commands::Snapshot { action } => cmd_snapshot(action, &settings),

        Commands::Serve { port } => {
            let settings = Settings {
                port: port.unwrap_or(settings.port),
                ..settings
            };
            start_server(settings).await
        }
    }
}

fn cmd_enrich(input: &Path, options: EnrichOptions, output: Option<&Path>, csv: bool) -> CliResult {
    let result = enrich_file(input, options)?;

    if let Some(ref source) = result.source {
        eprintln!("   Encoding: {}", source.encoding);
        eprintln!("   Columns: {}", source.headers.len());
    }
    eprintln!(
        "✨ {} rows, {} groups ({} with aggregates)",
        result.summary.row_count, result.summary.group_count, result.summary.rows_with_aggregates
    );

    let content = if csv {
        rows_to_csv_string(&result.rows)?
    } else {
        serde_json::to_string_pretty(&result.rows)?
    };
    write_output(&content, output)
}

/// What `build` produces and where it goes.
struct BuildTarget {
    report_type: ReportType,
    subtype: Subtype,
    save: bool,
    raw: bool,
}

fn read_markets(input: &Path) -> Result<Vec<MarketWeeks>, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(input)?;
    Ok(serde_json::from_str(&content)?)
}

fn cmd_build(input: &Path, target: BuildTarget, output: Option<&Path>, settings: &Settings) -> CliResult {
    let BuildTarget {
        report_type,
        subtype,
        save,
        raw,
    } = target;
    eprintln!("📦 Building {} {} rows from {}", report_type, subtype, input.display());

    let markets = read_markets(input)?;

    let groups = settings.report_groups()?;
    let groups = groups.get(report_type);
    let categories = default_market_categories();
    let calc = CotCalculator::from_settings(settings);
    if raw {
        eprintln!("   Computing COT indices ({} groups)", groups.len());
    }

    let rows: Vec<Value> = markets
        .iter()
        .filter_map(|m| {
            let market = MarketRef {
                code: &m.code,
                name: &m.name,
                exchange_code: &m.exchange_code,
            };
            if raw {
                let weeks = calc.compute(&m.weeks, groups).weeks;
                build_screener_entry(market, &weeks, groups, &categories)
            } else {
                build_screener_entry(market, &m.weeks, groups, &categories)
            }
        })
        .collect();

    let skipped = markets.len() - rows.len();
    eprintln!("   {} rows built", rows.len());
    if skipped > 0 {
        eprintln!("   ⚠️  {} markets without weeks skipped", skipped);
    }

    if save {
        let store = SnapshotStore::with_dir(&settings.data_dir);
        let path = store.save(report_type, subtype, rows.clone())?;
        eprintln!("💾 Snapshot saved to: {}", path.display());
    }

    write_output(&serde_json::to_string_pretty(&rows)?, output)
}

fn cmd_detail(
    input: &Path,
    code: &str,
    report_type: ReportType,
    subtype: Subtype,
    output: Option<&Path>,
    settings: &Settings,
) -> CliResult {
    let markets = read_markets(input)?;
    let m = markets
        .iter()
        .find(|m| m.code == code)
        .ok_or_else(|| format!("Market {} not found in {}", code, input.display()))?;

    let groups = settings.report_groups()?;
    let groups = groups.get(report_type);
    let analytics = CotCalculator::from_settings(settings).compute(&m.weeks, groups);
    eprintln!("📈 {}: {} weeks", m.name, analytics.weeks.len());

    let market = MarketRef {
        code: &m.code,
        name: &m.name,
        exchange_code: &m.exchange_code,
    };
    let detail = build_market_detail(
        market,
        report_type,
        subtype,
        groups,
        analytics,
        &default_market_categories(),
    )
    .ok_or_else(|| format!("Market {} has no weeks", code))?;

    write_output(&serde_json::to_string_pretty(&detail)?, output)
}

fn cmd_groups(report_type: ReportType, settings: &Settings) -> CliResult {
    let groups = settings.report_groups()?;
    println!("📋 {} ({})", report_type.display_name(), report_type);
    for g in groups.get(report_type) {
        let role = g
            .role
            .map(|r| format!("{:?}", r).to_lowercase())
            .unwrap_or_else(|| "-".to_string());
        let spread = if g.has_spread { ", spread" } else { "" };
        println!("  {:<4} {:<24} {:<6} {}{}", g.key, g.name, g.short, role, spread);
    }
    Ok(())
}

fn cmd_categorize(name: &str) -> CliResult {
    let (key, display) = categorize_market(name, &default_market_categories());
    println!("{} ({})", display, key);
    Ok(())
}

fn cmd_snapshot(action: SnapshotAction, settings: &Settings) -> CliResult {
    let store = SnapshotStore::with_dir(&settings.data_dir);

    match action {
        SnapshotAction::List => {
            let snapshots = store.list();
            if snapshots.is_empty() {
                eprintln!("📋 No snapshots in {}", store.dir().display());
                eprintln!("   Use 'screener snapshot import <file> <report_type> <subtype>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored snapshots ({}):\n", snapshots.len());
            for s in snapshots {
                println!("  📄 {} / {}", s.report_type.display_name(), s.subtype.display_name());
                println!("     Rows: {}", s.row_count);
                if let Some(ref updated) = s.updated_at {
                    println!("     Updated: {}", updated);
                }
                println!("     File: {}", s.path.display());
                println!();
            }
        }

        SnapshotAction::Import {
            file,
            report_type,
            subtype,
        } => {
            eprintln!("📥 Importing snapshot from: {}", file.display());
            let path = store.import(&file, report_type, subtype)?;
            eprintln!("✅ Snapshot saved to: {}", path.display());
        }

        SnapshotAction::Show {
            report_type,
            subtype,
            limit,
            offset,
        } => {
            let mut rows = store.load(report_type, subtype)?.rows;
            let groups = settings.report_groups()?;
            enrich_json(&mut rows, groups.get(report_type));

            let page = PaginatedResponse::page(&rows, &PageQuery { limit, offset });
            eprintln!("📄 {} rows (showing {} from {})", page.total, page.items.len(), offset);
            println!("{}", serde_json::to_string_pretty(&page.items)?);
        }

        SnapshotAction::Delete {
            report_type,
            subtype,
        } => {
            store.delete(report_type, subtype)?;
            eprintln!("🗑️  Snapshot deleted: {} {}", report_type, subtype);
        }
    }

    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
