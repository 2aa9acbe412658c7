//! Snapshot store - persist screener rows per report type and subtype.
//!
//! Snapshots live in one directory, one file per variant:
//!
//! ```text
//! .screener/snapshots/
//! ├── screener_legacy_fo.json
//! ├── screener_disagg_co.json
//! └── screener_tff_fo.json
//! ```
//!
//! Each file is a plain JSON array of raw rows, the same shape the data
//! exporter writes. A `{ "rows": [...] }` wrapper is accepted on load too.
//!
//! Rows are stored raw; enrichment happens on read.

pub mod ttl;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::models::{ReportType, Subtype};

pub use ttl::TtlCache;

/// A loaded snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StoredSnapshot {
    pub report_type: ReportType,
    pub subtype: Subtype,
    /// Last modification of the file (RFC 3339)
    pub updated_at: Option<String>,
    /// Raw screener rows
    pub rows: Vec<Value>,
}

#[derive(Deserialize)]
struct WrappedRows {
    rows: Vec<Value>,
}

/// Listing entry for a snapshot file
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub report_type: ReportType,
    pub subtype: Subtype,
    pub row_count: usize,
    pub updated_at: Option<String>,
    pub path: PathBuf,
}

/// File-backed snapshot store
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Store rooted at `dir`. The directory is created on first save.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Directory holding the snapshot files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of a variant.
    pub fn file_name(report_type: ReportType, subtype: Subtype) -> String {
        format!("screener_{}_{}.json", report_type, subtype)
    }

    fn path_for(&self, report_type: ReportType, subtype: Subtype) -> PathBuf {
        self.dir.join(Self::file_name(report_type, subtype))
    }

    /// Parse `screener_{rt}_{st}.json`.
    fn parse_file_name(name: &str) -> Option<(ReportType, Subtype)> {
        let stem = name.strip_prefix("screener_")?.strip_suffix(".json")?;
        let (rt, st) = stem.split_once('_')?;
        Some((rt.parse().ok()?, st.parse().ok()?))
    }

    /// All readable snapshots, sorted by report type then subtype.
    pub fn list(&self) -> Vec<SnapshotInfo> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        let mut infos: Vec<SnapshotInfo> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let (rt, st) = Self::parse_file_name(name.to_str()?)?;
                let snapshot = self.load(rt, st).ok()?;
                Some(SnapshotInfo {
                    report_type: rt,
                    subtype: st,
                    row_count: snapshot.rows.len(),
                    updated_at: snapshot.updated_at,
                    path: entry.path(),
                })
            })
            .collect();

        infos.sort_by_key(|i| (i.report_type, i.subtype));
        infos
    }

    /// Load a snapshot.
    pub fn load(&self, report_type: ReportType, subtype: Subtype) -> StoreResult<StoredSnapshot> {
        let path = self.path_for(report_type, subtype);
        if !path.exists() {
            return Err(StoreError::NotFound(Self::file_name(report_type, subtype)));
        }

        let content = fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&content)?;
        let rows = Self::rows_from_value(value, &Self::file_name(report_type, subtype))?;

        let updated_at = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());

        Ok(StoredSnapshot {
            report_type,
            subtype,
            updated_at,
            rows,
        })
    }

    fn rows_from_value(value: Value, name: &str) -> StoreResult<Vec<Value>> {
        match value {
            Value::Array(rows) => Ok(rows),
            Value::Object(_) => Ok(serde_json::from_value::<WrappedRows>(value)?.rows),
            _ => Err(StoreError::InvalidSnapshot {
                name: name.to_string(),
                message: "expected an array of rows".to_string(),
            }),
        }
    }

    /// Save rows as the snapshot of a variant, replacing any previous one.
    pub fn save(
        &self,
        report_type: ReportType,
        subtype: Subtype,
        rows: Vec<Value>,
    ) -> StoreResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(report_type, subtype);
        let content = serde_json::to_string_pretty(&rows)?;
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Import a JSON file of rows as a variant.
    pub fn import(
        &self,
        file: &Path,
        report_type: ReportType,
        subtype: Subtype,
    ) -> StoreResult<PathBuf> {
        let content = fs::read_to_string(file)?;
        let value: Value = serde_json::from_str(&content)?;
        let rows = Self::rows_from_value(value, &file.display().to_string())?;
        self.save(report_type, subtype, rows)
    }

    /// Delete a snapshot.
    pub fn delete(&self, report_type: ReportType, subtype: Subtype) -> StoreResult<()> {
        let path = self.path_for(report_type, subtype);
        if !path.exists() {
            return Err(StoreError::NotFound(Self::file_name(report_type, subtype)));
        }
        fs::remove_file(&path)?;
        Ok(())
    }
}
