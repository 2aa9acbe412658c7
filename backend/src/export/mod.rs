//! Write enriched rows as CSV.
//!
//! Columns are the union of row keys in first-seen order. Nulls become empty
//! cells, nested values (such as `signals`) are written as compact JSON.

use serde_json::Value;
use std::io::Write;

use crate::parser::collect_headers;

/// Export errors
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write rows to any writer.
pub fn rows_to_csv<W: Write>(rows: &[Value], writer: W) -> Result<(), ExportError> {
    let headers = collect_headers(rows);
    if headers.is_empty() {
        return Ok(());
    }
    let mut out = csv::Writer::from_writer(writer);

    out.write_record(&headers)?;
    for row in rows {
        let record: Vec<String> = headers
            .iter()
            .map(|h| row.get(h).map(cell_text).unwrap_or_default())
            .collect();
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

/// Rows as a CSV string.
pub fn rows_to_csv_string(rows: &[Value]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    rows_to_csv(rows, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_to_csv() {
        let rows = vec![
            json!({ "code": "088691", "g1_total": 400, "g1_short_ratio": 0.25, "all_long": null }),
            json!({ "code": "067651", "g1_total": null, "extra": true }),
        ];
        let csv = rows_to_csv_string(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        // serde_json maps iterate in key order
        assert_eq!(lines[0], "all_long,code,g1_short_ratio,g1_total,extra");
        assert_eq!(lines[1], ",088691,0.25,400,");
        assert_eq!(lines[2], ",067651,,,true");
    }

    #[test]
    fn test_nested_values_and_quoting() {
        let rows = vec![json!({
            "name": "CRUDE OIL, LIGHT SWEET - NYMEX",
            "signals": [{ "group": "MM", "signal": "BUY" }]
        })];
        let csv = rows_to_csv_string(&rows).unwrap();

        assert!(csv.contains("\"CRUDE OIL, LIGHT SWEET - NYMEX\""));
        assert!(csv.contains("BUY"));
    }

    #[test]
    fn test_empty_rows() {
        let csv = rows_to_csv_string(&[]).unwrap();
        assert!(csv.trim().is_empty());
    }
}
