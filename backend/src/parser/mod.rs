//! Load screener rows from JSON or CSV files.
//!
//! JSON input is an array of row objects, passed through untouched. CSV
//! input is decoded (encoding auto-detected), split with the detected
//! delimiter and converted to row objects:
//!
//! - empty cell → `null`
//! - cell parsing as a number → JSON number (leading-zero codes stay strings)
//! - anything else → string
//!
//! Market names such as `"CRUDE OIL, LIGHT SWEET - NYMEX"` contain commas,
//! so quoting is handled by the `csv` reader rather than by splitting lines.

use serde_json::{Map, Value};
use std::path::Path;

use crate::transform::flat::number_value;

/// Row parsing error with context (CSV line or JSON line)
#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: usize,
    pub column: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => {
                write!(f, "Line {}, column '{}': {}", self.line, col, self.message)
            }
            _ => {
                write!(f, "Line {}: {}", self.line, self.message)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed rows as JSON objects
    pub records: Vec<Value>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        // UTF-8 and anything unknown: lossy UTF-8
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Convert one CSV cell to a JSON value.
pub fn coerce_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    // Market codes such as "088691" are identifiers, not numbers
    let bytes = trimmed.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' && bytes[1].is_ascii_digit() {
        return Value::String(trimmed.to_string());
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => number_value(n),
        _ => Value::String(trimmed.to_string()),
    }
}

/// Parse CSV text with an explicit delimiter.
///
/// # Example
/// ```ignore
/// use screener::parser::csv_to_rows;
///
/// let rows = csv_to_rows("code,open_interest\n088691,1000", ',').unwrap();
/// assert_eq!(rows[0]["open_interest"], 1000);
/// ```
pub fn csv_to_rows(content: &str, delimiter: char) -> Result<Vec<Value>, ParseError> {
    parse_string_with_metadata(content, delimiter, "utf-8".to_string()).map(|r| r.records)
}

/// Parse CSV string with explicit delimiter and return metadata.
pub fn parse_string_with_metadata(
    content: &str,
    delimiter: char,
    encoding: String,
) -> Result<ParseResult, ParseError> {
    if content.trim().is_empty() {
        return Err(ParseError::new(1, "Empty CSV file"));
    }

    let delimiter_byte = u8::try_from(delimiter)
        .map_err(|_| ParseError::new(1, format!("Unsupported delimiter '{}'", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::new(1, format!("Cannot read header: {}", e)))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::new(1, "No headers found"));
    }

    let mut records = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| ParseError::new(line, format!("Cannot read line: {}", e)))?;

        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let mut obj = Map::new();
        for (i, header) in headers.iter().enumerate() {
            let cell = record.get(i).unwrap_or("");
            obj.insert(header.clone(), coerce_cell(cell));
        }
        records.push(Value::Object(obj));
    }

    Ok(ParseResult {
        records,
        encoding,
        delimiter,
        headers,
    })
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> Result<ParseResult, ParseError> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    parse_string_with_metadata(&content, delimiter, encoding)
}

/// Parse a JSON array of row objects.
pub fn parse_json_rows(bytes: &[u8]) -> Result<Vec<Value>, ParseError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ParseError::new(e.line(), format!("Invalid JSON: {}", e)))?;

    match value {
        Value::Array(rows) => {
            if let Some(idx) = rows.iter().position(|r| !r.is_object()) {
                return Err(ParseError::new(0, format!("Row {} is not an object", idx)));
            }
            Ok(rows)
        }
        _ => Err(ParseError::new(0, "Expected a JSON array of rows")),
    }
}

/// Rows from raw bytes: JSON when the content starts with `[`, CSV otherwise.
pub fn parse_rows_auto(bytes: &[u8]) -> Result<ParseResult, ParseError> {
    let first = bytes
        .iter()
        .copied()
        .find(|b| !b.is_ascii_whitespace() && *b != 0xEF && *b != 0xBB && *b != 0xBF);

    if first == Some(b'[') {
        let records = parse_json_rows(bytes)?;
        Ok(ParseResult {
            headers: collect_headers(&records),
            records,
            encoding: "utf-8".to_string(),
            delimiter: ',',
        })
    } else {
        parse_bytes_auto(bytes)
    }
}

/// Load rows from a file (`.json` or CSV).
pub fn load_rows<P: AsRef<Path>>(path: P) -> Result<ParseResult, ParseError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| ParseError::new(0, format!("Cannot read file '{}': {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let records = parse_json_rows(&bytes)?;
        Ok(ParseResult {
            headers: collect_headers(&records),
            records,
            encoding: "utf-8".to_string(),
            delimiter: ',',
        })
    } else {
        parse_rows_auto(&bytes)
    }
}

/// Union of row keys in first-seen order.
pub fn collect_headers(rows: &[Value]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        if let Some(obj) = row.as_object() {
            for key in obj.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_simple_csv() {
        let csv = "code;open_interest\n088691;1000\n067651;2500.5";
        let rows = csv_to_rows(csv, ';').unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["code"], "088691");
        assert_eq!(rows[0]["open_interest"], 1000);
        assert_eq!(rows[1]["open_interest"], 2500.5);
    }

    #[test]
    fn test_quoted_values_with_commas() {
        let csv = "name,open_interest\n\"CRUDE OIL, LIGHT SWEET - NYMEX\",2000";
        let rows = csv_to_rows(csv, ',').unwrap();

        assert_eq!(rows[0]["name"], "CRUDE OIL, LIGHT SWEET - NYMEX");
        assert_eq!(rows[0]["open_interest"], 2000);
    }

    #[test]
    fn test_empty_cells_are_null() {
        let csv = "a,b,c\n1,,3";
        let rows = csv_to_rows(csv, ',').unwrap();

        assert_eq!(rows[0]["a"], 1);
        assert!(rows[0]["b"].is_null());
        assert_eq!(rows[0]["c"], 3);
    }

    #[test]
    fn test_short_rows_padded_with_null() {
        let csv = "a,b,c\n1,2";
        let rows = csv_to_rows(csv, ',').unwrap();
        assert!(rows[0]["c"].is_null());
    }

    #[test]
    fn test_empty_lines_skipped() {
        let csv = "a;b\n1;2\n\n3;4\n";
        let rows = csv_to_rows(csv, ';').unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_coerce_cell() {
        assert_eq!(coerce_cell(" 42 "), json!(42));
        assert_eq!(coerce_cell("-1.5"), json!(-1.5));
        assert_eq!(coerce_cell("SELL"), json!("SELL"));
        assert_eq!(coerce_cell("inf"), json!("inf"));
        assert_eq!(coerce_cell(""), Value::Null);
        assert_eq!(coerce_cell("0.5"), json!(0.5));
        assert_eq!(coerce_cell("0"), json!(0));
        assert_eq!(coerce_cell("067651"), json!("067651"));
    }

    #[test]
    fn test_error_message_format() {
        let err = ParseError::new(5, "Invalid value")
            .with_column("open_interest")
            .with_value("abc");

        let msg = err.to_string();
        assert!(msg.contains("Line 5"));
        assert!(msg.contains("column 'open_interest'"));
        assert!(msg.contains("value 'abc'"));
    }

    #[test]
    fn test_empty_csv_error() {
        let err = csv_to_rows("", ',').unwrap_err();
        assert!(err.message.contains("Empty"));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
    }

    #[test]
    fn test_auto_parse_csv() {
        let csv = "code;g1_long;g1_short\nABC;10;20";
        let result = parse_rows_auto(csv.as_bytes()).unwrap();

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.headers, vec!["code", "g1_long", "g1_short"]);
    }

    #[test]
    fn test_auto_parse_json() {
        let body = br#"  [{"code": "A", "open_interest": 1}, {"code": "B", "g1_long": 2}]"#;
        let result = parse_rows_auto(body).unwrap();

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.headers, vec!["code", "open_interest", "g1_long"]);
    }

    #[test]
    fn test_json_rows_must_be_objects() {
        assert!(parse_json_rows(b"[1, 2]").is_err());
        assert!(parse_json_rows(br#"{"rows": []}"#).is_err());
        assert!(parse_json_rows(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_load_rows_from_files() {
        let dir = tempdir().unwrap();

        let json_path = dir.path().join("rows.json");
        std::fs::write(&json_path, r#"[{"open_interest": 100}]"#).unwrap();
        assert_eq!(load_rows(&json_path).unwrap().records[0]["open_interest"], 100);

        let csv_path = dir.path().join("rows.csv");
        std::fs::write(&csv_path, "open_interest,g1_long\n100,5\n").unwrap();
        assert_eq!(load_rows(&csv_path).unwrap().records[0]["g1_long"], 5);

        assert!(load_rows(dir.path().join("missing.csv")).is_err());
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert!(decoded.contains("Soci"));
    }
}
