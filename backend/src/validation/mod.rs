//! JSON Schema validation for screener documents.
//!
//! Two schemas are embedded at compile time from the `schemas/` directory:
//!
//! - `report-groups.json`: `{ "<report_type>": [ { "key": ..., ... } ] }`
//! - `screener-rows.json`: array of raw rows with numeric position columns
//!
//! Validation is advisory for rows: enrichment accepts anything and turns
//! malformed values into nulls. Group files, on the other hand, are rejected
//! when invalid since every group needs a key.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use screener::validation::validate_report_groups;
//!
//! let groups = json!({ "legacy": [{ "key": "g1", "name": "Large Speculators" }] });
//! assert!(validate_report_groups(&groups).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

static REPORT_GROUPS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/report-groups.json"))
        .unwrap_or(Value::Bool(true))
});

static SCREENER_ROWS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/screener-rows.json"))
        .unwrap_or(Value::Bool(true))
});

/// Validate a JSON value against a schema.
///
/// # Returns
/// * `Ok(())` when valid
/// * `Err(Vec<String>)` with one message per violation
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use screener::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["key"],
///     "properties": { "key": { "type": "string" } }
/// });
///
/// assert!(validate(&schema, &json!({ "key": "g1" })).is_ok());
/// assert!(validate(&schema, &json!({ "name": "x" })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Boolean shortcut for [`validate`].
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate a report-groups document.
pub fn validate_report_groups(data: &Value) -> Result<(), Vec<String>> {
    validate(&REPORT_GROUPS_SCHEMA, data)
}

/// Validate an array of raw screener rows.
pub fn validate_screener_rows(data: &Value) -> Result<(), Vec<String>> {
    validate(&SCREENER_ROWS_SCHEMA, data)
}

/// Quick check of an array of raw screener rows.
pub fn is_valid_screener_rows(data: &Value) -> bool {
    is_valid(&SCREENER_ROWS_SCHEMA, data)
}
