//! REST API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::Group;
use crate::transform::pipeline::{EnrichResult, EnrichSummary, SourceInfo};

/// Body of `POST /api/enrich`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichRequest {
    pub rows: Vec<Value>,
    /// Groups to use. When absent, the groups of `report_type` are used;
    /// when both are absent there are no groups and only aggregates are written.
    #[serde(default)]
    pub groups: Option<Vec<Group>>,
    /// Report type for group lookup
    #[serde(default)]
    pub report_type: Option<String>,
}

/// Response of the enrich and upload endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichResponse {
    pub request_id: String,
    /// "ready", or "empty" when no rows were sent
    pub status: String,
    pub rows: Vec<Value>,
    pub summary: EnrichSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceMetadata>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub columns: Vec<String>,
}

impl From<SourceInfo> for SourceMetadata {
    fn from(info: SourceInfo) -> Self {
        Self {
            encoding: info.encoding,
            delimiter: info.delimiter.to_string(),
            columns: info.headers,
        }
    }
}

impl From<EnrichResult> for EnrichResponse {
    fn from(result: EnrichResult) -> Self {
        let status = if result.rows.is_empty() { "empty" } else { "ready" };
        EnrichResponse {
            request_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            rows: result.rows,
            summary: result.summary,
            source: result.source.map(SourceMetadata::from),
        }
    }
}

/// Query of `GET /api/screener/{report_type}/{subtype}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    /// Page size; 0 returns every row
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

/// One page of screener rows.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse {
    pub items: Vec<Value>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl PaginatedResponse {
    /// Slice `rows` by `query`. An offset past the end yields an empty page.
    pub fn page(rows: &[Value], query: &PageQuery) -> Self {
        let start = query.offset.min(rows.len());
        let end = if query.limit == 0 {
            rows.len()
        } else {
            start.saturating_add(query.limit).min(rows.len())
        };

        Self {
            items: rows[start..end].to_vec(),
            total: rows.len(),
            limit: query.limit,
            offset: query.offset,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "requestId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "rows": []
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({ "code": i })).collect()
    }

    #[test]
    fn test_enrich_request_defaults() {
        let req: EnrichRequest = serde_json::from_value(json!({ "rows": [] })).unwrap();
        assert!(req.rows.is_empty());
        assert!(req.groups.is_none());
        assert!(req.report_type.is_none());

        let req: EnrichRequest = serde_json::from_value(json!({
            "rows": [{ "open_interest": 10 }],
            "groups": [{ "key": "comm" }],
            "report_type": "disagg"
        }))
        .unwrap();
        assert_eq!(req.groups.unwrap()[0].key, "comm");
        assert_eq!(req.report_type.as_deref(), Some("disagg"));
    }

    #[test]
    fn test_page_limit_offset() {
        let all = rows(10);
        let page = PaginatedResponse::page(&all, &PageQuery { limit: 3, offset: 8 });
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0]["code"], 8);
        assert_eq!(page.total, 10);
    }

    #[test]
    fn test_page_limit_zero_returns_all() {
        let all = rows(4);
        let page = PaginatedResponse::page(&all, &PageQuery { limit: 0, offset: 1 });
        assert_eq!(page.items.len(), 3);
    }

    #[test]
    fn test_page_offset_past_end() {
        let all = rows(2);
        let page = PaginatedResponse::page(&all, &PageQuery { limit: 5, offset: 9 });
        assert!(page.items.is_empty());
        assert_eq!(page.offset, 9);
    }

    #[test]
    fn test_response_from_result() {
        let result = EnrichResult {
            rows: rows(2),
            summary: EnrichSummary {
                row_count: 2,
                ..Default::default()
            },
            source: Some(SourceInfo {
                encoding: "utf-8".into(),
                delimiter: ';',
                headers: vec!["code".into()],
            }),
        };
        let response = EnrichResponse::from(result);
        assert_eq!(response.status, "ready");
        assert_eq!(response.source.unwrap().delimiter, ";");

        let json = error_response("boom");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
    }
}
