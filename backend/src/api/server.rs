//! HTTP server for the screener API.
//!
//! # API Endpoints
//!
//! | Method | Path                                  | Description                         |
//! |--------|---------------------------------------|-------------------------------------|
//! | GET    | `/health`                             | Health check                        |
//! | POST   | `/api/enrich`                         | Enrich rows sent as JSON            |
//! | POST   | `/api/upload`                         | Enrich an uploaded CSV/JSON file    |
//! | GET    | `/api/groups/{report_type}`           | Configured trader groups            |
//! | GET    | `/api/snapshots`                      | Stored snapshots                    |
//! | GET    | `/api/screener/{report_type}/{subtype}` | Enriched snapshot, paginated      |
//! | DELETE | `/api/cache`                          | Drop cached screener tables         |
//! | GET    | `/api/logs`                           | SSE stream for real-time logs       |
//! | GET    | `/snapshots/*`                        | Raw snapshot files                  |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{delete, get, post},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::{cors::CorsLayer, services::ServeDir};

use super::logs::{log_error, log_info, log_success, LOG_BROADCASTER};
use super::types::{error_response, EnrichRequest, EnrichResponse, PageQuery, PaginatedResponse};
use crate::cache::{SnapshotStore, TtlCache};
use crate::config::{ReportGroups, Settings};
use crate::error::{ConfigResult, PipelineError, ServerError, ServerResult, StoreError};
use crate::models::{ReportType, Subtype};
use crate::transform::enrich::enrich_json;
use crate::transform::pipeline::{enrich_bytes, enrich_records, EnrichOptions};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared server state
pub struct AppState {
    pub settings: Settings,
    pub groups: ReportGroups,
    pub store: SnapshotStore,
    /// Enriched screener tables keyed `screener:{report_type}:{subtype}`
    pub cache: TtlCache<Arc<Vec<Value>>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(settings: Settings) -> ConfigResult<Self> {
        let groups = settings.report_groups()?;
        Ok(Self::with_groups(settings, groups))
    }

    pub fn with_groups(settings: Settings, groups: ReportGroups) -> Self {
        Self {
            store: SnapshotStore::with_dir(&settings.data_dir),
            cache: TtlCache::new("screener", settings.cache_ttl),
            groups,
            settings,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(err) => match err {
                PipelineError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
                PipelineError::Parse(_)
                | PipelineError::InvalidRows(_)
                | PipelineError::Json(_)
                | PipelineError::Config(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        let message = self.to_string();
        if status.is_server_error() {
            log_error(&message);
        }
        (status, Json(error_response(&message))).into_response()
    }
}

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let snapshots = ServeDir::new(state.store.dir());

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/enrich", post(enrich))
        .route("/api/upload", post(upload))
        .route("/api/groups/{report_type}", get(groups))
        .route("/api/snapshots", get(list_snapshots))
        .route("/api/screener/{report_type}/{subtype}", get(screener))
        .route("/api/cache", delete(clear_cache))
        .route("/api/logs", get(sse_logs))
        .nest_service("/snapshots", snapshots)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let port = settings.port;
    let state = Arc::new(AppState::new(settings)?);
    let app = router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Screener server running on http://localhost:{}", port);
    println!("   POST /api/enrich                    - Enrich JSON rows");
    println!("   POST /api/upload                    - Enrich a CSV/JSON file");
    println!("   GET  /api/groups/{{report_type}}      - Trader groups");
    println!("   GET  /api/screener/{{rt}}/{{subtype}}   - Screener table");
    println!("   GET  /api/logs                      - SSE log stream");
    println!("   Snapshots: {}", state.store.dir().display());
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "cot-screener",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "enrich": "POST /api/enrich",
            "upload": "POST /api/upload",
            "screener": "GET /api/screener/{report_type}/{subtype}",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// Report type named in a request body; `None` when the field is absent.
fn parse_report_type(raw: Option<&str>) -> ServerResult<Option<ReportType>> {
    raw.map(|s| {
        s.parse()
            .map_err(|e: crate::error::ConfigError| ServerError::BadRequest(e.to_string()))
    })
    .transpose()
}

async fn enrich(
    State(state): State<SharedState>,
    Json(request): Json<EnrichRequest>,
) -> ServerResult<Json<EnrichResponse>> {
    let report_type = parse_report_type(request.report_type.as_deref())?;
    // No groups and no report type: nothing to look up, only aggregates are written
    let groups = match (request.groups, report_type) {
        (Some(groups), _) => groups,
        (None, Some(rt)) => state.groups.get(rt).to_vec(),
        (None, None) => Vec::new(),
    };

    let result = enrich_records(request.rows, &groups);
    Ok(Json(EnrichResponse::from(result)))
}

async fn upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ServerResult<Json<EnrichResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut report_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                file_data = Some(bytes.to_vec());
            }
            "report_type" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                report_type = Some(text);
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;
    let report_type = parse_report_type(report_type.as_deref())?;

    log_info(format!(
        "📄 Upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let options = EnrichOptions {
        report_type,
        groups: report_type.map(|rt| state.groups.get(rt).to_vec()),
        ..Default::default()
    };
    let result = enrich_bytes(&bytes, options)?;
    Ok(Json(EnrichResponse::from(result)))
}

async fn groups(
    State(state): State<SharedState>,
    Path(report_type): Path<String>,
) -> ServerResult<Json<Value>> {
    let report_type: ReportType = report_type.parse()?;
    Ok(Json(json!({
        "report_type": report_type,
        "display_name": report_type.display_name(),
        "groups": state.groups.get(report_type)
    })))
}

async fn list_snapshots(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "snapshots": state.store.list() }))
}

async fn screener(
    State(state): State<SharedState>,
    Path((report_type, subtype)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> ServerResult<Json<PaginatedResponse>> {
    let report_type: ReportType = report_type.parse()?;
    let subtype: Subtype = subtype.parse()?;
    let rows = screener_rows(&state, report_type, subtype)?;
    Ok(Json(PaginatedResponse::page(&rows, &query)))
}

/// Enriched rows of a snapshot, from cache when fresh.
fn screener_rows(
    state: &AppState,
    report_type: ReportType,
    subtype: Subtype,
) -> ServerResult<Arc<Vec<Value>>> {
    let key = format!("screener:{}:{}", report_type, subtype);
    if let Some(rows) = state.cache.get(&key) {
        return Ok(rows);
    }

    let mut rows = state.store.load(report_type, subtype)?.rows;
    enrich_json(&mut rows, state.groups.get(report_type));
    log_success(format!("Cached {} ({} rows)", key, rows.len()));

    let rows = Arc::new(rows);
    state.cache.insert(key, rows.clone());
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct CacheQuery {
    pattern: Option<String>,
}

async fn clear_cache(
    State(state): State<SharedState>,
    Query(query): Query<CacheQuery>,
) -> Json<Value> {
    let cleared = state.cache.invalidate(query.pattern.as_deref());
    Json(json!({ "cleared": cleared }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip the dropped entries
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Group;
    use tempfile::{tempdir, TempDir};

    fn state() -> (TempDir, SharedState) {
        let dir = tempdir().unwrap();
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        (dir, Arc::new(AppState::with_groups(settings, ReportGroups::defaults())))
    }

    fn raw_rows() -> Vec<Value> {
        vec![
            json!({ "code": "A", "open_interest": 1000, "g1_long": 300, "g1_short": 100 }),
            json!({ "code": "B", "open_interest": 0, "g1_long": 5, "g1_short": 5 }),
            json!({ "code": "C", "open_interest": 200 }),
        ]
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_enrich_with_explicit_groups() {
        let (_dir, state) = state();
        let request = EnrichRequest {
            rows: vec![json!({
                "open_interest": 1000,
                "comm_long": 300, "comm_short": 100,
                "noncomm_long": 200, "noncomm_short": 400
            })],
            groups: Some(vec![Group::new("comm"), Group::new("noncomm")]),
            report_type: None,
        };

        let Json(response) = enrich(State(state), Json(request)).await.unwrap();
        assert_eq!(response.status, "ready");
        assert_eq!(response.rows[0]["comm_pct_oi_total"], json!(40));
        assert_eq!(response.rows[0]["noncomm_pct_oi_total"], json!(60));
        assert_eq!(response.summary.group_count, 2);
    }

    #[tokio::test]
    async fn test_enrich_unknown_report_type() {
        let (_dir, state) = state();
        let request = EnrichRequest {
            rows: vec![],
            groups: None,
            report_type: Some("weekly".into()),
        };
        let err = enrich(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_enrich_without_groups_writes_only_aggregates() {
        let (_dir, state) = state();
        let request: EnrichRequest = serde_json::from_value(json!({
            "rows": [{ "open_interest": 100, "g1_long": 10, "g1_short": 30 }]
        }))
        .unwrap();

        let Json(response) = enrich(State(state), Json(request)).await.unwrap();
        let row = &response.rows[0];
        assert_eq!(response.summary.group_count, 0);
        assert!(row.get("g1_total").is_none());
        assert!(row.get("g1_pct_oi_total").is_none());
        assert!(row["all_long"].is_null());
        assert!(row["all_short"].is_null());
        assert!(row["all_short_ratio"].is_null());
        assert_eq!(row["g1_long"], json!(10));
    }

    #[tokio::test]
    async fn test_enrich_report_type_selects_configured_groups() {
        let (_dir, state) = state();
        let request: EnrichRequest = serde_json::from_value(json!({
            "rows": [{ "open_interest": 100, "g1_long": 10, "g1_short": 30 }],
            "report_type": "legacy"
        }))
        .unwrap();

        let Json(response) = enrich(State(state), Json(request)).await.unwrap();
        assert_eq!(response.summary.group_count, 3);
        assert_eq!(response.rows[0]["g1_total"], json!(40));
        assert_eq!(response.rows[0]["all_long"], json!(10));
    }

    #[tokio::test]
    async fn test_enrich_explicit_empty_groups() {
        let (_dir, state) = state();
        let request: EnrichRequest = serde_json::from_value(json!({
            "rows": [{ "open_interest": 100, "g1_long": 10, "g1_short": 30 }],
            "groups": [],
            "report_type": "legacy"
        }))
        .unwrap();

        let Json(response) = enrich(State(state), Json(request)).await.unwrap();
        assert_eq!(response.summary.group_count, 0);
        assert!(response.rows[0].get("g1_total").is_none());
    }

    #[tokio::test]
    async fn test_groups_endpoint() {
        let (_dir, state) = state();
        let Json(body) = groups(State(state.clone()), Path("tff".into())).await.unwrap();
        assert_eq!(body["groups"].as_array().unwrap().len(), 5);

        let err = groups(State(state), Path("weekly".into())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_screener_paginates_and_caches() {
        let (_dir, state) = state();
        state
            .store
            .save(ReportType::Legacy, Subtype::Fo, raw_rows())
            .unwrap();

        let Json(page) = screener(
            State(state.clone()),
            Path(("legacy".into(), "fo".into())),
            Query(PageQuery { limit: 2, offset: 0 }),
        )
        .await
        .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0]["g1_total"], json!(400));
        assert_eq!(page.items[0]["g1_pct_oi_total"], json!(40));
        assert!(page.items[1]["g1_pct_oi_total"].is_null());
        assert_eq!(state.cache.len(), 1);

        // Served from cache even after the file is gone
        state.store.delete(ReportType::Legacy, Subtype::Fo).unwrap();
        let Json(page) = screener(
            State(state.clone()),
            Path(("legacy".into(), "fo".into())),
            Query(PageQuery { limit: 0, offset: 2 }),
        )
        .await
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0]["code"], "C");
    }

    #[tokio::test]
    async fn test_screener_missing_snapshot() {
        let (_dir, state) = state();
        let err = screener(
            State(state),
            Path(("disagg".into(), "co".into())),
            Query(PageQuery { limit: 0, offset: 0 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let (_dir, state) = state();
        state.cache.insert("screener:legacy:fo", Arc::new(vec![]));
        state.cache.insert("screener:tff:co", Arc::new(vec![]));

        let Json(body) = clear_cache(
            State(state.clone()),
            Query(CacheQuery {
                pattern: Some("tff".into()),
            }),
        )
        .await;
        assert_eq!(body["cleared"], 1);
        assert_eq!(state.cache.len(), 1);
    }

    #[test]
    fn test_pipeline_error_status() {
        let err = ServerError::Pipeline(PipelineError::InvalidRows("not an array".into()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = ServerError::Pipeline(PipelineError::Io(std::io::Error::other("disk")));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
