// REST API - thin mapping from HTTP onto the ledger and RSVP book
//
// Every store call runs on the blocking pool; request tasks only await.

use crate::config::Config;
use crate::db::Store;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;
use crate::models::{ContributionCreate, GiftItem, Rsvp, RsvpCreate};
use crate::parser::{
    read_registry_list_rows, read_registry_rows, write_contributions_csv, write_registry_csv,
    write_rsvps_csv,
};
use crate::rsvp;
use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: Store,
    pub ledger: Ledger,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            store,
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ContributeResponse {
    message: String,
    new_total: f64,
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    items_count: usize,
    total_contributions: usize,
}

#[derive(Serialize)]
struct RegistryListUploadResponse {
    message: String,
    items_count: usize,
}

/// Error body: `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "Internal server error".to_string(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        if !err.is_client_error() {
            tracing::error!(error = %err, "request failed");
            return Self::internal();
        }

        match err {
            LedgerError::NotFound(detail) => Self {
                status: StatusCode::NOT_FOUND,
                detail,
            },
            LedgerError::InvalidOperation(detail) => Self::bad_request(detail),
            err => {
                tracing::warn!(error = %err, "rejected upload");
                Self::bad_request(format!("Invalid CSV: {}", err))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn run_blocking<T, F>(task: F) -> ApiResult<T>
where
    F: FnOnce() -> LedgerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "blocking task failed");
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}

/// Body of the multipart part named `file` (or the first part carrying a filename)
async fn read_upload(mut multipart: Multipart) -> ApiResult<Bytes> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Could not read upload: {}", e)))?
    {
        if field.name() == Some("file") || field.file_name().is_some() {
            return field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Could not read upload: {}", e)));
        }
    }

    Err(ApiError::bad_request("No file uploaded"))
}

fn csv_attachment(filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api
async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Wedding Registry API".to_string(),
    })
}

/// GET /api/health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
    })
}

/// POST /api/rsvp
async fn create_rsvp(State(state): State<AppState>, Json(input): Json<RsvpCreate>) -> ApiResult<Json<Rsvp>> {
    let store = state.store.clone();
    let rsvp = run_blocking(move || rsvp::create_rsvp(&store, input)).await?;
    Ok(Json(rsvp))
}

/// GET /api/rsvp
async fn list_rsvps(State(state): State<AppState>) -> ApiResult<Json<Vec<Rsvp>>> {
    let store = state.store.clone();
    let rsvps = run_blocking(move || rsvp::list_rsvps(&store)).await?;
    Ok(Json(rsvps))
}

/// GET /api/rsvp/export
async fn export_rsvps(State(state): State<AppState>) -> ApiResult<Response> {
    let store = state.store.clone();
    let body = run_blocking(move || {
        let rsvps = rsvp::list_rsvps(&store)?;
        let mut out = Vec::new();
        write_rsvps_csv(&rsvps, &mut out)?;
        Ok(out)
    })
    .await?;
    Ok(csv_attachment("rsvps.csv", body))
}

/// GET /api/registry
async fn list_registry(State(state): State<AppState>) -> ApiResult<Json<Vec<GiftItem>>> {
    let ledger = state.ledger.clone();
    let items = run_blocking(move || ledger.list_items()).await?;
    Ok(Json(items))
}

/// GET /api/registry/export - one row per contribution
async fn export_contributions(State(state): State<AppState>) -> ApiResult<Response> {
    let ledger = state.ledger.clone();
    let body = run_blocking(move || {
        let items = ledger.list_items()?;
        let mut out = Vec::new();
        write_contributions_csv(&items, &mut out)?;
        Ok(out)
    })
    .await?;
    Ok(csv_attachment("gift_contributions.csv", body))
}

/// GET /api/registry/snapshot - registry in the upload-csv layout
async fn export_registry(State(state): State<AppState>) -> ApiResult<Response> {
    let ledger = state.ledger.clone();
    let body = run_blocking(move || {
        let items = ledger.list_items()?;
        let mut out = Vec::new();
        write_registry_csv(&items, &mut out)?;
        Ok(out)
    })
    .await?;
    Ok(csv_attachment("registry.csv", body))
}

/// POST /api/registry/contribute
async fn contribute(
    State(state): State<AppState>,
    Json(input): Json<ContributionCreate>,
) -> ApiResult<Json<ContributeResponse>> {
    let ledger = state.ledger.clone();
    let new_total = run_blocking(move || {
        ledger.contribute(&input.item_id, &input.contributor_name, input.amount)
    })
    .await?;

    Ok(Json(ContributeResponse {
        message: "Contribution added successfully".to_string(),
        new_total,
    }))
}

/// POST /api/registry/upload-csv
async fn upload_csv(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    let data = read_upload(multipart).await?;
    let ledger = state.ledger.clone();
    let summary = run_blocking(move || {
        let rows = read_registry_rows(data.as_ref())?;
        ledger.bulk_load_with_contributions(&rows)
    })
    .await?;

    Ok(Json(UploadResponse {
        message: "Registry updated successfully".to_string(),
        items_count: summary.items_count,
        total_contributions: summary.total_contributions,
    }))
}

/// POST /api/registry/upload-registry-list
async fn upload_registry_list(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<RegistryListUploadResponse>> {
    let data = read_upload(multipart).await?;
    let ledger = state.ledger.clone();
    let items_count = run_blocking(move || {
        let rows = read_registry_list_rows(data.as_ref())?;
        ledger.bulk_load_items_only(&rows)
    })
    .await?;

    Ok(Json(RegistryListUploadResponse {
        message: "Registry list updated successfully".to_string(),
        items_count,
    }))
}

/// DELETE /api/registry/:item_id/contribution/:index
async fn delete_contribution(
    State(state): State<AppState>,
    Path((item_id, index)): Path<(String, String)>,
) -> ApiResult<Json<MessageResponse>> {
    // Negative or non-numeric indices never wrap around
    let index: usize = index
        .parse()
        .map_err(|_| ApiError::from(LedgerError::contribution_not_found()))?;

    let ledger = state.ledger.clone();
    run_blocking(move || ledger.delete_contribution(&item_id, index)).await?;

    Ok(Json(MessageResponse {
        message: "Contribution deleted successfully".to_string(),
    }))
}

// ============================================================================
// Router
// ============================================================================

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// All routes under `/api`, with request tracing and CORS
pub fn build_router(state: AppState, config: &Config) -> Router {
    let api_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/rsvp", get(list_rsvps).post(create_rsvp))
        .route("/rsvp/export", get(export_rsvps))
        .route("/registry", get(list_registry))
        .route("/registry/export", get(export_contributions))
        .route("/registry/snapshot", get(export_registry))
        .route("/registry/contribute", post(contribute))
        .route("/registry/upload-csv", post(upload_csv))
        .route("/registry/upload-registry-list", post(upload_registry_list))
        .route("/registry/:item_id/contribution/:index", delete(delete_contribution))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(config)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BOUNDARY: &str = "----registry-test-boundary";

    fn test_app() -> (Router, AppState) {
        let state = AppState::new(Store::open_in_memory().unwrap());
        let app = build_router(state.clone(), &Config::default());
        (app, state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_request(uri: &str, csv: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"registry.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {csv}\r\n\
             --{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn delete_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_ledger_errors_map_to_status() {
        let cases = [
            (LedgerError::item_not_found(), StatusCode::NOT_FOUND),
            (LedgerError::InvalidOperation("too much".into()), StatusCode::BAD_REQUEST),
            (LedgerError::MalformedInput("no header".into()), StatusCode::BAD_REQUEST),
            (LedgerError::Store(rusqlite::Error::InvalidQuery), StatusCode::INTERNAL_SERVER_ERROR),
            (LedgerError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }

        // Server-side failures never leak their cause
        let err = ApiError::from(LedgerError::Internal("secret path".into()));
        assert_eq!(err.detail, "Internal server error");
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (app, _) = test_app();

        let (status, body) = send(&app, get_request("/api")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Wedding Registry API");

        let (status, body) = send(&app, get_request("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_rsvp_create_and_list() {
        let (app, _) = test_app();

        let (status, created) = send(
            &app,
            json_request(
                Method::POST,
                "/api/rsvp",
                json!({"name": "Aunt May", "pax": 2, "wishes": "Congrats!"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["name"], "Aunt May");
        assert_eq!(created["pax"], 2);
        assert!(created["id"].as_str().is_some());
        assert!(created["timestamp"].as_str().is_some());

        let (status, listed) = send(&app, get_request("/api/rsvp")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], created["id"]);
    }

    #[tokio::test]
    async fn test_rsvp_missing_field_rejected() {
        let (app, _) = test_app();
        let (status, _) = send(
            &app,
            json_request(Method::POST, "/api/rsvp", json!({"name": "Aunt May"})),
        )
        .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_contribute_flow() {
        let (app, state) = test_app();
        state.ledger.seed_defaults().unwrap();

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/registry/contribute",
                json!({"item_id": "plates", "contributor_name": "Amy", "amount": 100.0}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Contribution added successfully");
        assert_eq!(body["new_total"], 100.0);

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/registry/contribute",
                json!({"item_id": "plates", "contributor_name": "Ben", "amount": 1.0}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Contribution exceeds item total");

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/registry/contribute",
                json!({"item_id": "yacht", "contributor_name": "Ben", "amount": 1.0}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Item not found");

        let (_, registry) = send(&app, get_request("/api/registry")).await;
        let plates = &registry[0];
        assert_eq!(plates["id"], "plates");
        assert_eq!(plates["contributed"], 100.0);
        assert_eq!(plates["contributions"][0]["contributor_name"], "Amy");
    }

    #[tokio::test]
    async fn test_upload_csv_replaces_registry() {
        let (app, state) = test_app();
        state.ledger.seed_defaults().unwrap();

        let csv = "Item_name, Link, Total, Contributor, Amount, Timestamp\n\
                   Plates, L, 100, 0, , \n\
                   Plates, L, 100, Amy, 30, 2024-01-01T00:00:00Z\n\
                   Carpet, L, 200, John Doe, 50, \n";

        let (status, body) = send(&app, upload_request("/api/registry/upload-csv", csv)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items_count"], 2);
        assert_eq!(body["total_contributions"], 2);

        let (_, registry) = send(&app, get_request("/api/registry")).await;
        let items = registry.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], "plates");
        assert_eq!(items[0]["contributed"], 30.0);
        assert_eq!(items[0]["contributions"][0]["timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(items[1]["id"], "carpet");
    }

    #[tokio::test]
    async fn test_upload_csv_missing_columns_is_bad_request() {
        let (app, state) = test_app();
        state.ledger.seed_defaults().unwrap();

        let (status, body) = send(
            &app,
            upload_request("/api/registry/upload-csv", "Item,Link,Total\nCarpet,L,200\n"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("missing required column"));

        // Rejected upload leaves the registry alone
        assert_eq!(state.ledger.list_items().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_upload_registry_list() {
        let (app, _) = test_app();

        let (status, body) = send(
            &app,
            upload_request("/api/registry/upload-registry-list", "Item,Link,Total\nCarpet,L,200\n"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items_count"], 1);

        let (_, registry) = send(&app, get_request("/api/registry")).await;
        assert_eq!(registry[0]["id"], "carpet");
        assert_eq!(registry[0]["contributed"], 0.0);
        assert_eq!(registry[0]["contributions"], json!([]));
    }

    #[tokio::test]
    async fn test_upload_without_file_is_bad_request() {
        let (app, _) = test_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/registry/upload-registry-list")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(format!("--{BOUNDARY}--\r\n")))
            .unwrap();

        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_contribution_routes() {
        let (app, state) = test_app();
        state.ledger.seed_defaults().unwrap();
        state.ledger.contribute("carpet", "A", 10.0).unwrap();
        state.ledger.contribute("carpet", "B", 20.0).unwrap();

        let (status, body) = send(&app, delete_request("/api/registry/carpet/contribution/0")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Contribution deleted successfully");

        let carpet = state.ledger.get_item("carpet").unwrap();
        assert_eq!(carpet.contributed, 20.0);
        assert_eq!(carpet.contributions[0].contributor_name, "B");

        for uri in [
            "/api/registry/carpet/contribution/5",
            "/api/registry/carpet/contribution/-1",
            "/api/registry/carpet/contribution/first",
            "/api/registry/yacht/contribution/0",
        ] {
            let (status, _) = send(&app, delete_request(uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }
        assert_eq!(state.ledger.get_item("carpet").unwrap(), carpet);
    }

    #[tokio::test]
    async fn test_csv_exports() {
        let (app, state) = test_app();
        state.ledger.seed_defaults().unwrap();
        state.ledger.contribute("bicycle", "Amy", 25.0).unwrap();

        let response = app.clone().oneshot(get_request("/api/registry/export")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("Item_Name,Contributor_Name,Amount,Timestamp\n"));
        assert!(text.contains("Bicycle,Amy,25.00,"));

        let response = app.clone().oneshot(get_request("/api/rsvp/export")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/api/registry/snapshot")).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let rows = read_registry_rows(bytes.as_ref()).unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_contribute_requests() {
        let (app, state) = test_app();
        state.ledger.create_item("vase", "Vase", "L", 50.0).unwrap();

        let requests = (0..6).map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                send(
                    &app,
                    json_request(
                        Method::POST,
                        "/api/registry/contribute",
                        json!({"item_id": "vase", "contributor_name": format!("guest-{i}"), "amount": 20.0}),
                    ),
                )
                .await
                .0
            })
        });

        let mut accepted = 0;
        for handle in requests.collect::<Vec<_>>() {
            if handle.await.unwrap() == StatusCode::OK {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 2);
        let vase = state.ledger.get_item("vase").unwrap();
        assert_eq!(vase.contributed, 40.0);
        assert_eq!(vase.contributions.len(), 2);
    }
}
