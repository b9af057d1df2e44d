// Ledger Pivot - Web Server
// REST API with Axum over a single in-memory session

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use ledger_pivot::{
    csv_string, decode_dataset, detect_format, sample_dataset, DecodeOptions, FieldBinding,
    FieldKind, PivotError, Session, SourceFormat, SummaryReport,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ledger-pivot-server", version, about = "HTTP API for ledger pivot summaries")]
struct ServerArgs {
    /// Address to bind
    #[arg(long, env = "LEDGER_PIVOT_ADDR", default_value = "0.0.0.0:3000")]
    addr: String,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

/// Shared application state
#[derive(Clone, Default)]
struct AppState {
    session: Arc<Mutex<Session>>,
}

impl AppState {
    /// A panic mid-request leaves the session itself consistent; keep serving.
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

/// Dataset response after an ingestion
#[derive(Serialize)]
struct DatasetResponse {
    dataset_id: Uuid,
    source: String,
    rows: usize,
    fields: Vec<String>,
    binding: FieldBinding,
}

#[derive(Serialize)]
struct FieldsResponse {
    available: Vec<String>,
    binding: FieldBinding,
    overrides: FieldBinding,
}

#[derive(Deserialize)]
struct IngestParams {
    format: Option<String>,
    header_row: Option<usize>,
    /// Original file name; used for the format when `format` is absent
    name: Option<String>,
}

#[derive(Deserialize)]
struct FieldUpdate {
    name: Option<String>,
}

// ============================================================================
// Error mapping
// ============================================================================

fn status_for(error: &PivotError) -> StatusCode {
    match error {
        PivotError::DecodeFailure(_)
        | PivotError::EmptyDataset
        | PivotError::UnsupportedFormat(_)
        | PivotError::Csv(_) => StatusCode::BAD_REQUEST,
        PivotError::NoDataset | PivotError::UnknownAccount(_) => StatusCode::NOT_FOUND,
        PivotError::FieldNotFound(_)
        | PivotError::NoValidAccounts
        | PivotError::NoValidDates => StatusCode::UNPROCESSABLE_ENTITY,
        PivotError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: PivotError) -> Response {
    let status = status_for(&error);
    warn!("{} → {}", error, status);
    (status, Json(ApiResponse::err(error.to_string()))).into_response()
}

fn respond<T: Serialize>(result: ledger_pivot::Result<T>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(e) => error_response(e),
    }
}

fn current_report(session: &mut Session) -> ledger_pivot::Result<SummaryReport> {
    session.report()
}

fn dataset_response(session: &mut Session) -> ledger_pivot::Result<DatasetResponse> {
    let binding = session.binding()?;
    let dataset = session.dataset().ok_or(PivotError::NoDataset)?;
    Ok(DatasetResponse {
        dataset_id: dataset.id,
        source: dataset.source.clone(),
        rows: dataset.len(),
        fields: dataset.available_fields(),
        binding,
    })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/ingest - Decode the raw request body as a new dataset
async fn ingest(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
    body: Bytes,
) -> Response {
    let format = match (&params.format, &params.name) {
        (Some(format), _) => format.parse::<SourceFormat>(),
        (None, Some(name)) => detect_format(std::path::Path::new(name)),
        (None, None) => Err(PivotError::UnsupportedFormat(
            "pass ?format=csv|xlsx|xls or ?name=<file>".to_string(),
        )),
    };
    let format = match format {
        Ok(format) => format,
        Err(e) => return error_response(e),
    };

    let options = DecodeOptions {
        header_row: params.header_row,
    };
    let source = params.name.unwrap_or_else(|| "upload".to_string());

    // Lock only around the ticket bookkeeping, never across the decode
    let ticket = state.session().begin_ingest();
    info!("Ingesting {} ({} bytes, {})", source, body.len(), format.name());

    let decoded = tokio::task::spawn_blocking(move || {
        decode_dataset(format, &body, &source, &options)
    })
    .await
    .unwrap_or_else(|e| Err(PivotError::DecodeFailure(format!("decoder task failed: {}", e))));

    let mut session = state.session();
    match session.finish_ingest(ticket, decoded) {
        Ok(true) => respond(dataset_response(&mut session)),
        Ok(false) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::err("superseded by a newer upload")),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/sample - Load the built-in sample ledger
async fn load_sample(State(state): State<AppState>) -> Response {
    let mut session = state.session();
    let ticket = session.begin_ingest();
    match session.finish_ingest(ticket, Ok(sample_dataset())) {
        Ok(_) => respond(dataset_response(&mut session)),
        Err(e) => error_response(e),
    }
}

/// GET /api/summary - Current pivot summary
async fn get_summary(State(state): State<AppState>) -> Response {
    respond(current_report(&mut state.session()))
}

/// GET /api/fields - Available columns, effective binding and overrides
async fn get_fields(State(state): State<AppState>) -> Response {
    let mut session = state.session();
    let result = session.binding().map(|binding| FieldsResponse {
        available: session.available_fields(),
        binding,
        overrides: session.filters().overrides().clone(),
    });
    respond(result)
}

/// PUT /api/fields/:kind - Pin a field to a column (`null` = auto-detect)
async fn put_field(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(update): Json<FieldUpdate>,
) -> Response {
    let kind: FieldKind = match kind.parse() {
        Ok(kind) => kind,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::err(message))).into_response()
        }
    };

    let mut session = state.session();
    let result = session
        .set_field_override(kind, update.name)
        .and_then(|_| current_report(&mut session));
    respond(result)
}

/// POST /api/exclusions/:account - Exclude an account
async fn exclude_account(State(state): State<AppState>, Path(account): Path<String>) -> Response {
    let mut session = state.session();
    let result = session
        .exclude(&account)
        .and_then(|_| current_report(&mut session));
    respond(result)
}

/// DELETE /api/exclusions/:account - Restore an excluded account
async fn restore_account(State(state): State<AppState>, Path(account): Path<String>) -> Response {
    let mut session = state.session();
    let result = session
        .restore(&account)
        .and_then(|_| current_report(&mut session));
    respond(result)
}

/// GET /api/export.csv - Download the summary as CSV
async fn export_csv(State(state): State<AppState>) -> Response {
    let result = state.session().summary().and_then(|s| csv_string(&s));
    match result {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"ledger-summary.csv\"",
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ingest", post(ingest))
        .route("/sample", post(load_sample))
        .route("/summary", get(get_summary))
        .route("/fields", get(get_fields))
        .route("/fields/:kind", put(put_field))
        .route(
            "/exclusions/:account",
            post(exclude_account).delete(restore_account),
        )
        .route("/export.csv", get(export_csv))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("🌐 Ledger Pivot - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let app = build_router(AppState::default());

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", args.addr, e))?;

    println!("\n🚀 Server running on http://{}", args.addr);
    println!("   API: http://{}/api/summary", args.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn call_json(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let (status, bytes) = call(app, method, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn app() -> Router {
        build_router(AppState::default())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call_json(&app(), "GET", "/api/health", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_summary_without_dataset() {
        let (status, body) = call_json(&app(), "GET", "/api/summary", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_sample_then_summary() {
        let app = app();
        let (status, body) = call_json(&app, "POST", "/api/sample", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["rows"], 6);
        assert_eq!(body["data"]["binding"]["account"], "Split");

        let (status, body) = call_json(&app, "GET", "/api/summary", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["grand_total"], 11200.0);
        assert_eq!(body["data"]["months"][0], "1/2023");
    }

    #[tokio::test]
    async fn test_ingest_csv() {
        let app = app();
        let csv = "Date,Split,Amount\n01/15/2023,Rent,\"$1,000\"\n02/01/2023,Rent,500\n";
        let (status, body) =
            call_json(&app, "POST", "/api/ingest?format=csv", Body::from(csv)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["source"], "upload");
        assert_eq!(body["data"]["fields"][1], "Split");

        let (_, body) = call_json(&app, "GET", "/api/summary", Body::empty()).await;
        assert_eq!(body["data"]["rows"][0]["total"], 1500.0);
    }

    #[tokio::test]
    async fn test_ingest_by_name_and_bad_format() {
        let app = app();
        let csv = "Date,Split,Amount\n01/15/2023,Rent,10\n";
        let (status, _) =
            call_json(&app, "POST", "/api/ingest?name=gl.csv", Body::from(csv)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call_json(&app, "POST", "/api/ingest?format=pdf", Body::from(csv)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call_json(&app, "POST", "/api/ingest?format=xlsx", Body::from("garbage")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Failed uploads leave the previous dataset in place
        let (status, _) = call_json(&app, "GET", "/api/summary", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_exclude_and_restore() {
        let app = app();
        call(&app, "POST", "/api/sample", Body::empty()).await;

        let (status, body) =
            call_json(&app, "POST", "/api/exclusions/Account%202", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["accounts"].as_array().unwrap().len(), 3);
        assert_eq!(body["data"]["excluded"][0]["account"], "Account 2");
        assert_eq!(body["data"]["excluded"][0]["total"], 3200.0);

        let (status, _) = call_json(&app, "POST", "/api/exclusions/Nope", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            call_json(&app, "DELETE", "/api/exclusions/Account%202", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["accounts"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_field_override() {
        let app = app();
        call(&app, "POST", "/api/sample", Body::empty()).await;

        // A column the data lacks is recorded as given; aggregation then finds no dates
        let (status, body) = call_json(
            &app,
            "PUT",
            "/api/fields/date",
            Body::from(r#"{"name": "Missing"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "no valid dates found in the data");

        let (_, body) = call_json(&app, "GET", "/api/fields", Body::empty()).await;
        assert_eq!(body["data"]["overrides"]["date"], "Missing");

        let (status, _) =
            call_json(&app, "PUT", "/api/fields/date", Body::from(r#"{"name": null}"#)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) =
            call_json(&app, "PUT", "/api/fields/colour", Body::from(r#"{"name": null}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Using the date column as account gives one account per date string
        let (status, body) = call_json(
            &app,
            "PUT",
            "/api/fields/account",
            Body::from(r#"{"name": "Date"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["accounts"].as_array().unwrap().len(), 6);

        let (_, body) = call_json(&app, "GET", "/api/fields", Body::empty()).await;
        assert_eq!(body["data"]["overrides"]["account"], "Date");
        assert_eq!(body["data"]["available"].as_array().unwrap().len(), 3);

        let (status, body) = call_json(
            &app,
            "PUT",
            "/api/fields/account",
            Body::from(r#"{"name": null}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["accounts"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_export_csv() {
        let app = app();
        call(&app, "POST", "/api/sample", Body::empty()).await;

        let (status, bytes) = call(&app, "GET", "/api/export.csv", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let csv = String::from_utf8(bytes).unwrap();
        assert!(csv.starts_with("Account,Jan 2023,Feb 2023,Mar 2023,Total"));
        assert!(csv.trim_end().ends_with("Total,3000.00,4500.00,3700.00,11200.00"));
    }
}
