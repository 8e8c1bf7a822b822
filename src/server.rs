// =====================================================
// HTTP SURFACE
// axum routes over the command layer
// =====================================================

use crate::commands::{self, CreateTableRequest, ReadQueryRequest, StoreUrlRequest};
use crate::db::sql_utils::parse_list;
use crate::db_types::{AppState, StoreRole};
use crate::error::{ErrorKind, LoaderError};
use crate::load::LoadRequest;
use crate::transfer::TransferStartRequest;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Error body shared by every route: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub LoaderError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Cancellation => StatusCode::CONFLICT,
            ErrorKind::Configuration
            | ErrorKind::Validation
            | ErrorKind::MissingColumn
            | ErrorKind::UnderlyingStore => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<LoaderError> for ApiError {
    fn from(err: LoaderError) -> Self {
        ApiError(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError(LoaderError::Validation(format!(
            "Invalid upload: {}",
            err.body_text()
        )))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/save-db", post(save_db))
        .route("/connect-source-db", post(connect_source_db))
        .route("/disconnect-source-db", post(disconnect_source_db))
        .route("/source-db-status", get(source_db_status))
        .route("/target-db-status", get(target_db_status))
        .route(
            "/upload-data",
            post(upload_data).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/job-status/{job_id}", get(job_status))
        .route("/jobs/running", get(running_jobs))
        .route("/jobs/recent", get(recent_jobs))
        .route("/table-schema", get(table_schema))
        .route("/create-table", post(create_table))
        .route("/execute-query", post(execute_query))
        .route("/transfer/start", post(start_transfer))
        .route("/transfer/cancel/{job_id}", post(cancel_transfer))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResp { status: "ok" }))
}

// --- Stores ---
async fn save_db(
    State(state): State<AppState>,
    Json(req): Json<StoreUrlRequest>,
) -> ApiResult<commands::StoreConfigured> {
    Ok(Json(commands::configure_target(&state, req).await?))
}

async fn connect_source_db(
    State(state): State<AppState>,
    Json(req): Json<StoreUrlRequest>,
) -> ApiResult<commands::StoreConfigured> {
    Ok(Json(commands::connect_source(&state, req).await?))
}

async fn disconnect_source_db(State(state): State<AppState>) -> impl IntoResponse {
    Json(commands::disconnect_source(&state).await)
}

async fn source_db_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(commands::store_status(&state, StoreRole::Source).await)
}

async fn target_db_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(commands::store_status(&state, StoreRole::Target).await)
}

// --- Upload ---
fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

async fn upload_data(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<commands::JobAccepted> {
    let mut request = LoadRequest::default();
    let mut payload = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                request.filename = field.file_name().unwrap_or_default().to_string();
                payload = Some(field.bytes().await?.to_vec());
            }
            "table" => request.table = field.text().await?.trim().to_string(),
            "columns" => request.columns = parse_list(&field.text().await?),
            "primary_key" => request.primary_key = parse_list(&field.text().await?),
            "auto_primary_key" => request.auto_primary_key = is_truthy(&field.text().await?),
            other => log::debug!("Ignoring upload field '{}'", other),
        }
    }

    if request.table.is_empty() {
        return Err(LoaderError::validation("table is required").into());
    }
    let payload = payload.ok_or_else(|| LoaderError::validation("file is required"))?;

    Ok(Json(commands::submit_load(&state, request, payload).await?))
}

// --- Jobs ---
async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<crate::jobs::JobStatusView> {
    Ok(Json(commands::get_job(&state, &job_id).await?))
}

async fn running_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(commands::list_running(&state).await)
}

#[derive(Deserialize)]
struct RecentParams {
    hours: Option<u64>,
}

async fn recent_jobs(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> impl IntoResponse {
    Json(commands::list_recent(&state, params.hours).await)
}

async fn start_transfer(
    State(state): State<AppState>,
    Json(req): Json<TransferStartRequest>,
) -> ApiResult<commands::JobAccepted> {
    Ok(Json(commands::submit_transfer(&state, req).await?))
}

async fn cancel_transfer(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<commands::CancelResponse> {
    Ok(Json(commands::cancel_transfer(&state, &job_id).await?))
}

// --- Tables and queries ---
#[derive(Deserialize)]
struct TableSchemaParams {
    table: String,
    schema: Option<String>,
}

async fn table_schema(
    State(state): State<AppState>,
    Query(params): Query<TableSchemaParams>,
) -> ApiResult<crate::db_types::TableSchema> {
    Ok(Json(
        commands::inspect_table(&state, &params.table, params.schema.as_deref()).await?,
    ))
}

async fn create_table(
    State(state): State<AppState>,
    Json(req): Json<CreateTableRequest>,
) -> ApiResult<commands::StatusMessage> {
    Ok(Json(commands::create_table(&state, req).await?))
}

async fn execute_query(
    State(state): State<AppState>,
    Json(req): Json<ReadQueryRequest>,
) -> ApiResult<crate::db_types::ReadQueryResult> {
    Ok(Json(commands::run_read_query(&state, req).await?))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                log::warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests;
