// =====================================================
// COMMANDS
// Request-path operations behind the HTTP surface
// =====================================================

use crate::config::retention_from_hours;
use crate::db::metadata::{self, DEFAULT_QUERY_ROW_LIMIT};
use crate::db::sql_utils::{
    ensure_create_table_statement, ensure_read_only_query, validate_identifier, DEFAULT_SCHEMA,
};
use crate::db_types::{AppState, ReadQueryResult, StoreRole, StoreStatus, TableSchema};
use crate::error::{LoaderError, LoaderResult};
use crate::jobs::models::JobKind;
use crate::jobs::{CancelOutcome, JobStatus, JobStatusView, RunningJob};
use crate::load::{run_load_job, LoadRequest};
use crate::transfer::{run_transfer_job, TransferStartRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Request Payloads ---
#[derive(Deserialize, Debug, Clone)]
pub struct StoreUrlRequest {
    pub database_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateTableRequest {
    pub create_sql: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ReadQueryRequest {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// --- Responses ---
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreConfigured {
    pub status: String,
    pub database_url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct JobAccepted {
    pub status: String,
    pub job_id: String,
}

impl JobAccepted {
    fn new(job_id: String) -> Self {
        Self {
            status: "accepted".to_string(),
            job_id,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CancelResponse {
    pub status: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct JobList<T> {
    pub count: usize,
    pub jobs: Vec<T>,
}

impl<T> From<Vec<T>> for JobList<T> {
    fn from(jobs: Vec<T>) -> Self {
        Self {
            count: jobs.len(),
            jobs,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

async fn purge_expired(state: &AppState) {
    let removed = state.jobs.purge(state.settings.job_retention).await;
    if removed > 0 {
        log::debug!("Purged {} expired job(s)", removed);
    }
}

// =====================================================
// STORES
// =====================================================

async fn configure_and_verify(
    state: &AppState,
    role: StoreRole,
    url: &str,
) -> LoaderResult<StoreConfigured> {
    state.connections.configure(role, url).await?;
    if let Err(err) = state.connections.verify(role).await {
        state.connections.disconnect(role).await;
        return Err(match err {
            LoaderError::Store(_) | LoaderError::Timeout(_) => {
                LoaderError::Configuration(format!("Failed to connect: {}", err))
            }
            other => other,
        });
    }

    let status = state.connections.status(role).await;
    Ok(StoreConfigured {
        status: "ok".to_string(),
        database_url: status.database_url.unwrap_or_default(),
    })
}

pub async fn configure_target(
    state: &AppState,
    request: StoreUrlRequest,
) -> LoaderResult<StoreConfigured> {
    configure_and_verify(state, StoreRole::Target, &request.database_url).await
}

pub async fn connect_source(
    state: &AppState,
    request: StoreUrlRequest,
) -> LoaderResult<StoreConfigured> {
    configure_and_verify(state, StoreRole::Source, &request.database_url).await
}

pub async fn disconnect_source(state: &AppState) -> StatusMessage {
    state.connections.disconnect(StoreRole::Source).await;
    StatusMessage {
        status: "ok".to_string(),
        message: "Source database disconnected".to_string(),
    }
}

pub async fn store_status(state: &AppState, role: StoreRole) -> StoreStatus {
    state.connections.status(role).await
}

// =====================================================
// JOB SUBMISSION
// =====================================================

pub async fn submit_load(
    state: &AppState,
    request: LoadRequest,
    payload: Vec<u8>,
) -> LoaderResult<JobAccepted> {
    purge_expired(state).await;
    request.validate()?;

    let schema = {
        let mut lease = state.connections.shared(StoreRole::Target).await?;
        metadata::get_table_schema(lease.connection()?, DEFAULT_SCHEMA, &request.table).await?
    };
    let plan = request.resolve(&schema)?;

    let job_id = state
        .jobs
        .create(JobKind::Load, request.label(), Some(request.filename.clone()))
        .await?;
    log::info!(
        "Accepted load job {} for {} ({})",
        job_id,
        plan.table,
        request.filename
    );

    tokio::spawn(run_load_job(state.clone(), job_id.clone(), plan, payload));
    Ok(JobAccepted::new(job_id))
}

pub async fn submit_transfer(
    state: &AppState,
    request: TransferStartRequest,
) -> LoaderResult<JobAccepted> {
    purge_expired(state).await;
    let plan = request.validate()?;

    for role in [StoreRole::Source, StoreRole::Target] {
        if !state.connections.is_configured(role).await {
            return Err(LoaderError::Configuration(role.not_configured_message()));
        }
    }

    let job_id = state
        .jobs
        .create(JobKind::Transfer, request.label(), None)
        .await?;
    log::info!("Accepted transfer job {} into {}", job_id, plan.target_table);

    tokio::spawn(run_transfer_job(state.clone(), job_id.clone(), plan));
    Ok(JobAccepted::new(job_id))
}

// =====================================================
// JOB QUERIES
// =====================================================

pub async fn cancel_transfer(state: &AppState, job_id: &str) -> LoaderResult<CancelResponse> {
    purge_expired(state).await;
    let job_id = job_id.trim();
    match state.jobs.request_cancel(job_id).await {
        None => Err(LoaderError::NotFound("job not found".to_string())),
        Some(CancelOutcome::Accepted) => {
            log::info!("Cancellation requested for job {}", job_id);
            Ok(CancelResponse {
                status: "ok".to_string(),
                job_id: job_id.to_string(),
                job_status: None,
            })
        }
        Some(CancelOutcome::Ignored(status)) => Ok(CancelResponse {
            status: "ignored".to_string(),
            job_id: job_id.to_string(),
            job_status: Some(status),
        }),
    }
}

pub async fn get_job(state: &AppState, job_id: &str) -> LoaderResult<JobStatusView> {
    purge_expired(state).await;
    state
        .jobs
        .get(job_id.trim())
        .await
        .ok_or_else(|| LoaderError::NotFound("job not found".to_string()))
}

pub async fn list_running(state: &AppState) -> JobList<RunningJob> {
    purge_expired(state).await;
    state.jobs.list_running().await.into()
}

/// Purge with the given retention (or the configured one), then list what is left.
pub async fn list_recent(state: &AppState, hours: Option<u64>) -> JobList<JobStatusView> {
    let retention = hours
        .map(retention_from_hours)
        .unwrap_or(state.settings.job_retention);
    state.jobs.purge(retention).await;
    state.jobs.list_recent().await.into()
}

// =====================================================
// TABLES AND QUERIES
// =====================================================

pub async fn inspect_table(
    state: &AppState,
    table: &str,
    schema: Option<&str>,
) -> LoaderResult<TableSchema> {
    let table = table.trim();
    let schema = schema
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_SCHEMA);
    validate_identifier(table)?;
    validate_identifier(schema)?;

    let mut lease = state.connections.shared(StoreRole::Target).await?;
    let found = metadata::get_table_schema(lease.connection()?, schema, table).await?;
    if !found.exists() {
        return Err(LoaderError::NotFound("table not found".to_string()));
    }
    Ok(found)
}

pub async fn create_table(
    state: &AppState,
    request: CreateTableRequest,
) -> LoaderResult<StatusMessage> {
    let statement = ensure_create_table_statement(&request.create_sql)?;
    let mut lease = state.connections.shared(StoreRole::Target).await?;
    metadata::create_table(lease.connection()?, &statement).await?;
    Ok(StatusMessage {
        status: "created".to_string(),
        message: "Table created successfully".to_string(),
    })
}

pub async fn run_read_query(
    state: &AppState,
    request: ReadQueryRequest,
) -> LoaderResult<ReadQueryResult> {
    let query = ensure_read_only_query(&request.query)?;
    let limit = request.limit.unwrap_or(DEFAULT_QUERY_ROW_LIMIT);

    let mut lease = state.connections.shared(StoreRole::Source).await?;
    metadata::execute_read_query(lease.connection()?, &query, &request.params, limit)
        .await
        .map_err(|err| match err {
            LoaderError::Store(_) => {
                LoaderError::Validation(format!("Query execution failed: {}", err))
            }
            other => other,
        })
}
