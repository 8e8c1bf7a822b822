// =====================================================
// TRANSFER ENGINE
// Chunked source -> target copy inside one target transaction,
// cancellable between chunks
// =====================================================

use super::mapper::{missing_source_columns, project_row};
use super::models::TransferPlan;
use super::postgres::{PgChunkSink, PgChunkSource};
use crate::db::connections::close_quietly;
use crate::db::metadata::wrap_as_jsonb_rows;
use crate::db::JsonRow;
use crate::db_types::{AppState, StoreRole};
use crate::error::{LoaderError, LoaderResult};
use crate::jobs::models::{JobOutcome, TransferProgress};
use crate::jobs::registry::JobRegistry;
use std::sync::Arc;

/// Live result stream of the source query.
#[async_trait::async_trait]
pub trait ChunkSource: Send {
    /// Column names of the result, known before any row is read.
    fn columns(&self) -> &[String];

    /// Up to `max_rows` rows keyed by source column; empty once exhausted.
    async fn next_chunk(&mut self, max_rows: usize) -> LoaderResult<Vec<JsonRow>>;
}

/// Transactional writer on the target side.
#[async_trait::async_trait]
pub trait ChunkSink: Send {
    /// Insert rows keyed by target column, returning how many were accepted.
    async fn write_chunk(&mut self, rows: &[JsonRow]) -> LoaderResult<u64>;
    async fn commit(&mut self) -> LoaderResult<()>;
    async fn rollback(&mut self) -> LoaderResult<()>;
}

/// Cancellation and progress hooks for a running transfer.
#[async_trait::async_trait]
pub trait TransferControl: Send + Sync {
    async fn is_cancel_requested(&self) -> bool;
    async fn report_progress(&self, progress: TransferProgress);
}

pub struct JobControl {
    jobs: Arc<JobRegistry>,
    job_id: String,
}

impl JobControl {
    pub fn new(jobs: Arc<JobRegistry>, job_id: impl Into<String>) -> Self {
        Self {
            jobs,
            job_id: job_id.into(),
        }
    }
}

#[async_trait::async_trait]
impl TransferControl for JobControl {
    async fn is_cancel_requested(&self) -> bool {
        self.jobs.is_cancel_requested(&self.job_id).await
    }

    async fn report_progress(&self, progress: TransferProgress) {
        self.jobs
            .record_transfer_progress(&self.job_id, progress.rows_processed, progress.rows_inserted)
            .await;
    }
}

/// Stream every chunk into the sink, then commit. Any error, including a
/// cancellation observed at a chunk boundary, rolls the whole run back.
pub async fn drive_transfer<S, K, C>(
    source: &mut S,
    sink: &mut K,
    plan: &TransferPlan,
    control: &C,
) -> LoaderResult<TransferProgress>
where
    S: ChunkSource + ?Sized,
    K: ChunkSink + ?Sized,
    C: TransferControl + ?Sized,
{
    let streamed = stream_chunks(source, sink, plan, control).await;
    match streamed {
        Ok(progress) => {
            sink.commit().await?;
            Ok(progress)
        }
        Err(err) => {
            if let Err(rollback_err) = sink.rollback().await {
                log::warn!("Failed to roll back target transaction: {}", rollback_err);
            }
            Err(err)
        }
    }
}

async fn stream_chunks<S, K, C>(
    source: &mut S,
    sink: &mut K,
    plan: &TransferPlan,
    control: &C,
) -> LoaderResult<TransferProgress>
where
    S: ChunkSource + ?Sized,
    K: ChunkSink + ?Sized,
    C: TransferControl + ?Sized,
{
    let missing = missing_source_columns(&plan.mapping, source.columns());
    if !missing.is_empty() {
        return Err(LoaderError::MissingSourceColumns(missing));
    }

    let mut progress = TransferProgress::default();
    loop {
        if control.is_cancel_requested().await {
            return Err(LoaderError::Canceled);
        }

        let chunk = source.next_chunk(plan.chunk_size).await?;
        if chunk.is_empty() {
            return Ok(progress);
        }

        let rows = chunk
            .iter()
            .map(|row| project_row(&plan.mapping, row))
            .collect::<Vec<_>>();
        let inserted = sink.write_chunk(&rows).await?;
        progress.add_chunk(rows.len() as u64, inserted);
        control.report_progress(progress).await;
    }
}

/// Background entry point: run the transfer and settle the job record.
pub async fn run_transfer_job(state: AppState, job_id: String, plan: TransferPlan) {
    log::info!(
        "Transfer job {} started into {} (chunk size {})",
        job_id,
        plan.target_table,
        plan.chunk_size
    );

    let control = JobControl::new(Arc::clone(&state.jobs), job_id.clone());
    let result = execute_transfer(&state, &plan, &control).await;
    match &result {
        Ok(progress) => log::info!(
            "Transfer job {} completed: processed={} inserted={}",
            job_id,
            progress.rows_processed,
            progress.rows_inserted
        ),
        Err(LoaderError::Canceled) => log::info!("Transfer job {} canceled", job_id),
        Err(err) => log::warn!("Transfer job {} failed: {}", job_id, err),
    }

    state
        .jobs
        .settle(&job_id, result.map(JobOutcome::Transferred))
        .await;
}

async fn execute_transfer(
    state: &AppState,
    plan: &TransferPlan,
    control: &JobControl,
) -> LoaderResult<TransferProgress> {
    let mut source_conn = state.connections.open_dedicated(StoreRole::Source).await?;
    let mut target_conn = match state.connections.open_dedicated(StoreRole::Target).await {
        Ok(conn) => conn,
        Err(err) => {
            close_quietly(StoreRole::Source, source_conn).await;
            return Err(err);
        }
    };

    let wrapped = wrap_as_jsonb_rows(&plan.query);
    let result = async {
        let mut source = PgChunkSource::open(&mut source_conn, &plan.query, &wrapped).await?;
        let mut sink =
            PgChunkSink::begin(&mut target_conn, plan, source.described_columns()).await?;
        drive_transfer(&mut source, &mut sink, plan, control).await
    }
    .await;

    close_quietly(StoreRole::Source, source_conn).await;
    close_quietly(StoreRole::Target, target_conn).await;
    result
}
