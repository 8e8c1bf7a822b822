// =====================================================
// LOAD ENGINE
// Staging-table COPY for CSV, batched inserts for JSON,
// both deduplicated on the primary key
// =====================================================

use super::models::{FileKind, LoadPlan};
use super::parser::{effective_columns, missing_key_columns, parse_json_rows, read_csv_header};
use crate::db::connections::close_quietly;
use crate::db::helpers::i64_to_u64;
use crate::db::metadata::{get_identity_always_columns, needs_identity_override};
use crate::db::sql_utils::{qualified_table_name, quote_column_list, quote_identifier_postgres};
use crate::db::writer::{build_staging_insert_statement, insert_json_rows};
use crate::db::JsonRow;
use crate::db_types::{AppState, StoreRole};
use crate::error::{LoaderError, LoaderResult};
use crate::jobs::models::{JobOutcome, LoadCounts};
use sqlx::postgres::PgConnection;
use sqlx::Connection;

pub const LOAD_SEQUENCE_COLUMN: &str = "pgferry_load_seq";
const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Parsed payload ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedLoad {
    Csv {
        header: Vec<String>,
        columns: Vec<String>,
    },
    Json {
        rows: Vec<JsonRow>,
    },
}

pub fn staging_table_name(table: &str) -> String {
    format!("{}_staging", table)
}

pub fn build_create_staging_statement(plan: &LoadPlan, staging_table: &str) -> String {
    format!(
        "CREATE TEMP TABLE {} (LIKE {} INCLUDING ALL EXCLUDING INDEXES) ON COMMIT DROP",
        quote_identifier_postgres(staging_table),
        qualified_table_name(&plan.schema, &plan.table)
    )
}

pub fn build_copy_statement(staging_table: &str, header: &[String]) -> String {
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, HEADER true)",
        quote_identifier_postgres(staging_table),
        quote_column_list(header)
    )
}

/// Parse the payload without touching the store.
pub fn prepare_load(plan: &LoadPlan, payload: &[u8]) -> LoaderResult<PreparedLoad> {
    match plan.file_kind {
        FileKind::Csv => {
            let header = read_csv_header(payload)?;
            let columns = effective_columns(&header, &plan.columns);
            if columns.is_empty() {
                return Err(LoaderError::validation(
                    "CSV header contains none of the requested columns",
                ));
            }
            if plan.explicit_primary_key {
                let missing = missing_key_columns(&columns, &plan.primary_key);
                if !missing.is_empty() {
                    return Err(LoaderError::MissingPrimaryKeyColumns(missing));
                }
            }
            Ok(PreparedLoad::Csv { header, columns })
        }
        FileKind::Json => Ok(PreparedLoad::Json {
            rows: parse_json_rows(payload, &plan.columns)?,
        }),
    }
}

/// Background entry point: run the load and settle the job record.
pub async fn run_load_job(state: AppState, job_id: String, plan: LoadPlan, payload: Vec<u8>) {
    log::info!(
        "Load job {} started: {} bytes into {}",
        job_id,
        payload.len(),
        plan.table
    );

    let result = execute_load(&state, &plan, &payload).await;
    match &result {
        Ok(counts) => log::info!(
            "Load job {} completed: total={} inserted={} skipped={}",
            job_id,
            counts.rows_total,
            counts.rows_inserted,
            counts.rows_skipped
        ),
        Err(err) => log::warn!("Load job {} failed: {}", job_id, err),
    }

    state
        .jobs
        .settle(&job_id, result.map(JobOutcome::Loaded))
        .await;
}

async fn execute_load(state: &AppState, plan: &LoadPlan, payload: &[u8]) -> LoaderResult<LoadCounts> {
    let prepared = prepare_load(plan, payload)?;
    let mut conn = state.connections.open_dedicated(StoreRole::Target).await?;
    let result = load_prepared(
        &mut conn,
        plan,
        prepared,
        payload,
        state.settings.json_batch_size,
    )
    .await;
    close_quietly(StoreRole::Target, conn).await;
    result
}

/// Write a prepared payload in one transaction. Nothing is committed on error.
pub async fn load_prepared(
    conn: &mut PgConnection,
    plan: &LoadPlan,
    prepared: PreparedLoad,
    payload: &[u8],
    json_batch_size: usize,
) -> LoaderResult<LoadCounts> {
    match prepared {
        PreparedLoad::Csv { header, columns } => {
            load_csv(conn, plan, &header, columns, payload).await
        }
        PreparedLoad::Json { rows } => load_json(conn, plan, rows, json_batch_size).await,
    }
}

async fn load_csv(
    conn: &mut PgConnection,
    plan: &LoadPlan,
    header: &[String],
    columns: Vec<String>,
    payload: &[u8],
) -> LoaderResult<LoadCounts> {
    let mut tx = conn.begin().await?;

    let identity_always = get_identity_always_columns(&mut *tx, &plan.schema, &plan.table).await?;
    let override_identity = needs_identity_override(&columns, &identity_always);
    let target = plan.insert_target(columns, override_identity);

    let staging = staging_table_name(&plan.table);
    sqlx::query(&build_create_staging_statement(plan, &staging))
        .execute(&mut *tx)
        .await?;
    // Staging keeps duplicate keys; this column records file order.
    sqlx::query(&format!(
        "ALTER TABLE {} ADD COLUMN {} bigserial",
        quote_identifier_postgres(&staging),
        quote_identifier_postgres(LOAD_SEQUENCE_COLUMN)
    ))
    .execute(&mut *tx)
    .await?;

    copy_payload(&mut *tx, &build_copy_statement(&staging, header), payload).await?;

    let staged: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {}",
        quote_identifier_postgres(&staging)
    ))
    .fetch_one(&mut *tx)
    .await?;

    let inserted = sqlx::query(&build_staging_insert_statement(
        &target,
        &staging,
        LOAD_SEQUENCE_COLUMN,
    ))
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok(LoadCounts::new(i64_to_u64(staged), inserted))
}

async fn copy_payload(
    conn: &mut PgConnection,
    statement: &str,
    payload: &[u8],
) -> LoaderResult<u64> {
    let mut copy = conn.copy_in_raw(statement).await?;
    for chunk in payload.chunks(COPY_CHUNK_BYTES) {
        let sent = copy.send(chunk).await.map(|_| ());
        if let Err(err) = sent {
            if let Err(abort_err) = copy.abort(err.to_string()).await {
                log::warn!("Failed to abort COPY: {}", abort_err);
            }
            return Err(err.into());
        }
    }
    Ok(copy.finish().await?)
}

async fn load_json(
    conn: &mut PgConnection,
    plan: &LoadPlan,
    rows: Vec<JsonRow>,
    json_batch_size: usize,
) -> LoaderResult<LoadCounts> {
    let mut tx = conn.begin().await?;

    let identity_always = get_identity_always_columns(&mut *tx, &plan.schema, &plan.table).await?;
    let override_identity = needs_identity_override(&plan.columns, &identity_always);
    let target = plan.insert_target(plan.columns.clone(), override_identity);

    let mut inserted = 0_u64;
    for batch in rows.chunks(json_batch_size.max(1)) {
        inserted += insert_json_rows(&mut *tx, &target, batch).await?;
    }

    tx.commit().await?;
    Ok(LoadCounts::new(rows.len() as u64, inserted))
}

#[cfg(test)]
mod tests;
