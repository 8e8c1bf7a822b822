use super::engine::{ChunkSink, ChunkSource};
use super::models::TransferPlan;
use super::mapper::text_json_targets;
use crate::db::metadata::{
    describe_columns, get_identity_always_columns, get_json_columns, needs_identity_override,
    ResultColumn,
};
use crate::db::writer::insert_json_rows;
use crate::db::{InsertTarget, JsonRow};
use crate::error::{LoaderError, LoaderResult};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::postgres::{PgConnection, Postgres};
use sqlx::{Connection, Transaction};

/// Source query rows streamed as `to_jsonb` documents on a dedicated,
/// read-only session.
pub struct PgChunkSource<'c> {
    columns: Vec<String>,
    described: Vec<ResultColumn>,
    rows: BoxStream<'c, Result<Value, sqlx::Error>>,
}

impl<'c> PgChunkSource<'c> {
    /// `wrapped` must be `query` wrapped by `wrap_as_jsonb_rows`.
    pub async fn open(
        conn: &'c mut PgConnection,
        query: &str,
        wrapped: &'c str,
    ) -> LoaderResult<Self> {
        sqlx::query("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY")
            .execute(&mut *conn)
            .await?;

        let described = describe_columns(&mut *conn, query).await?;
        let columns = described.iter().map(|column| column.name.clone()).collect();

        let rows = sqlx::query_scalar::<Postgres, Value>(wrapped).fetch(conn);
        Ok(Self {
            columns,
            described,
            rows,
        })
    }

    /// Result columns with their store types.
    pub fn described_columns(&self) -> &[ResultColumn] {
        &self.described
    }
}

#[async_trait::async_trait]
impl<'c> ChunkSource for PgChunkSource<'c> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_chunk(&mut self, max_rows: usize) -> LoaderResult<Vec<JsonRow>> {
        let mut chunk = Vec::with_capacity(max_rows.min(4096));
        while chunk.len() < max_rows {
            match self.rows.try_next().await? {
                Some(Value::Object(row)) => chunk.push(row),
                Some(other) => {
                    return Err(LoaderError::Validation(format!(
                        "Unexpected source row shape: {}",
                        other
                    )))
                }
                None => break,
            }
        }
        Ok(chunk)
    }
}

/// Target transaction receiving deduplicated chunk inserts.
pub struct PgChunkSink<'c> {
    tx: Option<Transaction<'c, Postgres>>,
    target: InsertTarget,
}

impl<'c> PgChunkSink<'c> {
    pub async fn begin(
        conn: &'c mut PgConnection,
        plan: &TransferPlan,
        source_columns: &[ResultColumn],
    ) -> LoaderResult<Self> {
        let mut tx = conn.begin().await?;
        let identity_always =
            get_identity_always_columns(&mut *tx, &plan.schema, &plan.target_table).await?;
        let json_columns = get_json_columns(&mut *tx, &plan.schema, &plan.target_table).await?;

        let mut target =
            plan.insert_target(needs_identity_override(&plan.target_columns, &identity_always));
        target.text_json_columns = text_json_targets(&plan.mapping, source_columns, &json_columns);
        Ok(Self {
            tx: Some(tx),
            target,
        })
    }

    fn transaction(&mut self) -> LoaderResult<&mut Transaction<'c, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| LoaderError::validation("Target transaction already finished"))
    }
}

#[async_trait::async_trait]
impl<'c> ChunkSink for PgChunkSink<'c> {
    async fn write_chunk(&mut self, rows: &[JsonRow]) -> LoaderResult<u64> {
        let target = self.target.clone();
        let tx = self.transaction()?;
        insert_json_rows(&mut **tx, &target, rows).await
    }

    async fn commit(&mut self) -> LoaderResult<()> {
        match self.tx.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> LoaderResult<()> {
        match self.tx.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Ok(()),
        }
    }
}
