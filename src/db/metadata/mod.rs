// =====================================================
// SCHEMA INSPECTOR MODULE
// Table introspection, CREATE TABLE passthrough, and read-only queries
// =====================================================

use super::helpers::bytea_hex_to_base64;
use crate::db_types::{ReadQueryResult, TableSchema};
use crate::error::{LoaderError, LoaderResult};
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgConnection, Postgres};
use sqlx::query::QueryScalar;
use sqlx::{Column, Connection, Executor, Statement, TypeInfo};

pub const DEFAULT_QUERY_ROW_LIMIT: usize = 1000;

/// Name and store type of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    pub name: String,
    pub type_name: String,
}

impl ResultColumn {
    pub fn is_bytea(&self) -> bool {
        self.type_name.eq_ignore_ascii_case("BYTEA")
    }

    /// Character types whose `to_jsonb` rendering is a JSON string.
    pub fn is_text_like(&self) -> bool {
        ["TEXT", "VARCHAR", "BPCHAR", "NAME", "CHAR", "UNKNOWN"]
            .iter()
            .any(|name| self.type_name.eq_ignore_ascii_case(name))
    }
}

// =====================================================
// TABLE INTROSPECTION
// =====================================================

/// Columns in ordinal order and the declared primary key in key order.
/// A missing table yields an empty attribute list.
pub async fn get_table_schema(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> LoaderResult<TableSchema> {
    let attributes = sqlx::query_scalar::<_, String>(
        r#"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_schema = $1
            AND table_name = $2
        ORDER BY ordinal_position
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    let primary_key = sqlx::query_scalar::<_, String>(
        r#"
        SELECT kcu.column_name::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
        WHERE tc.table_schema = $1
            AND tc.table_name = $2
            AND tc.constraint_type = 'PRIMARY KEY'
        ORDER BY kcu.ordinal_position
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    Ok(TableSchema {
        table: table.to_string(),
        attributes,
        primary_key,
    })
}

/// Columns whose values the store generates unless the insert overrides it.
pub async fn get_identity_always_columns(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> LoaderResult<Vec<String>> {
    let columns = sqlx::query_scalar::<_, String>(
        r#"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_schema = $1
            AND table_name = $2
            AND is_identity = 'YES'
            AND identity_generation = 'ALWAYS'
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(conn)
    .await?;
    Ok(columns)
}

/// Columns declared as `json` or `jsonb`.
pub async fn get_json_columns(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> LoaderResult<Vec<String>> {
    let columns = sqlx::query_scalar::<_, String>(
        r#"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_schema = $1
            AND table_name = $2
            AND data_type IN ('json', 'jsonb')
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(conn)
    .await?;
    Ok(columns)
}

pub fn needs_identity_override(loaded_columns: &[String], identity_always: &[String]) -> bool {
    loaded_columns
        .iter()
        .any(|column| identity_always.contains(column))
}

/// Run an already-guarded CREATE TABLE statement as one prepared statement.
pub async fn create_table(conn: &mut PgConnection, statement: &str) -> LoaderResult<()> {
    sqlx::query(statement)
        .persistent(false)
        .execute(conn)
        .await?;
    Ok(())
}

// =====================================================
// READ-ONLY QUERIES
// =====================================================

pub(crate) fn bind_json_param<'q>(
    query: QueryScalar<'q, Postgres, Value, PgArguments>,
    param: &Value,
) -> LoaderResult<QueryScalar<'q, Postgres, Value, PgArguments>> {
    Ok(match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(flag) => query.bind(*flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                query.bind(int)
            } else if let Some(float) = number.as_f64() {
                query.bind(float)
            } else {
                return Err(LoaderError::Validation(format!(
                    "Unsupported numeric parameter: {}",
                    number
                )));
            }
        }
        Value::String(text) => query.bind(text.clone()),
        other => query.bind(sqlx::types::Json(other.clone())),
    })
}

/// Project a `to_jsonb` row onto the described columns, in result order.
pub fn shape_row(columns: &[ResultColumn], document: &Value) -> Map<String, Value> {
    let mut row = Map::new();
    for column in columns {
        let value = document.get(&column.name).cloned().unwrap_or(Value::Null);
        let value = match value {
            Value::String(text) if column.is_bytea() => {
                bytea_hex_to_base64(&text).map(Value::String).unwrap_or(Value::String(text))
            }
            other => other,
        };
        row.insert(column.name.clone(), value);
    }
    row
}

pub fn wrap_as_jsonb_rows(query: &str) -> String {
    format!("SELECT to_jsonb(src_row) FROM ({}) AS src_row", query)
}

/// Execute a guarded SELECT inside a READ ONLY transaction. Every row is
/// counted but only the first `limit` are returned.
pub async fn execute_read_query(
    conn: &mut PgConnection,
    query: &str,
    params: &[Value],
    limit: usize,
) -> LoaderResult<ReadQueryResult> {
    let mut tx = conn.begin().await?;
    sqlx::query("SET TRANSACTION READ ONLY")
        .execute(&mut *tx)
        .await?;

    let columns = describe_columns(&mut *tx, query).await?;
    let wrapped = wrap_as_jsonb_rows(query);

    let mut scalar = sqlx::query_scalar::<_, Value>(&wrapped);
    for param in params {
        scalar = bind_json_param(scalar, param)?;
    }

    let mut rows = Vec::new();
    let mut total_count = 0_u64;
    {
        let mut stream = scalar.fetch(&mut *tx);
        while let Some(document) = stream.try_next().await? {
            total_count += 1;
            if rows.len() < limit {
                rows.push(shape_row(&columns, &document));
            }
        }
    }

    tx.rollback().await?;

    Ok(ReadQueryResult {
        status: "success".to_string(),
        columns: columns.into_iter().map(|column| column.name).collect(),
        returned_count: rows.len(),
        rows,
        total_count,
    })
}

pub async fn describe_columns(
    conn: &mut PgConnection,
    query: &str,
) -> LoaderResult<Vec<ResultColumn>> {
    let statement = (&mut *conn).prepare(query).await?;
    Ok(statement
        .columns()
        .iter()
        .map(|column| ResultColumn {
            name: column.name().to_string(),
            type_name: column.type_info().name().to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests;
