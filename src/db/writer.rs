// =====================================================
// DEDUP WRITER MODULE
// INSERT statements shared by file loads and chunked transfers
// =====================================================

use super::sql_utils::{qualified_table_name, quote_column_list, quote_identifier_postgres};
use crate::error::LoaderResult;
use serde_json::{Map, Value};
use sqlx::postgres::PgConnection;

pub type JsonRow = Map<String, Value>;

/// Destination of a deduplicating insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertTarget {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
    /// Conflict key; empty means every row is inserted.
    pub conflict_key: Vec<String>,
    /// Set when a loaded column is `GENERATED ALWAYS AS IDENTITY`.
    pub override_identity: bool,
    /// json/jsonb columns whose incoming value is JSON text to be parsed
    /// by the store rather than stored as a JSON string.
    pub text_json_columns: Vec<String>,
}

impl InsertTarget {
    pub fn qualified_table(&self) -> String {
        qualified_table_name(&self.schema, &self.table)
    }

    fn insert_head(&self) -> String {
        let mut head = format!(
            "INSERT INTO {} ({})",
            self.qualified_table(),
            quote_column_list(&self.columns)
        );
        if self.override_identity {
            head.push_str(" OVERRIDING SYSTEM VALUE");
        }
        head
    }

    fn conflict_tail(&self) -> String {
        if self.conflict_key.is_empty() {
            String::new()
        } else {
            format!(
                " ON CONFLICT ({}) DO NOTHING",
                quote_column_list(&self.conflict_key)
            )
        }
    }
}

/// Insert built from a JSON array bound as `$1`, one object per row keyed by
/// column name. Rows go in array order, so with a conflict key the first
/// occurrence of a duplicate wins.
pub fn build_json_insert_statement(target: &InsertTarget) -> String {
    let projected = target
        .columns
        .iter()
        .map(|column| {
            if target.text_json_columns.contains(column) {
                format!("(e.doc->>{})::jsonb", quote_literal(column))
            } else {
                format!("r.{}", quote_identifier_postgres(column))
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{} SELECT {} FROM jsonb_array_elements($1::jsonb) WITH ORDINALITY AS e(doc, seq) \
         CROSS JOIN LATERAL jsonb_populate_record(NULL::{}, e.doc) AS r \
         ORDER BY e.seq{}",
        target.insert_head(),
        projected,
        target.qualified_table(),
        target.conflict_tail()
    )
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Insert moving staged rows into the target in staging order.
pub fn build_staging_insert_statement(
    target: &InsertTarget,
    staging_table: &str,
    order_column: &str,
) -> String {
    format!(
        "{} SELECT {} FROM {} ORDER BY {}{}",
        target.insert_head(),
        quote_column_list(&target.columns),
        quote_identifier_postgres(staging_table),
        quote_identifier_postgres(order_column),
        target.conflict_tail()
    )
}

/// Insert `rows` and return how many the store accepted.
pub async fn insert_json_rows(
    conn: &mut PgConnection,
    target: &InsertTarget,
    rows: &[JsonRow],
) -> LoaderResult<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let statement = build_json_insert_statement(target);
    let result = sqlx::query(&statement)
        .bind(sqlx::types::Json(rows))
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
