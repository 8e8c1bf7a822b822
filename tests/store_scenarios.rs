//! Scenarios against a live PostgreSQL database. Each test is a no-op unless
//! `PGFERRY_TEST_DATABASE_URL` points at a scratch database; the same database
//! serves as both source and target.

use pgferry_lib::commands::{self, CreateTableRequest, ReadQueryRequest, StoreUrlRequest};
use pgferry_lib::db_types::{AppState, StoreRole};
use pgferry_lib::jobs::{JobStatus, JobStatusView};
use pgferry_lib::load::LoadRequest;
use pgferry_lib::transfer::TransferStartRequest;
use serde_json::json;
use sqlx::{Connection, PgConnection};
use std::time::Duration;

const TEST_DATABASE_ENV: &str = "PGFERRY_TEST_DATABASE_URL";

fn test_database_url() -> Option<String> {
    std::env::var(TEST_DATABASE_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
}

fn unique_table(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..10])
}

async fn connected_state(url: &str) -> AppState {
    let state = AppState::default();
    commands::configure_target(
        &state,
        StoreUrlRequest {
            database_url: url.to_string(),
        },
    )
    .await
    .unwrap();
    commands::connect_source(
        &state,
        StoreUrlRequest {
            database_url: url.to_string(),
        },
    )
    .await
    .unwrap();
    state
}

async fn create_people_table(state: &AppState, table: &str) {
    commands::create_table(
        state,
        CreateTableRequest {
            create_sql: format!("CREATE TABLE {} (id integer PRIMARY KEY, name text)", table),
        },
    )
    .await
    .unwrap();
}

async fn drop_tables(url: &str, tables: &[&str]) {
    let mut conn = PgConnection::connect(url).await.unwrap();
    for table in tables {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut conn)
            .await
            .unwrap();
    }
    conn.close().await.unwrap();
}

async fn wait_for_terminal(state: &AppState, job_id: &str) -> JobStatusView {
    for _ in 0..200 {
        let view = commands::get_job(state, job_id).await.unwrap();
        if view.status != JobStatus::Processing {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {} did not finish in time", job_id);
}

async fn count_rows(state: &AppState, table: &str) -> u64 {
    let result = commands::run_read_query(
        state,
        ReadQueryRequest {
            query: format!("SELECT id FROM {}", table),
            params: Vec::new(),
            limit: Some(0),
        },
    )
    .await
    .unwrap();
    result.total_count
}

async fn upload_people(
    state: &AppState,
    table: &str,
    filename: &str,
    payload: Vec<u8>,
) -> JobStatusView {
    let request = LoadRequest {
        table: table.to_string(),
        columns: vec!["id".to_string(), "name".to_string()],
        primary_key: vec!["id".to_string()],
        auto_primary_key: false,
        filename: filename.to_string(),
    };
    let accepted = commands::submit_load(state, request, payload).await.unwrap();
    assert_eq!(accepted.status, "accepted");
    wait_for_terminal(state, &accepted.job_id).await
}

async fn upload_people_csv(state: &AppState, table: &str) -> JobStatusView {
    let payload = b"id,name\n1,Alice\n2,Bob\n3,Carol\n".to_vec();
    upload_people(state, table, "people.csv", payload).await
}

async fn name_of(state: &AppState, table: &str, id: i64) -> serde_json::Value {
    let result = commands::run_read_query(
        state,
        ReadQueryRequest {
            query: format!("SELECT name FROM {} WHERE id = $1", table),
            params: vec![json!(id)],
            limit: None,
        },
    )
    .await
    .unwrap();
    result.rows[0]["name"].clone()
}

#[tokio::test]
async fn test_csv_load_is_idempotent_on_primary_key() {
    let Some(url) = test_database_url() else {
        return;
    };
    let state = connected_state(&url).await;
    let table = unique_table("people");
    create_people_table(&state, &table).await;

    let first = upload_people_csv(&state, &table).await;
    assert_eq!(first.status, JobStatus::Completed, "{:?}", first.error);
    assert_eq!(first.rows_total, Some(3));
    assert_eq!(first.rows_inserted, Some(3));
    assert_eq!(first.rows_skipped, Some(0));

    let second = upload_people_csv(&state, &table).await;
    assert_eq!(second.status, JobStatus::Completed, "{:?}", second.error);
    assert_eq!(second.rows_total, Some(3));
    assert_eq!(second.rows_inserted, Some(0));
    assert_eq!(second.rows_skipped, Some(3));

    assert_eq!(count_rows(&state, &table).await, 3);
    drop_tables(&url, &[&table]).await;
}

#[tokio::test]
async fn test_json_load_keeps_first_duplicate() {
    let Some(url) = test_database_url() else {
        return;
    };
    let state = connected_state(&url).await;
    let table = unique_table("people");
    create_people_table(&state, &table).await;

    let request = LoadRequest {
        table: table.clone(),
        columns: vec!["id".to_string(), "name".to_string()],
        primary_key: Vec::new(),
        auto_primary_key: true,
        filename: "people.json".to_string(),
    };
    let payload = serde_json::to_vec(&json!([
        {"id": 1, "name": "first"},
        {"id": 1, "name": "second"},
        {"id": 2, "name": null}
    ]))
    .unwrap();
    let accepted = commands::submit_load(&state, request, payload).await.unwrap();
    let view = wait_for_terminal(&state, &accepted.job_id).await;
    assert_eq!(view.status, JobStatus::Completed, "{:?}", view.error);
    assert_eq!(view.rows_total, Some(3));
    assert_eq!(view.rows_inserted, Some(2));

    assert_eq!(name_of(&state, &table, 1).await, json!("first"));
    drop_tables(&url, &[&table]).await;
}

#[tokio::test]
async fn test_csv_load_keeps_first_duplicate() {
    let Some(url) = test_database_url() else {
        return;
    };
    let state = connected_state(&url).await;
    let table = unique_table("people");
    create_people_table(&state, &table).await;

    let payload = b"id,name\n1,first\n1,second\n2,b\n".to_vec();
    let view = upload_people(&state, &table, "people.csv", payload).await;
    assert_eq!(view.status, JobStatus::Completed, "{:?}", view.error);
    assert_eq!(view.rows_total, Some(3));
    assert_eq!(view.rows_inserted, Some(2));
    assert_eq!(view.rows_skipped, Some(1));

    assert_eq!(name_of(&state, &table, 1).await, json!("first"));
    assert_eq!(count_rows(&state, &table).await, 2);
    drop_tables(&url, &[&table]).await;
}

#[tokio::test]
async fn test_loads_supply_explicit_always_identity_keys() {
    let Some(url) = test_database_url() else {
        return;
    };
    let state = connected_state(&url).await;
    let table = unique_table("ident");
    commands::create_table(
        &state,
        CreateTableRequest {
            create_sql: format!(
                "CREATE TABLE {} (id integer GENERATED ALWAYS AS IDENTITY PRIMARY KEY, name text)",
                table
            ),
        },
    )
    .await
    .unwrap();

    let csv = upload_people(&state, &table, "people.csv", b"id,name\n1,a\n2,b\n".to_vec()).await;
    assert_eq!(csv.status, JobStatus::Completed, "{:?}", csv.error);
    assert_eq!(csv.rows_inserted, Some(2));

    let payload = serde_json::to_vec(&json!([
        {"id": 1, "name": "again"},
        {"id": 3, "name": "c"}
    ]))
    .unwrap();
    let json_load = upload_people(&state, &table, "people.json", payload).await;
    assert_eq!(json_load.status, JobStatus::Completed, "{:?}", json_load.error);
    assert_eq!(json_load.rows_total, Some(2));
    assert_eq!(json_load.rows_inserted, Some(1));
    assert_eq!(json_load.rows_skipped, Some(1));

    assert_eq!(name_of(&state, &table, 1).await, json!("a"));
    assert_eq!(name_of(&state, &table, 3).await, json!("c"));
    drop_tables(&url, &[&table]).await;
}

#[tokio::test]
async fn test_chunked_transfer_copies_every_row() {
    let Some(url) = test_database_url() else {
        return;
    };
    let state = connected_state(&url).await;
    let source = unique_table("src");
    let target = unique_table("dst");
    create_people_table(&state, &source).await;
    create_people_table(&state, &target).await;

    let mut conn = PgConnection::connect(&url).await.unwrap();
    sqlx::query(&format!(
        "INSERT INTO {} (id, name) SELECT g, 'person ' || g FROM generate_series(1, 5) g",
        source
    ))
    .execute(&mut conn)
    .await
    .unwrap();
    conn.close().await.unwrap();

    let request: TransferStartRequest = serde_json::from_value(json!({
        "query": format!("SELECT id, name FROM {}", source),
        "target_table": target,
        "target_columns": ["id", "name"],
        "primary_key": ["id"],
        "chunk_size": 2
    }))
    .unwrap();
    let accepted = commands::submit_transfer(&state, request).await.unwrap();
    let view = wait_for_terminal(&state, &accepted.job_id).await;

    assert_eq!(view.status, JobStatus::Completed, "{:?}", view.error);
    assert_eq!(view.rows_processed, Some(5));
    assert_eq!(view.rows_inserted, Some(5));
    assert_eq!(count_rows(&state, &target).await, 5);
    drop_tables(&url, &[&source, &target]).await;
}

#[tokio::test]
async fn test_transfer_with_missing_source_column_inserts_nothing() {
    let Some(url) = test_database_url() else {
        return;
    };
    let state = connected_state(&url).await;
    let target = unique_table("dst");
    create_people_table(&state, &target).await;

    let request: TransferStartRequest = serde_json::from_value(json!({
        "query": "SELECT 1 AS id, 'x' AS name",
        "target_table": target,
        "target_columns": ["id", "name"],
        "source_to_target_mapping": {"name": "full_name"}
    }))
    .unwrap();
    let accepted = commands::submit_transfer(&state, request).await.unwrap();
    let view = wait_for_terminal(&state, &accepted.job_id).await;

    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(
        view.error.as_deref(),
        Some("Source query is missing required column(s): name->full_name")
    );
    assert_eq!(count_rows(&state, &target).await, 0);
    drop_tables(&url, &[&target]).await;
}

#[tokio::test]
async fn test_transfer_parses_text_into_jsonb_target() {
    let Some(url) = test_database_url() else {
        return;
    };
    let state = connected_state(&url).await;
    let target = unique_table("docs");
    commands::create_table(
        &state,
        CreateTableRequest {
            create_sql: format!("CREATE TABLE {} (id integer PRIMARY KEY, doc jsonb)", target),
        },
    )
    .await
    .unwrap();

    let request: TransferStartRequest = serde_json::from_value(json!({
        "query": "SELECT 1 AS id, '{\"k\":1}'::text AS doc",
        "target_table": target,
        "target_columns": ["id", "doc"],
        "primary_key": ["id"]
    }))
    .unwrap();
    let accepted = commands::submit_transfer(&state, request).await.unwrap();
    let view = wait_for_terminal(&state, &accepted.job_id).await;
    assert_eq!(view.status, JobStatus::Completed, "{:?}", view.error);
    assert_eq!(view.rows_inserted, Some(1));

    let result = commands::run_read_query(
        &state,
        ReadQueryRequest {
            query: format!("SELECT jsonb_typeof(doc) AS kind, doc FROM {}", target),
            params: Vec::new(),
            limit: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(result.rows[0]["kind"], json!("object"));
    assert_eq!(result.rows[0]["doc"], json!({"k": 1}));
    drop_tables(&url, &[&target]).await;
}

#[tokio::test]
async fn test_status_drops_terminated_connection() {
    let Some(url) = test_database_url() else {
        return;
    };
    let state = connected_state(&url).await;

    let result = commands::run_read_query(
        &state,
        ReadQueryRequest {
            query: "SELECT pg_backend_pid() AS pid".to_string(),
            params: Vec::new(),
            limit: None,
        },
    )
    .await
    .unwrap();
    let pid = result.rows[0]["pid"].as_i64().unwrap() as i32;
    assert!(commands::store_status(&state, StoreRole::Source).await.connected);

    let mut admin = PgConnection::connect(&url).await.unwrap();
    sqlx::query("SELECT pg_terminate_backend($1)")
        .bind(pid)
        .execute(&mut admin)
        .await
        .unwrap();
    admin.close().await.unwrap();

    let mut connected = true;
    for _ in 0..40 {
        connected = commands::store_status(&state, StoreRole::Source).await.connected;
        if !connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!connected);
    assert!(commands::store_status(&state, StoreRole::Source).await.database_url.is_some());
}
