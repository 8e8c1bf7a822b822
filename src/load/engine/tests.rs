use super::*;

fn plan(file_kind: FileKind, columns: &[&str], primary_key: &[&str]) -> LoadPlan {
    LoadPlan {
        schema: "public".to_string(),
        table: "t".to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
        explicit_primary_key: !primary_key.is_empty(),
        file_kind,
    }
}

#[test]
fn test_prepare_csv_projects_header_order() {
    let prepared = prepare_load(
        &plan(FileKind::Csv, &["extra", "id"], &["id"]),
        b"id,name,extra\n1,a,x\n",
    )
    .unwrap();
    match prepared {
        PreparedLoad::Csv { header, columns } => {
            assert_eq!(header, vec!["id", "name", "extra"]);
            assert_eq!(columns, vec!["id", "extra"]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_prepare_csv_requires_explicit_key_in_file() {
    let err = prepare_load(
        &plan(FileKind::Csv, &["id", "name"], &["id"]),
        b"name\nAlice\n",
    )
    .unwrap_err();
    assert!(matches!(err, LoaderError::MissingPrimaryKeyColumns(ref cols) if cols == &["id"]));
}

#[test]
fn test_prepare_csv_auto_key_may_be_absent_from_file() {
    let mut auto = plan(FileKind::Csv, &["name"], &["id"]);
    auto.explicit_primary_key = false;
    assert!(prepare_load(&auto, b"name\nAlice\n").is_ok());
}

#[test]
fn test_prepare_csv_without_requested_columns() {
    let err = prepare_load(&plan(FileKind::Csv, &["id"], &[]), b"other\n1\n").unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
}

#[test]
fn test_prepare_csv_empty_file() {
    let err = prepare_load(&plan(FileKind::Csv, &["id"], &[]), b"").unwrap_err();
    assert_eq!(err.to_string(), "CSV file is empty");
}

#[test]
fn test_prepare_json_rows() {
    let prepared = prepare_load(
        &plan(FileKind::Json, &["id", "name"], &["id"]),
        br#"[{"id": 1, "name": "Alice"}, {"id": 1, "name": "Again"}]"#,
    )
    .unwrap();
    match prepared {
        PreparedLoad::Json { rows } => assert_eq!(rows.len(), 2),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_staging_statements() {
    let staging = staging_table_name("t");
    assert_eq!(staging, "t_staging");
    assert_eq!(
        build_create_staging_statement(&plan(FileKind::Csv, &["id"], &[]), &staging),
        "CREATE TEMP TABLE \"t_staging\" (LIKE \"public\".\"t\" INCLUDING ALL EXCLUDING INDEXES) ON COMMIT DROP"
    );
    assert_eq!(
        build_copy_statement(&staging, &["id".to_string(), "name".to_string()]),
        "COPY \"t_staging\" (\"id\", \"name\") FROM STDIN WITH (FORMAT csv, HEADER true)"
    );
}
