use super::*;
use serde_json::json;

fn columns() -> Vec<ResultColumn> {
    vec![
        ResultColumn {
            name: "id".to_string(),
            type_name: "INT4".to_string(),
        },
        ResultColumn {
            name: "payload".to_string(),
            type_name: "BYTEA".to_string(),
        },
        ResultColumn {
            name: "note".to_string(),
            type_name: "TEXT".to_string(),
        },
    ]
}

#[test]
fn test_shape_row_keeps_result_order_and_encodes_bytes() {
    let document = json!({"note": "\\x00", "payload": "\\x68656c6c6f", "id": 7});
    let row = shape_row(&columns(), &document);
    let keys = row.keys().cloned().collect::<Vec<_>>();
    assert_eq!(keys, vec!["id", "payload", "note"]);
    assert_eq!(row["payload"], json!("base64:aGVsbG8="));
    assert_eq!(row["note"], json!("\\x00"));
    assert_eq!(row["id"], json!(7));
}

#[test]
fn test_shape_row_fills_missing_with_null() {
    let row = shape_row(&columns(), &json!({"id": 1}));
    assert_eq!(row["payload"], Value::Null);
}

#[test]
fn test_wrap_as_jsonb_rows() {
    assert_eq!(
        wrap_as_jsonb_rows("SELECT id FROM t"),
        "SELECT to_jsonb(src_row) FROM (SELECT id FROM t) AS src_row"
    );
}

#[test]
fn test_needs_identity_override() {
    let loaded = vec!["id".to_string(), "name".to_string()];
    assert!(needs_identity_override(&loaded, &["id".to_string()]));
    assert!(!needs_identity_override(&loaded, &["seq".to_string()]));
    assert!(!needs_identity_override(&loaded, &[]));
}

#[test]
fn test_text_like_columns() {
    let column = |type_name: &str| ResultColumn {
        name: "c".to_string(),
        type_name: type_name.to_string(),
    };
    assert!(column("TEXT").is_text_like());
    assert!(column("varchar").is_text_like());
    assert!(!column("JSONB").is_text_like());
    assert!(!column("INT4").is_text_like());
}
