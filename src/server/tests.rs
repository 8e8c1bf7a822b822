use super::*;

#[test]
fn test_error_status_codes() {
    let cases = [
        (LoaderError::Configuration("Target database not configured".into()), StatusCode::BAD_REQUEST),
        (LoaderError::validation("columns is required"), StatusCode::BAD_REQUEST),
        (LoaderError::NotFound("job not found".into()), StatusCode::NOT_FOUND),
        (
            LoaderError::MissingPrimaryKeyColumns(vec!["id".into()]),
            StatusCode::BAD_REQUEST,
        ),
        (LoaderError::Canceled, StatusCode::CONFLICT),
        (LoaderError::Timeout(10), StatusCode::BAD_REQUEST),
    ];

    for (err, expected) in cases {
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), expected);
    }
}

#[test]
fn test_is_truthy() {
    assert!(is_truthy("true"));
    assert!(is_truthy(" 1 "));
    assert!(is_truthy("Yes"));
    assert!(!is_truthy("false"));
    assert!(!is_truthy(""));
}

#[tokio::test]
async fn test_router_builds() {
    let _router = build_router(AppState::default(), 1024);
}
