//! Behaviour with production settings.
//!
//! Error detail is a process-wide flag, so these tests live in their own
//! binary where every app is built with it off.

mod common;

use axum::http::StatusCode;
use common::{TestApp, get};

#[tokio::test]
async fn test_internal_errors_hide_detail() {
    let app = TestApp::with_config(|config| config.expose_error_detail = false).await;
    let patient = app.signup("patient@example.com", "PATIENT").await;

    sqlx::query("DROP TABLE notifications")
        .execute(app.db.pool())
        .await
        .unwrap();

    let (status, body) = app
        .call(get("/api/notifications", Some(&patient.access)))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Database error");
    assert!(body.get("detail").is_none(), "{}", body);
}
