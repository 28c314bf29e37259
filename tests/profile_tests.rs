mod common;

use axum::http::StatusCode;
use common::{TestApp, get, put_json};
use serde_json::json;

#[tokio::test]
async fn test_get_own_profile() {
    let app = TestApp::new().await;
    let patient = app.signup("patient@example.com", "PATIENT").await;

    let (status, body) = app.call(get("/api/profile", Some(&patient.access))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], patient.user_id.as_str());
    assert_eq!(body["email"], "patient@example.com");
    assert_eq!(body["role"], "PATIENT");
    assert!(body.get("doctor").is_none());
    assert!(body.get("passwordHash").is_none());
}

#[tokio::test]
async fn test_doctor_profile_includes_practice() {
    let app = TestApp::new().await;
    let doctor = app.signup("doctor@example.com", "DOCTOR").await;

    let (status, body) = app
        .call(put_json(
            "/api/profile",
            Some(&doctor.access),
            json!({ "specialization": "Cardiology", "bio": "Twenty years of hearts." }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["doctor"]["specialization"], "Cardiology");
    assert_eq!(body["doctor"]["available"], true);

    let (_, body) = app.call(get("/api/doctors", None)).await;
    assert_eq!(body["doctors"][0]["specialization"], "Cardiology");
}

#[tokio::test]
async fn test_update_profile() {
    let app = TestApp::new().await;
    let patient = app.signup("patient@example.com", "PATIENT").await;

    let (status, body) = app
        .call(put_json(
            "/api/profile",
            Some(&patient.access),
            json!({ "name": "  Pat Smith ", "dateOfBirth": "1990-01-15", "phone": "555-0100" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Pat Smith");
    assert_eq!(body["dateOfBirth"], "1990-01-15");
    assert_eq!(body["phone"], "555-0100");
    assert_eq!(body["email"], "patient@example.com");
}

#[tokio::test]
async fn test_update_profile_invalid() {
    let app = TestApp::new().await;
    let patient = app.signup("patient@example.com", "PATIENT").await;

    for payload in [
        json!({}),
        json!({ "name": "" }),
        json!({ "dateOfBirth": "15/01/1990" }),
        json!({ "specialization": "Surgery" }),
    ] {
        let (status, _) = app
            .call(put_json("/api/profile", Some(&patient.access), payload.clone()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", payload);
    }
}

#[tokio::test]
async fn test_profile_of_deleted_user() {
    let app = TestApp::new().await;
    let patient = app.signup("patient@example.com", "PATIENT").await;

    let id = app.user_row_id(&patient.user_id).await;
    app.db.users().delete(id).await.unwrap();

    // The access token is still valid until it expires, but the account is gone.
    let (status, _) = app.call(get("/api/profile", Some(&patient.access))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_requires_login() {
    let app = TestApp::new().await;

    let (status, _) = app.call(get("/api/profile", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
