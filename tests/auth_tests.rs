//! Tests for registration, login, token refresh and logout.
//!
//! Covers:
//! - Registration validation and duplicate emails
//! - Login token lifetimes and the cookies it sets
//! - Refresh rotation, replay detection and concurrent refreshes
//! - Logout clearing every auth cookie with or without a live session
//! - Rate limiting on login and registration

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{
    JWT_SECRET, PASSWORD, TestApp, body_json, cookie_header, cookie_value, get, post_json,
    set_cookies,
};
use medibook::{
    ServerConfig,
    chat::KeywordResponder,
    create_app,
    db::Role,
    jwt::{ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS, TokenCodec, TokenKind},
    rate_limit::RateLimitConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_patient() {
    let app = TestApp::new().await;

    let (status, body) = app.register("alice@example.com", "PATIENT").await;

    assert_eq!(status, StatusCode::OK);
    let user_id = body["userId"].as_str().unwrap();
    let user = app.db.users().get_by_uuid(user_id).await.unwrap().unwrap();
    assert_eq!(user.role, Role::Patient);
    assert_ne!(user.password_hash, PASSWORD);
}

#[tokio::test]
async fn test_register_defaults_to_patient() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(post_json(
            "/api/auth/register",
            None,
            json!({ "email": "bob@example.com", "password": PASSWORD, "name": "Bob" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    let user = app
        .db
        .users()
        .get_by_uuid(body["userId"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.role, Role::Patient);
}

#[tokio::test]
async fn test_register_short_password() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(post_json(
            "/api/auth/register",
            None,
            json!({ "email": "carol@example.com", "password": "12345", "name": "Carol" }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains('6'));
    assert_eq!(body["details"][0]["field"], "password");
}

#[tokio::test]
async fn test_register_reports_every_invalid_field() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(post_json(
            "/api/auth/register",
            None,
            json!({ "email": "not-an-email", "password": "x" }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["email", "password", "name"]);
}

#[tokio::test]
async fn test_register_cannot_choose_admin() {
    let app = TestApp::new().await;

    let (status, _) = app.register("mallory@example.com", "ADMIN").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        app.db
            .users()
            .get_by_email("mallory@example.com")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = TestApp::new().await;

    let (status, _) = app.register("dave@example.com", "PATIENT").await;
    assert_eq!(status, StatusCode::OK);

    // Emails are compared case-insensitively.
    let (status, body) = app.register("Dave@Example.com", "DOCTOR").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already registered"));
}

#[tokio::test]
async fn test_register_malformed_json() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_issues_token_pair() {
    let app = TestApp::new().await;
    app.register("erin@example.com", "DOCTOR").await;

    let response = app.login("erin@example.com", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    let body = body_json(response).await;

    assert_eq!(body["user"]["email"], "erin@example.com");
    assert_eq!(body["user"]["role"], "DOCTOR");

    let access = body["token"].as_str().unwrap();
    let claims = app.codec.verify(access, TokenKind::Access).unwrap();
    assert_eq!(claims.role, Role::Doctor);
    assert_eq!(claims.sub, body["user"]["id"].as_str().unwrap());
    assert_eq!(claims.exp, claims.iat + ACCESS_TOKEN_TTL_SECS);
    assert_eq!(cookie_value(&cookies, "token").as_deref(), Some(access));

    let refresh = cookie_value(&cookies, "refreshToken").unwrap();
    let claims = app.codec.verify(&refresh, TokenKind::Refresh).unwrap();
    assert_eq!(claims.exp, claims.iat + REFRESH_TOKEN_TTL_SECS);
    assert!(claims.jti.is_some());

    let refresh_cookie = cookie_header(&cookies, "refreshToken").unwrap();
    assert!(refresh_cookie.contains("Path=/api/auth/refresh"));
    assert!(refresh_cookie.contains("HttpOnly"));
    assert!(refresh_cookie.contains(&format!("Max-Age={}", REFRESH_TOKEN_TTL_SECS)));
}

#[tokio::test]
async fn test_login_wrong_password_and_unknown_email_look_alike() {
    let app = TestApp::new().await;
    app.register("frank@example.com", "PATIENT").await;

    let wrong_password = app.login("frank@example.com", "wrong password").await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&wrong_password).is_empty());
    let wrong_password = body_json(wrong_password).await;

    let unknown = app.login("nobody@example.com", PASSWORD).await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let unknown = body_json(unknown).await;

    assert_eq!(wrong_password, unknown);
}

#[tokio::test]
async fn test_login_unknown_email_takes_as_long() {
    let app = TestApp::new().await;
    app.register("ivy@example.com", "PATIENT").await;

    // First calls pay one-off setup costs.
    app.login("ivy@example.com", "wrong password").await;
    app.login("nobody@example.com", PASSWORD).await;

    let start = Instant::now();
    let known = app.login("ivy@example.com", "wrong password").await;
    let known_elapsed = start.elapsed();

    let start = Instant::now();
    let unknown = app.login("nobody@example.com", PASSWORD).await;
    let unknown_elapsed = start.elapsed();

    assert_eq!(known.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    // Both paths run a full password hash check; without it the unknown
    // email answers orders of magnitude faster.
    assert!(
        unknown_elapsed * 4 >= known_elapsed,
        "unknown email {:?}, wrong password {:?}",
        unknown_elapsed,
        known_elapsed
    );
}

#[tokio::test]
async fn test_login_is_case_insensitive_on_email() {
    let app = TestApp::new().await;
    app.register("grace@example.com", "PATIENT").await;

    let response = app.login("GRACE@example.com", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_rate_limited() {
    let app = TestApp::with_rate_limit(RateLimitConfig::new()).await;

    let mut statuses = Vec::new();
    for _ in 0..6 {
        statuses.push(app.login("heidi@example.com", PASSWORD).await.status());
    }

    assert!(statuses[..5].iter().all(|s| *s == StatusCode::UNAUTHORIZED));
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_register_rate_limited() {
    let app = TestApp::with_rate_limit(RateLimitConfig::new()).await;

    for i in 0..3 {
        let (status, _) = app.register(&format!("user{}@example.com", i), "PATIENT").await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = app.register("user3@example.com", "PATIENT").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limited_routes_need_client_address() {
    let app = TestApp::new().await;

    let (status, body) = app.register("judy@example.com", "PATIENT").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(
        app.login("judy@example.com", PASSWORD).await.status(),
        StatusCode::OK
    );

    // Without the peer address the limiter cannot key the request.
    let bare = create_app(&ServerConfig {
        db: app.db.clone(),
        jwt_secret: JWT_SECRET.to_vec(),
        secure_cookies: false,
        expose_error_detail: true,
        trust_proxy: false,
        webhook_secret: None,
        rate_limit: RateLimitConfig::permissive(),
        chat_responder: Arc::new(KeywordResponder),
    });
    let response = bare
        .oneshot(post_json(
            "/api/auth/login",
            None,
            json!({ "email": "judy@example.com", "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Authenticated requests
// =============================================================================

#[tokio::test]
async fn test_me_with_bearer_token() {
    let app = TestApp::new().await;
    let session = app.signup("ivan@example.com", "PATIENT").await;

    let (status, body) = app.call(get("/api/auth/me", Some(&session.access))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], session.user_id.as_str());
    assert_eq!(body["role"], "PATIENT");
    assert_eq!(
        body["expiresAt"].as_u64().unwrap(),
        body["issuedAt"].as_u64().unwrap() + ACCESS_TOKEN_TTL_SECS
    );
}

#[tokio::test]
async fn test_me_with_cookie() {
    let app = TestApp::new().await;
    let session = app.signup("judy@example.com", "PATIENT").await;

    for cookie in ["token", "access_token"] {
        let response = app
            .send(
                Request::builder()
                    .uri("/api/auth/me")
                    .header(header::COOKIE, format!("{}={}", cookie, session.access))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "cookie {}", cookie);
    }
}

#[tokio::test]
async fn test_me_without_token() {
    let app = TestApp::new().await;

    let (status, body) = app.call(get("/api/auth/me", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Not authenticated");
}

#[tokio::test]
async fn test_me_with_expired_token() {
    let app = TestApp::new().await;
    let session = app.signup("ken@example.com", "PATIENT").await;

    let expired = app
        .codec
        .issue_at(
            &session.user_id,
            Role::Patient,
            TokenKind::Access,
            now() - ACCESS_TOKEN_TTL_SECS - 60,
        )
        .unwrap();

    let (status, body) = app.call(get("/api/auth/me", Some(&expired.token))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token expired");
}

#[tokio::test]
async fn test_me_rejects_forged_and_refresh_tokens() {
    let app = TestApp::new().await;
    let session = app.signup("leo@example.com", "PATIENT").await;

    let forged = TokenCodec::new(b"some-other-secret-of-sufficient-length")
        .issue(&session.user_id, Role::Admin, TokenKind::Access)
        .unwrap();

    for token in [forged.token.as_str(), session.refresh.as_str(), "garbage"] {
        let (status, body) = app.call(get("/api/auth/me", Some(token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token");
    }
}

// =============================================================================
// Refresh
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let app = TestApp::new().await;
    let session = app.signup("mia@example.com", "PATIENT").await;

    let response = app.refresh(&session.refresh).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    let body = body_json(response).await;

    let access = body["token"].as_str().unwrap();
    assert_eq!(cookie_value(&cookies, "token").as_deref(), Some(access));
    let new_refresh = cookie_value(&cookies, "refreshToken").unwrap();
    assert_ne!(new_refresh, session.refresh);

    let claims = app.codec.verify(access, TokenKind::Access).unwrap();
    assert_eq!(claims.sub, session.user_id);
    assert_eq!(claims.role, Role::Patient);

    // The new refresh token is good for exactly one more exchange.
    let response = app.refresh(&new_refresh).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_replay_rejected() {
    let app = TestApp::new().await;
    let session = app.signup("nina@example.com", "PATIENT").await;

    let first = app.refresh(&session.refresh).await;
    assert_eq!(first.status(), StatusCode::OK);
    let rotated = cookie_value(&set_cookies(&first), "refreshToken").unwrap();

    let replay = app.refresh(&session.refresh).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&replay).is_empty());

    // Reuse ends the session, so the legitimately rotated token is dead too.
    let after = app.refresh(&rotated).await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_concurrent_refresh_only_one_wins() {
    let app = TestApp::new().await;
    let session = app.signup("oscar@example.com", "PATIENT").await;

    let (a, b) = tokio::join!(app.refresh(&session.refresh), app.refresh(&session.refresh));

    let mut statuses = [a.status(), b.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::UNAUTHORIZED]);
}

#[tokio::test]
async fn test_refresh_expired_token() {
    let app = TestApp::new().await;
    let session = app.signup("peggy@example.com", "PATIENT").await;

    let expired = app
        .codec
        .issue_at(
            &session.user_id,
            Role::Patient,
            TokenKind::Refresh,
            now() - REFRESH_TOKEN_TTL_SECS - 60,
        )
        .unwrap();

    let response = app.refresh(&expired.token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_json(response).await["error"], "Token expired");
}

#[tokio::test]
async fn test_refresh_without_cookie() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_refresh_rejects_access_token() {
    let app = TestApp::new().await;
    let session = app.signup("quinn@example.com", "PATIENT").await;

    let response = app.refresh(&session.access).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_accepts_legacy_cookie() {
    let app = TestApp::new().await;
    let session = app.signup("rita@example.com", "PATIENT").await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .header(header::COOKIE, format!("refresh_token={}", session.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_picks_up_role_change() {
    let app = TestApp::new().await;
    let session = app.signup("sam@example.com", "PATIENT").await;

    let id = app.user_row_id(&session.user_id).await;
    app.db.users().set_role(id, Role::Doctor).await.unwrap();

    let response = app.refresh(&session.refresh).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let claims = app
        .codec
        .verify(body["token"].as_str().unwrap(), TokenKind::Access)
        .unwrap();
    assert_eq!(claims.role, Role::Doctor);
}

#[tokio::test]
async fn test_refresh_deleted_user() {
    let app = TestApp::new().await;
    let session = app.signup("tina@example.com", "PATIENT").await;

    let id = app.user_row_id(&session.user_id).await;
    app.db.users().delete(id).await.unwrap();

    let response = app.refresh(&session.refresh).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_again_replaces_session() {
    let app = TestApp::new().await;
    let first = app.signup("uma@example.com", "PATIENT").await;

    let response = app.login("uma@example.com", PASSWORD).await;
    let second = cookie_value(&set_cookies(&response), "refreshToken").unwrap();

    assert_eq!(
        app.refresh(&first.refresh).await.status(),
        StatusCode::UNAUTHORIZED
    );

    // Reuse of the old token ended the session the second login created.
    assert_eq!(app.refresh(&second).await.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Logout
// =============================================================================

fn assert_all_cleared(cookies: &[String]) {
    assert_eq!(cookies.len(), 4);
    for name in ["token", "refreshToken", "access_token", "refresh_token"] {
        let cookie = cookie_header(cookies, name).unwrap_or_else(|| panic!("{} not cleared", name));
        assert!(cookie.contains("Max-Age=0"), "{}", cookie);
        assert_eq!(cookie_value(cookies, name).as_deref(), Some(""));
    }
    assert!(
        cookie_header(cookies, "refreshToken")
            .unwrap()
            .contains("Path=/api/auth/refresh")
    );
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let app = TestApp::new().await;
    let session = app.signup("victor@example.com", "PATIENT").await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(
                    header::COOKIE,
                    format!("token={}; refreshToken={}", session.access, session.refresh),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_all_cleared(&set_cookies(&response));
    assert_eq!(body_json(response).await["success"], true);

    assert_eq!(
        app.refresh(&session.refresh).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_logout_with_access_token_only() {
    let app = TestApp::new().await;
    let session = app.signup("wendy@example.com", "PATIENT").await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::AUTHORIZATION, format!("Bearer {}", session.access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.refresh(&session.refresh).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_logout_without_session() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_all_cleared(&set_cookies(&response));
}

#[tokio::test]
async fn test_logout_with_expired_refresh_token() {
    let app = TestApp::new().await;
    let session = app.signup("xena@example.com", "PATIENT").await;

    // Past expiry, but still names whose session to end.
    let codec = TokenCodec::new(JWT_SECRET);
    let expired = codec
        .issue_at(
            &session.user_id,
            Role::Patient,
            TokenKind::Refresh,
            now() - REFRESH_TOKEN_TTL_SECS - 60,
        )
        .unwrap();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, format!("refreshToken={}", expired.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.refresh(&session.refresh).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_logout_when_session_store_fails() {
    let app = TestApp::new().await;
    let session = app.signup("yusuf@example.com", "PATIENT").await;

    sqlx::query("DROP TABLE sessions")
        .execute(app.db.pool())
        .await
        .unwrap();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, format!("refreshToken={}", session.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_all_cleared(&set_cookies(&response));
    assert_eq!(body_json(response).await["success"], false);
}

#[tokio::test]
async fn test_logout_ignores_stale_access_token() {
    let app = TestApp::new().await;
    let session = app.signup("zoe@example.com", "PATIENT").await;

    // Expired longer ago than any refresh token could have lived.
    let stale = app
        .codec
        .issue_at(
            &session.user_id,
            Role::Patient,
            TokenKind::Access,
            now() - REFRESH_TOKEN_TTL_SECS - ACCESS_TOKEN_TTL_SECS - 60,
        )
        .unwrap();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, format!("token={}", stale.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_all_cleared(&set_cookies(&response));
    assert_eq!(
        app.refresh(&session.refresh).await.status(),
        StatusCode::OK
    );
}
