#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    Extension, Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, StatusCode, header},
};
use medibook::{
    ServerConfig,
    auth::hash_password,
    chat::KeywordResponder,
    create_app,
    db::{Database, NewUser, Role},
    jwt::TokenCodec,
    rate_limit::RateLimitConfig,
};
use serde_json::{Value, json};
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-with-at-least-32-characters";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const PASSWORD: &str = "correct horse";
pub const CLIENT_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);

/// An app over a fresh in-memory database.
pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub codec: TokenCodec,
}

/// Tokens from a successful login.
pub struct Session {
    pub user_id: String,
    pub access: String,
    pub refresh: String,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_rate_limit(rate_limit: RateLimitConfig) -> Self {
        Self::with_config(|config| config.rate_limit = rate_limit).await
    }

    /// Build from the default test configuration after `configure` adjusts it.
    pub async fn with_config(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let mut config = ServerConfig {
            db: db.clone(),
            jwt_secret: JWT_SECRET.to_vec(),
            secure_cookies: false,
            expose_error_detail: true,
            trust_proxy: false,
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            rate_limit: RateLimitConfig::permissive(),
            chat_responder: Arc::new(KeywordResponder),
        };
        configure(&mut config);

        // What `into_make_service_with_connect_info` would attach per connection.
        let app = create_app(&config).layer(Extension(ConnectInfo(CLIENT_ADDR)));

        Self {
            app,
            db,
            codec: TokenCodec::new(JWT_SECRET),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Send and decode the JSON body.
    pub async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn register(&self, email: &str, role: &str) -> (StatusCode, Value) {
        self.call(post_json(
            "/api/auth/register",
            None,
            json!({
                "email": email,
                "password": PASSWORD,
                "name": format!("User {}", email),
                "role": role,
            }),
        ))
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Response<Body> {
        self.send(post_json(
            "/api/auth/login",
            None,
            json!({ "email": email, "password": password }),
        ))
        .await
    }

    /// Register and log in, returning both tokens.
    pub async fn signup(&self, email: &str, role: &str) -> Session {
        let (status, body) = self.register(email, role).await;
        assert_eq!(status, StatusCode::OK, "register failed: {}", body);

        self.session(email).await
    }

    /// Admins cannot self-register; create one directly and log in.
    pub async fn admin(&self, email: &str) -> Session {
        let password_hash = hash_password(PASSWORD).unwrap();
        self.db
            .users()
            .create(&NewUser {
                uuid: &uuid::Uuid::new_v4().to_string(),
                email,
                password_hash: &password_hash,
                name: "Administrator",
                phone: None,
                role: Role::Admin,
            })
            .await
            .unwrap();

        self.session(email).await
    }

    async fn session(&self, email: &str) -> Session {
        let response = self.login(email, PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        let body = body_json(response).await;

        Session {
            user_id: body["user"]["id"].as_str().unwrap().to_string(),
            access: body["token"].as_str().unwrap().to_string(),
            refresh: cookie_value(&cookies, "refreshToken").unwrap(),
        }
    }

    /// Internal row id of a user, for driving the stores directly.
    pub async fn user_row_id(&self, uuid: &str) -> i64 {
        self.db.users().get_by_uuid(uuid).await.unwrap().unwrap().id
    }

    pub async fn refresh(&self, refresh_token: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .header(header::COOKIE, format!("refreshToken={}", refresh_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    json_request("POST", uri, token, body)
}

pub fn put_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    json_request("PUT", uri, token, body)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the named cookie among `Set-Cookie` headers.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies.iter().find_map(|cookie| {
        let (pair, _) = cookie.split_once(';').unwrap_or((cookie, ""));
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub fn cookie_header(cookies: &[String], name: &str) -> Option<String> {
    cookies
        .iter()
        .find(|c| c.starts_with(&format!("{}=", name)))
        .cloned()
}
