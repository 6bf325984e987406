//! Integration tests for the authenticated API client
//!
//! An in-process axum router stands in for the identity backend so the
//! refresh cycle can be observed call by call.

use std::net::SocketAddr;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use auth::{AuthClient, AuthSession, ProfileForm, SessionEvent, UpdateProfile};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use common::{ClientError, ErrorKind};
use serde::Deserialize;
use serde_json::{Value, json};

const PASSWORD: &str = "motdepasse";
const REFRESH_TOKEN: &str = "refresh-1";
const ROTATED_REFRESH_TOKEN: &str = "refresh-2";

#[derive(Clone)]
struct Backend {
    /// The only access token `/auth/me` and `/auth/profile` accept
    valid_access: Arc<Mutex<String>>,
    /// Token handed out by `/auth/refresh`
    refreshed_access: String,
    /// The only refresh token `/auth/refresh` accepts
    valid_refresh: Arc<Mutex<String>>,
    issue_refresh_token: bool,
    rotate_refresh_token: bool,
    refresh_succeeds: bool,
    logout_succeeds: bool,
    refresh_calls: Arc<AtomicUsize>,
    me_calls: Arc<AtomicUsize>,
    logout_calls: Arc<AtomicUsize>,
    bio: Arc<Mutex<Option<String>>>,
}

impl Backend {
    fn new() -> Self {
        Self {
            valid_access: Arc::new(Mutex::new("access-1".to_string())),
            refreshed_access: "access-2".to_string(),
            valid_refresh: Arc::new(Mutex::new(REFRESH_TOKEN.to_string())),
            issue_refresh_token: true,
            rotate_refresh_token: false,
            refresh_succeeds: true,
            logout_succeeds: true,
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            me_calls: Arc::new(AtomicUsize::new(0)),
            logout_calls: Arc::new(AtomicUsize::new(0)),
            bio: Arc::new(Mutex::new(None)),
        }
    }

    /// Tokens issued at login are already stale; only the refreshed one works
    fn with_expired_login_token(self) -> Self {
        *self.valid_access.lock().unwrap() = self.refreshed_access.clone();
        self
    }

    fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn me_requests(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }

    fn user_json(&self) -> Value {
        json!({
            "id": 42,
            "username": "marie",
            "email": "marie@example.com",
            "email_verified": true,
            "first_name": "Marie",
            "last_name": "Dupont",
            "bio": *self.bio.lock().unwrap(),
            "location": "Paris",
            "created_at": "2024-05-01T10:00:00Z",
            "last_login": null
        })
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid_access.lock().unwrap());
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == expected)
    }
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(State(backend): State<Backend>, Json(body): Json<LoginBody>) -> Response {
    if body.username != "marie@example.com" || body.password != PASSWORD {
        return unauthorized("Invalid credentials");
    }

    let mut payload = json!({
        "access_token": "access-1",
        "user": backend.user_json(),
    });
    if backend.issue_refresh_token {
        payload["refresh_token"] = json!(REFRESH_TOKEN);
    }
    Json(payload).into_response()
}

async fn me(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.me_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized("Token has expired");
    }
    Json(json!({ "user": backend.user_json() })).into_response()
}

async fn profile(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized("Token has expired");
    }
    if let Some(bio) = body.get("bio").and_then(Value::as_str) {
        *backend.bio.lock().unwrap() = Some(bio.to_string());
    }
    Json(json!({ "user": backend.user_json() })).into_response()
}

async fn refresh(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    // Widen the window in which concurrent requests queue behind this refresh
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let presented = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let expected = format!("Bearer {}", backend.valid_refresh.lock().unwrap());
    if !backend.refresh_succeeds || presented != expected {
        return unauthorized("Invalid refresh token");
    }

    let mut payload = json!({ "access_token": backend.refreshed_access });
    if backend.rotate_refresh_token {
        *backend.valid_refresh.lock().unwrap() = ROTATED_REFRESH_TOKEN.to_string();
        payload["refresh_token"] = json!(ROTATED_REFRESH_TOKEN);
    }
    Json(payload).into_response()
}

async fn logout(State(backend): State<Backend>) -> Response {
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    if backend.logout_succeeds {
        Json(json!({ "message": "Logged out successfully" })).into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Internal server error" })),
        )
            .into_response()
    }
}

async fn forgot_password(Json(body): Json<Value>) -> Response {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    Json(json!({ "message": format!("Reset link sent to {}", email) })).into_response()
}

async fn verify_email(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized("Token has expired");
    }
    Json(json!({ "message": "Email verified" })).into_response()
}

async fn spawn_backend(backend: Backend) -> SocketAddr {
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/profile", put(profile))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/verify-email", post(verify_email))
        .with_state(backend);
    let router = Router::new().nest("/api", api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    addr
}

async fn client_for(backend: &Backend) -> Result<AuthClient, ClientError> {
    let addr = spawn_backend(backend.clone()).await;
    AuthClient::new(format!("http://{}/api", addr), AuthSession::in_memory())
}

#[tokio::test]
async fn test_login_stores_session() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new();
    let client = client_for(&backend).await?;
    let mut events = client.subscribe();

    let user = client.login("marie@example.com", PASSWORD).await?;

    assert_eq!(user.username, "marie");
    assert!(client.is_authenticated());
    assert_eq!(client.access_token().as_deref(), Some("access-1"));
    assert_eq!(
        client.session().refresh_token().as_deref(),
        Some(REFRESH_TOKEN)
    );
    assert_eq!(client.current_user(), Some(user));
    assert_eq!(
        events.recv().await?,
        SessionEvent::LoggedIn {
            username: "marie".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_bad_credentials_do_not_start_refresh() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new();
    let client = client_for(&backend).await?;

    let err = client
        .login("marie@example.com", "wrong-password")
        .await
        .expect_err("bad credentials");

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.user_message(), "Invalid credentials");
    assert_eq!(backend.refreshes(), 0);
    assert!(!client.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn test_expired_token_refreshes_once_and_retries() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new().with_expired_login_token();
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;

    let user = client.get_profile().await?;

    assert_eq!(user.email, "marie@example.com");
    assert_eq!(backend.refreshes(), 1);
    assert_eq!(backend.me_requests(), 2);
    assert_eq!(client.access_token().as_deref(), Some("access-2"));
    assert!(client.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn test_second_unauthorized_is_terminal() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new();
    *backend.valid_access.lock().unwrap() = "nobody-has-this".to_string();
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;

    let err = client.get_profile().await.expect_err("still unauthorized");

    assert!(err.is_unauthorized());
    assert_eq!(backend.refreshes(), 1);
    assert_eq!(backend.me_requests(), 2);
    Ok(())
}

#[tokio::test]
async fn test_missing_refresh_token_expires_session() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = Backend::new().with_expired_login_token();
    backend.issue_refresh_token = false;
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;
    assert!(client.session().refresh_token().is_none());
    let mut events = client.subscribe();

    let err = client.get_profile().await.expect_err("no refresh possible");

    assert!(err.is_unauthorized());
    assert_eq!(backend.refreshes(), 0);
    assert_eq!(backend.me_requests(), 1);
    assert!(!client.is_authenticated());
    assert!(client.current_user().is_none());
    assert_eq!(events.recv().await?, SessionEvent::Expired);
    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_expires_session() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = Backend::new().with_expired_login_token();
    backend.refresh_succeeds = false;
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;
    let mut events = client.subscribe();

    let err = client.get_profile().await.expect_err("refresh rejected");

    assert_eq!(err.user_message(), "Token has expired");
    assert_eq!(backend.refreshes(), 1);
    assert_eq!(backend.me_requests(), 1);
    assert!(!client.is_authenticated());
    assert!(client.session().refresh_token().is_none());
    assert_eq!(events.recv().await?, SessionEvent::Expired);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_expire_session_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = Backend::new().with_expired_login_token();
    backend.issue_refresh_token = false;
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;
    let mut events = client.subscribe();

    let (first, second, third) = tokio::join!(
        client.get_profile(),
        client.get_profile(),
        client.get_profile()
    );

    assert!(first.is_err());
    assert!(second.is_err());
    assert!(third.is_err());
    assert!(!client.is_authenticated());

    let mut expired = 0;
    while let Ok(event) = events.try_recv() {
        if event == SessionEvent::Expired {
            expired += 1;
        }
    }
    assert_eq!(expired, 1);
    Ok(())
}

#[tokio::test]
async fn test_refresh_stores_rotated_refresh_token() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = Backend::new().with_expired_login_token();
    backend.rotate_refresh_token = true;
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;
    assert_eq!(
        client.session().refresh_token().as_deref(),
        Some(REFRESH_TOKEN)
    );

    client.get_profile().await?;

    assert_eq!(backend.refreshes(), 1);
    assert_eq!(
        client.session().refresh_token().as_deref(),
        Some(ROTATED_REFRESH_TOKEN)
    );
    assert_eq!(client.access_token().as_deref(), Some("access-2"));
    Ok(())
}

#[tokio::test]
async fn test_verify_email_refreshes_expired_token() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new().with_expired_login_token();
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;

    let response = client.verify_email("verification-token").await?;

    assert_eq!(response.message.as_deref(), Some("Email verified"));
    assert_eq!(backend.refreshes(), 1);
    assert_eq!(client.access_token().as_deref(), Some("access-2"));
    Ok(())
}

#[tokio::test]
async fn test_verify_email_expires_unrenewable_session() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = Backend::new().with_expired_login_token();
    backend.issue_refresh_token = false;
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;
    let mut events = client.subscribe();

    let err = client
        .verify_email("verification-token")
        .await
        .expect_err("session cannot be renewed");

    assert!(err.is_unauthorized());
    assert!(!client.is_authenticated());
    assert_eq!(events.recv().await?, SessionEvent::Expired);
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_without_session_does_not_expire() -> Result<(), Box<dyn std::error::Error>>
{
    let backend = Backend::new();
    let client = client_for(&backend).await?;
    let mut events = client.subscribe();

    let err = client
        .verify_email("verification-token")
        .await
        .expect_err("no session");

    assert!(err.is_unauthorized());
    assert_eq!(backend.refreshes(), 0);
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh()
-> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new().with_expired_login_token();
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;

    let (first, second, third) = tokio::join!(
        client.get_profile(),
        client.get_profile(),
        client.refresh_user()
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert!(third.is_ok());
    assert_eq!(backend.refreshes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_update_profile_caches_returned_user() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new();
    let client = client_for(&backend).await?;
    let user = client.login("marie@example.com", PASSWORD).await?;

    let mut form = ProfileForm::from_user(&user);
    form.bio = "Amatrice de café".to_string();
    form.validate()?;
    let updated = client.update_profile(&form.to_update()).await?;

    assert_eq!(updated.bio.as_deref(), Some("Amatrice de café"));
    assert_eq!(client.current_user(), Some(updated));
    Ok(())
}

#[tokio::test]
async fn test_update_profile_rejects_invalid_username() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new();
    let client = client_for(&backend).await?;

    let update = UpdateProfile {
        username: Some("x".to_string()),
        ..Default::default()
    };
    let err = client.update_profile(&update).await.expect_err("too short");
    assert!(matches!(err, ClientError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn test_logout_clears_state_even_when_server_fails() -> Result<(), Box<dyn std::error::Error>>
{
    let mut backend = Backend::new();
    backend.logout_succeeds = false;
    let client = client_for(&backend).await?;
    client.login("marie@example.com", PASSWORD).await?;

    client.logout().await;

    assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 1);
    assert!(!client.is_authenticated());
    assert!(client.access_token().is_none());
    assert!(client.session().refresh_token().is_none());
    Ok(())
}

#[tokio::test]
async fn test_restore_session() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new();
    let client = client_for(&backend).await?;
    assert!(client.restore_session().await.is_none());

    client.login("marie@example.com", PASSWORD).await?;
    let restored = client.restore_session().await;
    assert_eq!(restored.map(|user| user.id), Some(42));

    // The server stops accepting every token this client can obtain
    *backend.valid_access.lock().unwrap() = "rotated-elsewhere".to_string();
    let restored = client.restore_session().await;
    assert!(restored.is_none());
    assert!(!client.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn test_forgot_password_returns_message() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::new();
    let client = client_for(&backend).await?;

    let response = client.forgot_password("marie@example.com").await?;
    assert_eq!(
        response.message.as_deref(),
        Some("Reset link sent to marie@example.com")
    );

    let err = client.forgot_password("marie").await.expect_err("invalid");
    assert_eq!(err, ClientError::Validation("Invalid email format".to_string()));
    Ok(())
}
