//! Authenticated API client
//!
//! Every request carries the stored access token as a bearer token. A 401 on
//! the first attempt of a request that carried a token triggers one refresh through
//! `/auth/refresh` and one retry; a second 401 is returned as is. When the
//! refresh cannot happen the stored session is cleared and
//! [`SessionEvent::Expired`] is broadcast so the shell can route to login.

use std::sync::Arc;
use std::time::Duration;

use common::{ClientError, ClientResult, config::ClientConfig};
use reqwest::{Method, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        LoginCredentials, MessageResponse, NewUser, RefreshTokenResponse, TokenResponse,
        UpdateProfile, User, UserResponse,
        token::{ChangePasswordRequest, EmailRequest, ResetPasswordRequest, VerifyEmailRequest},
    },
    session::AuthSession,
    validation::{validate_email, validate_password, validate_username},
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_EVENT_CAPACITY: usize = 16;

/// Session changes observers may react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login or registration stored a new session
    LoggedIn { username: String },
    /// The user logged out
    LoggedOut,
    /// The session could not be refreshed and was cleared; route to login
    Expired,
}

/// Whether a 401 may start the refresh cycle.
///
/// Either way the cycle only runs for a request that carried an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshPolicy {
    /// Refresh once and retry
    RefreshOnce,
    /// Login, registration and logout: a 401 means bad credentials or a
    /// session that is being torn down anyway
    Never,
}

/// Client for the identity backend
#[derive(Clone, Debug)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    session: AuthSession,
    refresh_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<SessionEvent>,
}

impl AuthClient {
    /// Create a client for `base_url` (including the `/api` path)
    pub fn new(base_url: impl Into<String>, session: AuthSession) -> ClientResult<Self> {
        Self::with_timeout(base_url, session, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client from the shared configuration
    pub fn from_config(config: &ClientConfig, session: AuthSession) -> ClientResult<Self> {
        Self::with_timeout(
            config.api_base_url.clone(),
            session,
            config.request_timeout(),
        )
    }

    fn with_timeout(
        base_url: impl Into<String>,
        session: AuthSession,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Unexpected(format!("Failed to build HTTP client: {}", e)))?;
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            refresh_lock: Arc::new(Mutex::new(())),
            events,
        })
    }

    /// Shared session handle
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Subscribe to session changes
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session.access_token()
    }

    /// Register a new account and store the issued session
    pub async fn register(&self, new_user: &NewUser) -> ClientResult<User> {
        validate_username(&new_user.username).map_err(ClientError::Validation)?;
        validate_email(&new_user.email).map_err(ClientError::Validation)?;
        validate_password(&new_user.password).map_err(ClientError::Validation)?;
        info!("Registering user: {}", new_user.username);

        let tokens: TokenResponse = self
            .request_json(
                Method::POST,
                "/auth/register",
                Some(new_user),
                RefreshPolicy::Never,
            )
            .await?;
        self.start_session(tokens)
    }

    /// Log in with an email (or username) and password
    pub async fn login(&self, identifier: &str, password: &str) -> ClientResult<User> {
        info!("Login attempt for user: {}", identifier);

        let credentials = LoginCredentials {
            username: identifier.to_string(),
            password: password.to_string(),
        };
        let tokens: TokenResponse = self
            .request_json(
                Method::POST,
                "/auth/login",
                Some(&credentials),
                RefreshPolicy::Never,
            )
            .await?;
        self.start_session(tokens)
    }

    fn start_session(&self, tokens: TokenResponse) -> ClientResult<User> {
        if tokens.refresh_token.is_none() {
            warn!(
                "No refresh token issued for user {}; the session cannot be renewed",
                tokens.user.username
            );
        }
        self.session.store_login(
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            &tokens.user,
        )?;
        let _ = self.events.send(SessionEvent::LoggedIn {
            username: tokens.user.username.clone(),
        });
        Ok(tokens.user)
    }

    /// Log out on the server, then always clear local state
    pub async fn logout(&self) {
        if self.session.access_token().is_some() {
            let result: ClientResult<Response> = self
                .execute(
                    Method::POST,
                    "/auth/logout",
                    None::<&()>,
                    RefreshPolicy::Never,
                )
                .await;
            if let Err(e) = result {
                error!("Server-side logout failed: {}", e);
            }
        }

        if let Err(e) = self.session.clear() {
            error!("Failed to clear local session: {}", e);
        }
        let _ = self.events.send(SessionEvent::LoggedOut);
    }

    /// Fetch the current user and refresh the cached copy
    pub async fn get_profile(&self) -> ClientResult<User> {
        let response: UserResponse = self
            .request_json(
                Method::GET,
                "/auth/me",
                None::<&()>,
                RefreshPolicy::RefreshOnce,
            )
            .await?;
        self.session.store_user(&response.user)?;
        Ok(response.user)
    }

    /// Alias kept for the profile surface: re-fetch the user from the server
    pub async fn refresh_user(&self) -> ClientResult<User> {
        self.get_profile().await
    }

    /// Replace the cached user without a round trip
    pub fn update_user(&self, user: &User) -> ClientResult<()> {
        self.session.store_user(user)
    }

    /// Update profile fields and cache the returned user
    pub async fn update_profile(&self, update: &UpdateProfile) -> ClientResult<User> {
        if let Some(username) = update.username.as_deref() {
            validate_username(username).map_err(ClientError::Validation)?;
        }

        let response: UserResponse = self
            .request_json(
                Method::PUT,
                "/auth/profile",
                Some(update),
                RefreshPolicy::RefreshOnce,
            )
            .await?;
        self.session.store_user(&response.user)?;
        info!("Profile updated for user: {}", response.user.username);
        Ok(response.user)
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> ClientResult<MessageResponse> {
        validate_password(new_password).map_err(ClientError::Validation)?;

        self.request_json(
            Method::POST,
            "/auth/change-password",
            Some(&ChangePasswordRequest {
                current_password,
                new_password,
            }),
            RefreshPolicy::RefreshOnce,
        )
        .await
    }

    pub async fn forgot_password(&self, email: &str) -> ClientResult<MessageResponse> {
        validate_email(email).map_err(ClientError::Validation)?;

        self.request_json(
            Method::POST,
            "/auth/forgot-password",
            Some(&EmailRequest { email }),
            RefreshPolicy::RefreshOnce,
        )
        .await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> ClientResult<MessageResponse> {
        validate_password(new_password).map_err(ClientError::Validation)?;

        self.request_json(
            Method::POST,
            "/auth/reset-password",
            Some(&ResetPasswordRequest {
                token,
                new_password,
            }),
            RefreshPolicy::RefreshOnce,
        )
        .await
    }

    pub async fn verify_email(&self, token: &str) -> ClientResult<MessageResponse> {
        self.request_json(
            Method::POST,
            "/auth/verify-email",
            Some(&VerifyEmailRequest { token }),
            RefreshPolicy::RefreshOnce,
        )
        .await
    }

    /// Validate a stored session at start-up.
    ///
    /// Returns the fresh user when the stored session is still accepted. When
    /// the server rejects it the session is logged out locally and `None` is
    /// returned.
    pub async fn restore_session(&self) -> Option<User> {
        if !self.session.is_authenticated() {
            debug!("No stored session to restore");
            return None;
        }

        match self.get_profile().await {
            Ok(user) => {
                info!("Session restored for user: {}", user.username);
                Some(user)
            }
            Err(e) => {
                warn!("Stored session rejected, logging out: {}", e);
                self.logout().await;
                None
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        policy: RefreshPolicy,
    ) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(method, path, body, policy).await?;
        Ok(response.json::<T>().await?)
    }

    /// Run one logical request, including at most one refresh-and-retry
    async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        policy: RefreshPolicy,
    ) -> ClientResult<Response>
    where
        B: Serialize + ?Sized,
    {
        let request_id = Uuid::new_v4();
        let token = self.session.access_token();

        let response = self
            .send(&method, path, body, token.as_deref(), request_id)
            .await?;
        // Only a request that carried a token can have an expired session
        let stale = match token.as_deref() {
            Some(stale)
                if response.status() == StatusCode::UNAUTHORIZED
                    && policy == RefreshPolicy::RefreshOnce =>
            {
                stale
            }
            _ => return Self::check_status(response).await,
        };

        let unauthorized = ClientError::from_response(response).await;
        info!(
            "[{}] {} {} unauthorized, refreshing access token",
            request_id, method, path
        );

        let Some(fresh_token) = self.refresh_access_token(stale, request_id).await else {
            return Err(unauthorized);
        };

        let retried = self
            .send(&method, path, body, Some(&fresh_token), request_id)
            .await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(
                "[{}] {} {} still unauthorized after refresh",
                request_id, method, path
            );
        }
        Self::check_status(retried).await
    }

    async fn send<B>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
        request_id: Uuid,
    ) -> ClientResult<Response>
    where
        B: Serialize + ?Sized,
    {
        debug!("[{}] {} {}", request_id, method, path);

        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    async fn check_status(response: Response) -> ClientResult<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ClientError::from_response(response).await)
        }
    }

    /// Obtain a fresh access token, one refresh call at a time.
    ///
    /// `stale` is the token the failed request was sent with. If another
    /// request already replaced it while this one waited for the lock, the
    /// newer token is reused without calling the server again. If another
    /// request already expired the session, `None` is returned without a
    /// second expiry.
    ///
    /// A failed refresh clears the session and broadcasts
    /// [`SessionEvent::Expired`] before the lock is released.
    async fn refresh_access_token(&self, stale: &str, request_id: Uuid) -> Option<String> {
        let _guard = self.refresh_lock.lock().await;

        match self.session.access_token() {
            Some(current) if current != stale => {
                debug!(
                    "[{}] Access token already refreshed by a concurrent request",
                    request_id
                );
                return Some(current);
            }
            None => {
                debug!("[{}] Session already expired", request_id);
                return None;
            }
            Some(_) => {}
        }

        match self.request_refresh().await {
            Ok(fresh_token) => Some(fresh_token),
            Err(e) => {
                warn!("[{}] Token refresh failed: {}", request_id, e);
                self.expire_session();
                None
            }
        }
    }

    async fn request_refresh(&self) -> ClientResult<String> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or_else(|| ClientError::Unexpected("No refresh token stored".to_string()))?;

        let response = self
            .http
            .post(self.url("/auth/refresh"))
            .bearer_auth(&refresh_token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let tokens: RefreshTokenResponse = response.json().await?;

        self.session.store_access_token(&tokens.access_token)?;
        if let Some(rotated) = tokens.refresh_token.as_deref() {
            debug!("Refresh token rotated");
            self.session.store_refresh_token(rotated)?;
        }

        info!("Access token refreshed");
        Ok(tokens.access_token)
    }

    fn expire_session(&self) {
        if let Err(e) = self.session.clear() {
            error!("Failed to clear expired session: {}", e);
        }
        let _ = self.events.send(SessionEvent::Expired);
    }
}
