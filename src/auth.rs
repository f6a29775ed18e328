use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::error::SyncError;
use crate::storage::{Session, SessionStore};

const IDENTITY_ROOT: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_ROOT: &str = "https://securetoken.googleapis.com/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    email: String,
    local_id: String,
    id_token: String,
    #[serde(default)]
    refresh_token: String,
}

/// Body of the token endpoint; unlike the account endpoints it is snake_case.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
}

/// Email/password accounts on the hosted auth provider.
#[derive(Clone)]
pub struct AuthClient {
    http: HttpClient,
    root: String,
    token_root: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            root: IDENTITY_ROOT.to_string(),
            token_root: SECURE_TOKEN_ROOT.to_string(),
            api_key: api_key.into(),
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Session, SyncError> {
        validate_sign_up(email, password, confirm_password)?;
        let session = self.call("accounts:signUp", email, password).await?;
        log::info!("User created: {}", session.email);
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, SyncError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(SyncError::Validation(
                "Email and password must not be empty".to_string(),
            ));
        }
        let session = self.call("accounts:signInWithPassword", email, password).await?;
        log::info!("Signed in as {}", session.email);
        Ok(session)
    }

    /// Trade the session's refresh token for a new ID token.
    pub async fn refresh(&self, session: &Session) -> Result<Session, SyncError> {
        self.require_api_key()?;
        if session.refresh_token.is_empty() {
            return Err(SyncError::Auth("session has no refresh token".to_string()));
        }
        let resp = self
            .http
            .post(format!("{}/token", self.token_root))
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Auth(e.to_string()))?;

        let status = resp.status();
        let json: Value = resp.json().await.map_err(|e| SyncError::Auth(e.to_string()))?;
        if !status.is_success() {
            return Err(SyncError::Auth(provider_message(&json, status.as_u16())));
        }
        let refreshed = refreshed_session(session, json)?;
        log::info!("Refreshed ID token for {}", refreshed.email);
        Ok(refreshed)
    }

    fn require_api_key(&self) -> Result<(), SyncError> {
        if self.api_key.is_empty() {
            return Err(SyncError::Config("api_key is not set".to_string()));
        }
        Ok(())
    }

    async fn call(&self, method: &str, email: &str, password: &str) -> Result<Session, SyncError> {
        self.require_api_key()?;
        let body = json!({
            "email": email.trim(),
            "password": password,
            "returnSecureToken": true,
        });
        let resp = self
            .http
            .post(format!("{}/{method}", self.root))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Auth(e.to_string()))?;

        let status = resp.status();
        let json: Value = resp.json().await.map_err(|e| SyncError::Auth(e.to_string()))?;
        if !status.is_success() {
            return Err(SyncError::Auth(provider_message(&json, status.as_u16())));
        }
        let parsed: AuthResponse =
            serde_json::from_value(json).map_err(|e| SyncError::Auth(e.to_string()))?;
        Ok(Session {
            email: parsed.email,
            user_id: parsed.local_id,
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
        })
    }
}

/// The signed-in session shared by every backend request.
///
/// ID tokens expire after about an hour; a request that gets rejected asks
/// for a refresh, and the refreshed session is written back to disk.
pub struct SessionTokens {
    auth: AuthClient,
    store: SessionStore,
    session: Mutex<Session>,
}

impl SessionTokens {
    pub fn new(auth: AuthClient, store: SessionStore, session: Session) -> Self {
        Self {
            auth,
            store,
            session: Mutex::new(session),
        }
    }

    pub async fn id_token(&self) -> String {
        self.session.lock().await.id_token.clone()
    }

    /// Replace `rejected` with a fresh ID token. Concurrent callers holding
    /// the same rejected token share one refresh.
    pub async fn refresh(&self, rejected: &str) -> Result<String, SyncError> {
        let mut session = self.session.lock().await;
        if session.id_token != rejected {
            return Ok(session.id_token.clone());
        }
        let refreshed = self.auth.refresh(&session).await?;
        if let Err(err) = self.store.save(&refreshed) {
            log::warn!("Failed to save refreshed session: {err}");
        }
        *session = refreshed;
        Ok(session.id_token.clone())
    }
}

/// Session after a token refresh. The provider does not echo the email.
fn refreshed_session(previous: &Session, body: Value) -> Result<Session, SyncError> {
    let parsed: RefreshResponse =
        serde_json::from_value(body).map_err(|e| SyncError::Auth(e.to_string()))?;
    Ok(Session {
        email: previous.email.clone(),
        user_id: parsed.user_id,
        id_token: parsed.id_token,
        refresh_token: parsed.refresh_token,
    })
}

/// Checks done before contacting the provider.
pub fn validate_sign_up(email: &str, password: &str, confirm_password: &str) -> Result<(), SyncError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(SyncError::Validation(
            "Email and password must not be empty".to_string(),
        ));
    }
    if password != confirm_password {
        return Err(SyncError::Validation("Passwords don't match!".to_string()));
    }
    Ok(())
}

/// The provider reports failures as `{"error": {"message": "EMAIL_EXISTS"}}`.
fn provider_message(body: &Value, status: u16) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
