//! Auth service sign-in and access-token management.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{
    ApiError, ApiResult, error_message,
    session_store::{FileSessionStore, Session},
};

/// Tokens are refreshed when they expire within this margin.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Source of bearer tokens for the reports API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid access token.
    async fn access_token(&self) -> ApiResult<String>;
}

/// Fixed token, for tests and scripted use.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> ApiResult<String> {
        Ok(self.0.clone())
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResp {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    expires_at: Option<i64>,
}

impl TokenResp {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in.unwrap_or(3600)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// Signs in against the auth service and keeps the session fresh.
pub struct AuthClient {
    http: Client,
    url: String,
    anon_key: String,
    email: String,
    store: FileSessionStore,
    cached: Mutex<Option<Session>>,
}

impl AuthClient {
    pub fn new(
        http: Client,
        url: &str,
        anon_key: &str,
        email: &str,
        store: FileSessionStore,
    ) -> Self {
        Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            email: email.trim().to_string(),
            store,
            cached: Mutex::new(None),
        }
    }

    /// Account this client signs in as.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Whether a session is cached in memory or on disk.
    pub async fn has_session(&self) -> bool {
        if self.cached.lock().await.is_some() {
            return true;
        }
        self.store.get(&self.url, &self.email).await.is_some()
    }

    /// Call the token endpoint with the given grant.
    async fn token_request(&self, grant: &str, body: serde_json::Value) -> ApiResult<Session> {
        let url = format!("{}/auth/v1/token?grant_type={}", self.url, grant);
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::AuthFailed(error_message(status.as_u16(), &text)));
        }
        let token = resp
            .json::<TokenResp>()
            .await
            .map_err(|e| ApiError::Parse(format!("token response: {e}")))?;
        Ok(token.into_session())
    }

    /// Sign in with email and password; the session is persisted.
    pub async fn sign_in(&self, password: &str) -> ApiResult<()> {
        if self.email.is_empty() {
            return Err(ApiError::AuthFailed("account email is not set".into()));
        }
        let session = self
            .token_request(
                "password",
                serde_json::json!({ "email": self.email, "password": password }),
            )
            .await?;
        tracing::info!("signed in as {}", self.email);
        self.store
            .set(&self.url, &self.email, session.clone())
            .await?;
        *self.cached.lock().await = Some(session);
        Ok(())
    }

    /// Drop the session from memory and disk.
    pub async fn sign_out(&self) -> ApiResult<()> {
        *self.cached.lock().await = None;
        self.store.remove(&self.url, &self.email).await
    }
}

#[async_trait]
impl TokenSource for AuthClient {
    async fn access_token(&self) -> ApiResult<String> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = self.store.get(&self.url, &self.email).await;
        }
        let Some(session) = cached.clone() else {
            return Err(ApiError::AuthRequired);
        };
        if !session.expires_within(Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(session.access_token);
        }

        tracing::info!("access token expiring, refreshing");
        let fresh = match self
            .token_request(
                "refresh_token",
                serde_json::json!({ "refresh_token": session.refresh_token }),
            )
            .await
        {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("token refresh failed: {e}");
                *cached = None;
                return Err(ApiError::AuthRequired);
            }
        };
        self.store
            .set(&self.url, &self.email, fresh.clone())
            .await?;
        let token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
