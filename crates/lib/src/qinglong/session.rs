//! Bearer-token session for the QingLong open API: login, expiry tracking, and refresh.

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::client::{ensure_success, read_envelope};
use super::error::QingLongError;

/// A token is refreshed this many milliseconds before it actually expires.
pub const STALENESS_SKEW_MS: i64 = 5_000;

const LOGIN_PATH: &str = "/open/auth/token";

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// QingLong panel URL and open-API application credentials. Immutable once built.
#[derive(Clone)]
pub struct Credentials {
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Bearer token and the epoch millisecond at which the panel stops accepting it.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub expires_at_millis: i64,
}

impl Session {
    /// Stale once `now` is within the skew of the expiry.
    pub fn is_stale(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at_millis - STALENESS_SKEW_MS
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at_millis", &self.expires_at_millis)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    token: String,
    /// Lifetime in seconds.
    expiration: i64,
}

/// Owns the login lifecycle. At most one login is in flight; callers that find the
/// session stale while a login is running wait for it and reuse its token.
pub struct SessionManager {
    credentials: Credentials,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<Session>>,
    refresh: Mutex<()>,
}

impl SessionManager {
    pub fn new(credentials: Credentials, http: reqwest::Client) -> Self {
        Self::with_clock(credentials, http, Arc::new(SystemClock))
    }

    pub fn with_clock(
        credentials: Credentials,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            http,
            clock,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Snapshot of the stored session, stale or not.
    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    async fn fresh_token(&self) -> Option<String> {
        let now = self.clock.now_millis();
        self.current
            .read()
            .await
            .as_ref()
            .filter(|s| !s.is_stale(now))
            .map(|s| s.token.clone())
    }

    /// Return a token that is not stale, logging in first when needed.
    pub async fn ensure_valid_session(&self) -> Result<String, QingLongError> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }
        let _guard = self.refresh.lock().await;
        // Another caller may have logged in while we waited for the guard.
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }
        let session = self.login().await?;
        Ok(session.token)
    }

    /// GET /open/auth/token — exchange client credentials for a bearer token.
    /// On failure the previously stored session is left as is.
    pub async fn login(&self) -> Result<Session, QingLongError> {
        let url = format!("{}{}", self.credentials.base_url, LOGIN_PATH);
        let res = self
            .http
            .get(&url)
            .query(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()
            .await?;
        let envelope = read_envelope(res).await?;
        let data = ensure_success(envelope).map_err(|e| match e {
            QingLongError::Api(message) => QingLongError::Authentication(message),
            other => other,
        })?;
        let Some(data) = data else {
            return Err(QingLongError::Authentication(
                "login response carried no token".to_string(),
            ));
        };
        let result: LoginResult = serde_json::from_value(data)?;

        let session = Session {
            token: result.token,
            expires_at_millis: self.clock.now_millis() + result.expiration * 1000,
        };
        log::info!(
            "refreshed qinglong token, valid until {}",
            format_expiry(session.expires_at_millis)
        );
        *self.current.write().await = Some(session.clone());
        Ok(session)
    }
}

fn format_expiry(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&chrono::Local).to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
