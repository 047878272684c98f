//! QingLong environment-variable API (`/open/envs`).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::QingLongError;
use super::session::{Clock, Credentials, SessionManager};

const ENVS_PATH: &str = "/open/envs";
const SUCCESS_CODE: i64 = 200;
const DEFAULT_ERROR_MESSAGE: &str = "unknown error occurred";

/// Client for the QingLong open API. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct QingLongClient {
    session: Arc<SessionManager>,
}

/// Remote id of an environment variable. Newer panels send a number, older ones a string `_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvId {
    Number(i64),
    Text(String),
}

/// One environment variable as listed by the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    #[serde(alias = "_id")]
    pub id: EnvId,
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Serialize)]
struct UpdateEnvRequest<'a> {
    id: &'a EnvId,
    name: &'a str,
    value: &'a str,
}

/// Uniform response wrapper: `{code, message?, data}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Status >= 500 is a transport failure; anything else is decoded as an envelope.
pub(crate) async fn read_envelope(res: reqwest::Response) -> Result<Envelope, QingLongError> {
    let status = res.status();
    if status.is_server_error() {
        let body = res.text().await.unwrap_or_default();
        return Err(QingLongError::Server { status, body });
    }
    Ok(res.json().await?)
}

/// The single check every response goes through: code 200 yields the payload, anything else fails.
pub(crate) fn ensure_success(envelope: Envelope) -> Result<Option<serde_json::Value>, QingLongError> {
    if envelope.code != SUCCESS_CODE {
        let message = envelope
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
        return Err(QingLongError::Api(message));
    }
    Ok(envelope.data)
}

impl QingLongClient {
    pub fn new(credentials: Credentials) -> Self {
        Self::from_session(SessionManager::new(credentials, reqwest::Client::new()))
    }

    /// Same as `new` with an injected clock (tests drive token expiry through it).
    pub fn with_clock(credentials: Credentials, clock: Arc<dyn Clock>) -> Self {
        Self::from_session(SessionManager::with_clock(
            credentials,
            reqwest::Client::new(),
            clock,
        ))
    }

    pub fn from_session(session: SessionManager) -> Self {
        Self {
            session: Arc::new(session),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    fn envs_url(&self) -> String {
        format!("{}{}", self.session.credentials().base_url(), ENVS_PATH)
    }

    /// GET /open/envs — all environment variables, in panel order.
    pub async fn list_environment_variables(
        &self,
    ) -> Result<Vec<EnvironmentVariable>, QingLongError> {
        let token = self.session.ensure_valid_session().await?;
        self.fetch_envs(&token).await
    }

    /// Names of all environment variables, for display.
    pub async fn list_environment_variable_names(&self) -> Result<Vec<String>, QingLongError> {
        let envs = self.list_environment_variables().await?;
        Ok(envs.into_iter().map(|e| e.name).collect())
    }

    /// Set the value of the variable named `key` (exact match; the first one wins on duplicates).
    /// The list is fetched fresh so the update targets the current remote id.
    pub async fn update_environment_variable(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(), QingLongError> {
        if key.is_empty() || value.is_empty() {
            return Err(QingLongError::BadRequest(
                "malformed update message, expected key=value".to_string(),
            ));
        }

        let token = self.session.ensure_valid_session().await?;
        let envs = self.fetch_envs(&token).await?;
        let Some(target) = envs.iter().find(|e| e.name == key) else {
            return Err(QingLongError::EnvNotFound(key.to_string()));
        };

        let body = UpdateEnvRequest {
            id: &target.id,
            name: &target.name,
            value,
        };
        let res = self
            .session
            .http()
            .put(self.envs_url())
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        ensure_success(read_envelope(res).await?)?;
        log::info!("updated qinglong environment variable {}", key);
        Ok(())
    }

    async fn fetch_envs(&self, token: &str) -> Result<Vec<EnvironmentVariable>, QingLongError> {
        let res = self
            .session
            .http()
            .get(self.envs_url())
            .bearer_auth(token)
            .send()
            .await?;
        let data = ensure_success(read_envelope(res).await?)?;
        match data {
            Some(value) if !value.is_null() => Ok(serde_json::from_value(value)?),
            _ => Ok(Vec::new()),
        }
    }
}
