//! DingTalk robot channel: decode relayed stream events, fetch the robot access token,
//! reply through the session webhook, and build acknowledgement frames.

use crate::channels::inbound::InboundChatEvent;
use crate::channels::transport::{Acknowledge, ChatTransport};
use crate::config::DingTalkCredentials;
use crate::qinglong::STALENESS_SKEW_MS;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::RwLock;

pub const DEFAULT_DINGTALK_API_BASE: &str = "https://api.dingtalk.com";
const ACCESS_TOKEN_PATH: &str = "/v1.0/oauth2/accessToken";
const ACCESS_TOKEN_HEADER: &str = "x-acs-dingtalk-access-token";

#[derive(Debug, thiserror::Error)]
pub enum DingTalkError {
    #[error("dingtalk request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("dingtalk api error: {0}")]
    Api(String),
    #[error("dingtalk payload malformed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Stream-mode downstream frame as delivered by the relay. `data` is a JSON string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    #[serde(default)]
    pub spec_version: Option<String>,
    #[serde(rename = "type", default)]
    pub typ: Option<String>,
    pub headers: StreamHeaders,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamHeaders {
    pub message_id: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Robot message carried in `StreamEvent::data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotMessage {
    #[serde(default)]
    pub text: Option<RobotText>,
    #[serde(default)]
    pub sender_staff_id: Option<String>,
    pub session_webhook: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub msgtype: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotText {
    #[serde(default)]
    pub content: String,
}

impl StreamEvent {
    /// Decode the robot message carried in `data`.
    pub fn decode(&self) -> Result<InboundChatEvent, DingTalkError> {
        let message: RobotMessage = serde_json::from_str(&self.data)?;
        Ok(InboundChatEvent {
            command_text: message.text.map(|t| t.content).unwrap_or_default(),
            sender_id: message.sender_staff_id.filter(|s| !s.is_empty()),
            reply_channel: message.session_webhook,
            correlation_id: self.headers.message_id.clone(),
        })
    }
}

/// Markdown reply POSTed to a session webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub msgtype: String,
    pub markdown: MarkdownBody,
    pub at: ReplyAt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownBody {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyAt {
    pub at_user_ids: Vec<String>,
}

impl ReplyMessage {
    pub fn markdown(title: impl Into<String>, text: impl Into<String>, mention: Option<&str>) -> Self {
        Self {
            msgtype: "markdown".to_string(),
            markdown: MarkdownBody {
                title: title.into(),
                text: text.into(),
            },
            at: ReplyAt {
                at_user_ids: mention.map(|m| vec![m.to_string()]).unwrap_or_default(),
            },
        }
    }
}

/// Stream-mode callback response that closes a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckFrame {
    pub code: u16,
    pub headers: AckHeaders,
    pub message: String,
    /// Payload serialized as a JSON string.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckHeaders {
    pub content_type: String,
    pub message_id: String,
}

impl AckFrame {
    pub fn new(message_id: &str, payload: &serde_json::Value) -> Self {
        Self {
            code: 200,
            headers: AckHeaders {
                content_type: "application/json".to_string(),
                message_id: message_id.to_string(),
            },
            message: "OK".to_string(),
            data: payload.to_string(),
        }
    }
}

/// Holds the acknowledgement for one relayed request until the handler answers with it.
#[derive(Debug, Default)]
pub struct AckSlot {
    inner: Mutex<Option<AckFrame>>,
}

impl AckSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<AckFrame> {
        self.inner.lock().ok().and_then(|mut g| g.take())
    }
}

impl Acknowledge for AckSlot {
    fn acknowledge(&self, message_id: &str, payload: serde_json::Value) {
        if let Ok(mut g) = self.inner.lock() {
            if g.is_some() {
                log::warn!("dingtalk: event {} acknowledged twice", message_id);
            }
            *g = Some(AckFrame::new(message_id, &payload));
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenResponse {
    access_token: String,
    /// Lifetime in seconds.
    expire_in: i64,
}

struct CachedToken {
    token: String,
    expires_at_millis: i64,
}

/// DingTalk robot connector: token cache plus webhook replies.
pub struct DingTalkChannel {
    id: String,
    credentials: DingTalkCredentials,
    api_base: String,
    client: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
}

impl DingTalkChannel {
    pub fn new(credentials: DingTalkCredentials, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_DINGTALK_API_BASE.to_string());
        Self {
            id: "dingtalk".to_string(),
            credentials,
            api_base,
            client: reqwest::Client::new(),
            token: RwLock::new(None),
        }
    }

    async fn cached_token(&self) -> Option<String> {
        let now = chrono::Utc::now().timestamp_millis();
        self.token
            .read()
            .await
            .as_ref()
            .filter(|t| now < t.expires_at_millis - STALENESS_SKEW_MS)
            .map(|t| t.token.clone())
    }

    /// POST /v1.0/oauth2/accessToken — robot app token, cached until shortly before expiry.
    pub async fn get_access_token(&self) -> Result<String, DingTalkError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }
        let url = format!("{}{}", self.api_base, ACCESS_TOKEN_PATH);
        let body = serde_json::json!({
            "appKey": self.credentials.client_id,
            "appSecret": self.credentials.client_secret,
        });
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DingTalkError::Api(format!(
                "accessToken failed: {} {}",
                status, body
            )));
        }
        let data: AccessTokenResponse = res.json().await?;
        let expires_at_millis = chrono::Utc::now().timestamp_millis() + data.expire_in * 1000;
        *self.token.write().await = Some(CachedToken {
            token: data.access_token.clone(),
            expires_at_millis,
        });
        log::debug!("dingtalk: refreshed robot access token");
        Ok(data.access_token)
    }

    /// POST the reply to the session webhook.
    pub async fn post_reply(
        &self,
        webhook: &str,
        access_token: &str,
        reply: &ReplyMessage,
    ) -> Result<serde_json::Value, DingTalkError> {
        let res = self
            .client
            .post(webhook)
            .header(ACCESS_TOKEN_HEADER, access_token)
            .json(reply)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DingTalkError::Api(format!(
                "session webhook failed: {} {}",
                status, body
            )));
        }
        let text = res.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ChatTransport for DingTalkChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn access_token(&self) -> Result<String, DingTalkError> {
        self.get_access_token().await
    }

    async fn send_reply(
        &self,
        webhook: &str,
        access_token: &str,
        reply: &ReplyMessage,
    ) -> Result<serde_json::Value, DingTalkError> {
        self.post_reply(webhook, access_token, reply).await
    }
}
