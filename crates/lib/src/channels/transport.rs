//! Seams between the command router and the chat transport.

use async_trait::async_trait;

use crate::channels::dingtalk::{DingTalkError, ReplyMessage};

/// Outbound side of a chat transport: robot access token and reply delivery.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Channel id (e.g. "dingtalk").
    fn id(&self) -> &str;
    /// Access token for one outbound reply.
    async fn access_token(&self) -> Result<String, DingTalkError>;
    /// POST a reply to the event's session webhook; returns the webhook's JSON response.
    async fn send_reply(
        &self,
        webhook: &str,
        access_token: &str,
        reply: &ReplyMessage,
    ) -> Result<serde_json::Value, DingTalkError>;
}

/// Delivery acknowledgement. Without it the transport redelivers the event after 60 seconds.
pub trait Acknowledge: Send + Sync {
    fn acknowledge(&self, message_id: &str, payload: serde_json::Value);
}
