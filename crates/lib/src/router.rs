//! Command router: parse a robot message, run it against QingLong, reply through the
//! chat transport, and acknowledge the delivery.
//!
//! Grammar: `LIST` lists variable names; `UPDATE#key=value` sets a variable; anything else
//! gets the usage text. Every event is acknowledged exactly once, whatever happened.

use std::sync::Arc;

use crate::channels::{
    Acknowledge, ChatTransport, DingTalkError, InboundChatEvent, ReplyMessage, StreamEvent,
};
use crate::qinglong::{QingLongClient, QingLongError};

const REPLY_TITLE: &str = "Execution result";
const LIST_HEADER: &str = "Environment variables:";

/// Recognized commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    List,
    Update,
}

impl Command {
    pub const ALL: [Command; 2] = [Command::List, Command::Update];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::List => "LIST",
            Command::Update => "UPDATE",
        }
    }

    /// Case-sensitive.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    QingLong(#[from] QingLongError),
    #[error(transparent)]
    Channel(#[from] DingTalkError),
}

/// Split trimmed text on the first `#` into (command, content). Empty text yields (None, None).
pub fn parse_command(text: &str) -> (Option<&str>, Option<&str>) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return (None, None);
    }
    match trimmed.split_once('#') {
        Some((command, content)) => (Some(command), Some(content)),
        None => (Some(trimmed), None),
    }
}

/// Split `key=value` on the first `=`. A missing `=` leaves the value empty.
pub fn split_assignment(content: &str) -> (&str, &str) {
    content.split_once('=').unwrap_or((content, ""))
}

pub fn usage_text() -> String {
    let commands = Command::ALL
        .iter()
        .map(|c| format!("`{}`", c.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Unrecognized command. Available commands: {}\n\
         - `LIST`: list environment variable names\n\
         - `UPDATE#key=value`: set the value of an environment variable",
        commands
    )
}

pub fn format_variable_names(names: &[String]) -> String {
    let mut text = LIST_HEADER.to_string();
    for name in names {
        text.push('\n');
        text.push_str(name);
    }
    text
}

/// Routes inbound robot messages to QingLong and replies over the transport.
pub struct CommandRouter {
    client: QingLongClient,
    transport: Arc<dyn ChatTransport>,
}

impl CommandRouter {
    pub fn new(client: QingLongClient, transport: Arc<dyn ChatTransport>) -> Self {
        Self { client, transport }
    }

    /// Reply text for a command. Update failures become reply text; list failures are returned.
    pub async fn dispatch(&self, command_text: &str) -> Result<String, QingLongError> {
        let (command, content) = parse_command(command_text);
        match command.and_then(Command::parse) {
            Some(Command::List) => {
                let names = self.client.list_environment_variable_names().await?;
                Ok(format_variable_names(&names))
            }
            Some(Command::Update) => Ok(self.handle_update(content.unwrap_or_default()).await),
            None => Ok(usage_text()),
        }
    }

    async fn handle_update(&self, content: &str) -> String {
        let (key, value) = split_assignment(content);
        match self.client.update_environment_variable(key, value).await {
            Ok(()) => format!("Updated environment variable {}", key),
            Err(e) => {
                log::error!("updating environment variable {:?} failed: {}", key, e);
                format!("Failed to update environment variable: {}", e)
            }
        }
    }

    async fn respond(&self, event: &InboundChatEvent) -> Result<serde_json::Value, RouterError> {
        let text = self.dispatch(&event.command_text).await?;
        let access_token = self.transport.access_token().await?;
        let reply = ReplyMessage::markdown(REPLY_TITLE, text, event.sender_id.as_deref());
        let response = self
            .transport
            .send_reply(&event.reply_channel, &access_token, &reply)
            .await?;
        Ok(response)
    }

    /// Handle one event and acknowledge it with the webhook response, or `{}` when handling failed.
    pub async fn handle_event(&self, event: &InboundChatEvent, ack: &dyn Acknowledge) {
        let payload = match self.respond(event).await {
            Ok(payload) => payload,
            Err(e) => {
                log::error!(
                    "{}: handling event {} failed: {}",
                    self.transport.id(),
                    event.correlation_id,
                    e
                );
                serde_json::json!({})
            }
        };
        ack.acknowledge(&event.correlation_id, payload);
    }

    /// Decode a relayed stream frame and handle it. Undecodable frames are still acknowledged.
    pub async fn handle_stream_event(&self, event: &StreamEvent, ack: &dyn Acknowledge) {
        match event.decode() {
            Ok(inbound) => self.handle_event(&inbound, ack).await,
            Err(e) => {
                log::warn!(
                    "{}: dropping undecodable event {}: {}",
                    self.transport.id(),
                    event.headers.message_id,
                    e
                );
                ack.acknowledge(&event.headers.message_id, serde_json::json!({}));
            }
        }
    }
}
