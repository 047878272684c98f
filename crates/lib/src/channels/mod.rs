//! Chat channels (DingTalk robot).
//!
//! Decoding of relayed stream events, reply delivery through session webhooks, and the
//! acknowledgement frame that stops the transport from redelivering an event.

mod dingtalk;
mod inbound;
mod transport;

pub use dingtalk::{
    AckFrame, AckHeaders, AckSlot, DingTalkChannel, DingTalkError, MarkdownBody, ReplyAt, ReplyMessage,
    RobotMessage, RobotText, StreamEvent, StreamHeaders, DEFAULT_DINGTALK_API_BASE,
};
pub use inbound::InboundChatEvent;
pub use transport::{Acknowledge, ChatTransport};
