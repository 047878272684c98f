//! Inbound chat event: one decoded robot message, handled once and acknowledged once.

/// A command message from the robot, with what is needed to reply and acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundChatEvent {
    pub command_text: String,
    pub sender_id: Option<String>,
    /// Session webhook the reply is POSTed to.
    pub reply_channel: String,
    /// Stream message id; the acknowledgement must reference it.
    pub correlation_id: String,
}
