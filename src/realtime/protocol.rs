//! Realtime wire protocol
//!
//! Frames are JSON text messages. The client emits events that carry an
//! `ack` number; the server answers each with an acknowledgement frame
//! holding the same number and either `data` or `error`. Server pushes are
//! event frames without an `ack`.
//!
//! ```text
//! client -> server  {"event":"sendMessage","ack":3,"data":{"receiverId":42,"content":"Hi"}}
//! server -> client  {"ack":3,"data":{...Message...}}
//! server -> client  {"event":"newMessage","data":{...Message...}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::{ChatBoxId, ConversationTarget, Message, MessageId, ReadReceipt, UserId};

/// Client event: send a message.
pub const SEND_MESSAGE: &str = "sendMessage";
/// Client event: acknowledge a message as read.
pub const MARK_AS_READ: &str = "markAsRead";
/// Server event: a message was delivered.
pub const NEW_MESSAGE: &str = "newMessage";
/// Server event: a message was read.
pub const MESSAGE_READ: &str = "messageRead";

/// A client-emitted event frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    #[serde(default)]
    pub data: Value,
}

/// Payload of [`SEND_MESSAGE`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SendMessagePayload {
    #[serde(rename_all = "camelCase")]
    Direct { receiver_id: UserId, content: String },
    #[serde(rename_all = "camelCase")]
    Container {
        chat_box_id: ChatBoxId,
        content: String,
    },
}

impl SendMessagePayload {
    pub fn new(target: ConversationTarget, content: &str) -> Self {
        let content = content.to_string();
        match target {
            ConversationTarget::Direct(receiver_id) => Self::Direct {
                receiver_id,
                content,
            },
            ConversationTarget::Container(chat_box_id) => Self::Container {
                chat_box_id,
                content,
            },
        }
    }
}

/// Payload of [`MARK_AS_READ`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadPayload {
    pub message_id: MessageId,
}

/// Server-pushed events the client understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    NewMessage(Message),
    MessageRead(ReadReceipt),
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Reply to a client event; `Err` holds the server's error text.
    Ack {
        ack: u64,
        outcome: std::result::Result<Value, String>,
    },
    Event(ServerEvent),
    /// Well-formed frame the client does not handle.
    Unknown(String),
}

/// Parse and classify one inbound text frame.
///
/// # Errors
///
/// Returns a serialization error when the frame is not JSON, or when a
/// known event carries a payload of the wrong shape.
pub fn parse_inbound(raw: &str) -> Result<InboundFrame> {
    let value: Value = serde_json::from_str(raw)?;

    if let Some(ack) = value.get("ack").and_then(Value::as_u64) {
        if value.get("event").is_none() {
            let outcome = match value.get("error").filter(|e| !e.is_null()) {
                Some(error) => Err(error_text(error)),
                None => Ok(value.get("data").cloned().unwrap_or(Value::Null)),
            };
            return Ok(InboundFrame::Ack { ack, outcome });
        }
    }

    let event = value.get("event").and_then(Value::as_str).unwrap_or("");
    let data = value.get("data").cloned().unwrap_or(Value::Null);
    match event {
        NEW_MESSAGE => Ok(InboundFrame::Event(ServerEvent::NewMessage(
            serde_json::from_value(data)?,
        ))),
        MESSAGE_READ => Ok(InboundFrame::Event(ServerEvent::MessageRead(
            serde_json::from_value(data)?,
        ))),
        "" => Ok(InboundFrame::Unknown("<no event>".to_string())),
        other => Ok(InboundFrame::Unknown(other.to_string())),
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
