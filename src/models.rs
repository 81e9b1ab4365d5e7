//! Domain types shared by the chat-sync core
//!
//! These mirror the payloads exchanged with the advising backend over both
//! the REST surface and the realtime channel. Field names follow the
//! backend's JSON (`snake_case` for entities, `camelCase` for realtime
//! payloads).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend-assigned user identity.
pub type UserId = i64;

/// Backend-assigned message identity.
pub type MessageId = i64;

/// Backend-assigned conversation container identity.
pub type ChatBoxId = i64;

/// Role tag carried by every user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Advisor,
    Student,
}

impl Role {
    /// The role a user of this role converses with, if any.
    ///
    /// Advisors talk to students and students talk to advisors. Admins have
    /// no chat counterparts.
    pub fn counterpart_role(self) -> Option<Role> {
        match self {
            Role::Advisor => Some(Role::Student),
            Role::Student => Some(Role::Advisor),
            Role::Admin => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Advisor => "advisor",
            Role::Student => "student",
        };
        f.write_str(s)
    }
}

/// Sender or receiver embedded in a [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

/// A single chat message.
///
/// `id` and `created_at` never change once the backend assigns them, and
/// `is_read` only ever moves from `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender: Participant,
    /// Absent for container-addressed messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Participant>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_box_id: Option<ChatBoxId>,
}

impl Message {
    /// Whether `user` authored this message.
    pub fn is_from(&self, user: UserId) -> bool {
        self.sender.user_id == user
    }

    /// Receiver identity, when the message is addressed to a user.
    pub fn receiver_id(&self) -> Option<UserId> {
        self.receiver.as_ref().map(|r| r.user_id)
    }
}

/// User projection used for counterparts and for the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Enrollment code; used to tell apart students sharing a name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl User {
    /// Label shown in contact lists: the name, followed by the student code
    /// when one is known.
    pub fn display_label(&self) -> String {
        match self.student_code.as_deref() {
            Some(code) if !code.is_empty() => format!("{} ({})", self.username, code),
            _ => self.username.clone(),
        }
    }
}

/// Persistent conversation container for one student–advisor pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatBox {
    pub id: ChatBoxId,
    pub student_id: UserId,
    pub advisor_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor: Option<Participant>,
    pub created_at: DateTime<Utc>,
}

impl ChatBox {
    /// Whether `user` is one of the two participants.
    pub fn involves(&self, user: UserId) -> bool {
        self.student_id == user || self.advisor_id == user
    }

    /// The participant opposite `me`, or `None` when `me` is not in the box.
    pub fn partner_of(&self, me: UserId) -> Option<UserId> {
        if self.student_id == me {
            Some(self.advisor_id)
        } else if self.advisor_id == me {
            Some(self.student_id)
        } else {
            None
        }
    }

    /// Display name of the participant opposite `me`.
    pub fn partner_label(&self, me: UserId) -> String {
        let partner = if self.student_id == me {
            self.advisor.as_ref()
        } else {
            self.student.as_ref()
        };
        match partner {
            Some(p) => p.username.clone(),
            None => format!("user #{}", self.partner_of(me).unwrap_or_default()),
        }
    }
}

/// Payload of the realtime `messageRead` event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub read_by: UserId,
}

/// How a conversation is addressed.
///
/// Direct conversations are keyed by the counterpart; container
/// conversations by the chat box. Both resolve to the same fetch and send
/// calls on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationTarget {
    Direct(UserId),
    Container(ChatBoxId),
}

impl ConversationTarget {
    /// Whether `message` belongs to this conversation as seen by `me`.
    pub fn includes(&self, message: &Message, me: UserId) -> bool {
        match *self {
            ConversationTarget::Direct(counterpart) => {
                let inbound = message.sender.user_id == counterpart
                    && message.receiver_id().map_or(true, |r| r == me);
                let outbound =
                    message.sender.user_id == me && message.receiver_id() == Some(counterpart);
                inbound || outbound
            }
            ConversationTarget::Container(box_id) => message.chat_box_id == Some(box_id),
        }
    }
}

impl std::fmt::Display for ConversationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationTarget::Direct(id) => write!(f, "user:{}", id),
            ConversationTarget::Container(id) => write!(f, "box:{}", id),
        }
    }
}

impl std::str::FromStr for ConversationTarget {
    type Err = String;

    /// Parse `user:<id>` or `box:<id>`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected user:<id> or box:<id>, got '{}'", s))?;
        let id: i64 = id
            .trim()
            .parse()
            .map_err(|_| format!("invalid id in '{}'", s))?;
        match kind.trim() {
            "user" => Ok(ConversationTarget::Direct(id)),
            "box" => Ok(ConversationTarget::Container(id)),
            other => Err(format!("unknown conversation kind '{}'", other)),
        }
    }
}

/// Login request body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub student_code: String,
    pub password: String,
}

/// Login response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: User,
}
