use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type RoomId = i64;
pub type UserId = i64;

/// A matching conversation tied to one housing listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: RoomId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub max_member_count: u32,
    #[serde(default)]
    pub current_user_count: u32,
}

impl ChatRoom {
    /// A room keeps recruiting while it still has free slots
    pub fn is_recruiting(&self) -> bool {
        self.current_user_count < self.max_member_count
    }
}

/// Identity of the logged-in user as returned by `GET /auth`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_host: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Text,
    Image,
}

// The backend is not consistent about the casing of this enum.
impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_uppercase().as_str() {
            "TEXT" => Ok(MessageType::Text),
            "IMAGE" => Ok(MessageType::Image),
            _ => Err(de::Error::unknown_variant(&raw, &["TEXT", "IMAGE"])),
        }
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message has an empty id")]
    EmptyId,
    #[error("message {0} has no sender")]
    MissingSender(String),
    #[error("image message {0} has no imageUrl")]
    MissingImageUrl(String),
    #[error("invalid message json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Message shape as it travels on the wire, both over REST and STOMP.
/// Only used at the boundary; the rest of the crate works with [`ChatMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(deserialize_with = "string_or_scalar")]
    pub id: String,
    pub room_id: RoomId,
    #[serde(default)]
    pub sender: Option<UserId>,
    #[serde(default)]
    pub sender_username: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "string_or_scalar")]
    pub timestamp: String,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_system: Option<bool>,
}

/// Ids show up both as strings and numbers, and Java date-times as arrays.
/// Anything that is not a JSON string is kept as its JSON text.
fn string_or_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text { text: String },
    Image { url: String, caption: Option<String> },
    System { text: String },
}

/// A validated chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: RoomId,
    /// System notices may come without a sender; they carry 0
    pub sender: UserId,
    pub sender_username: String,
    /// Server-assigned, kept opaque
    pub timestamp: String,
    pub body: MessageBody,
}

impl ChatMessage {
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let wire: WireMessage = serde_json::from_str(json)?;
        Self::try_from(wire)
    }

    pub fn is_system(&self) -> bool {
        matches!(self.body, MessageBody::System { .. })
    }

    /// Text shown in the list; images fall back to their caption
    pub fn text(&self) -> &str {
        match &self.body {
            MessageBody::Text { text } | MessageBody::System { text } => text,
            MessageBody::Image { caption, .. } => caption.as_deref().unwrap_or(""),
        }
    }
}

impl TryFrom<WireMessage> for ChatMessage {
    type Error = MessageError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let id = wire.id.trim().to_string();
        if id.is_empty() {
            return Err(MessageError::EmptyId);
        }

        let body = if wire.is_system.unwrap_or(false) {
            MessageBody::System { text: wire.message }
        } else if wire.message_type == Some(MessageType::Image) {
            let url = wire
                .image_url
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| MessageError::MissingImageUrl(id.clone()))?;
            let caption = Some(wire.message).filter(|m| !m.is_empty());
            MessageBody::Image { url, caption }
        } else {
            MessageBody::Text { text: wire.message }
        };

        let sender = match (wire.sender, &body) {
            (Some(sender), _) => sender,
            (None, MessageBody::System { .. }) => 0,
            (None, _) => return Err(MessageError::MissingSender(id)),
        };

        Ok(ChatMessage {
            id,
            room_id: wire.room_id,
            sender,
            sender_username: wire.sender_username,
            timestamp: wire.timestamp,
            body,
        })
    }
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        let (message, message_type, image_url, is_system) = match &msg.body {
            MessageBody::Text { text } => (text.clone(), MessageType::Text, None, None),
            MessageBody::Image { url, caption } => (
                caption.clone().unwrap_or_default(),
                MessageType::Image,
                Some(url.clone()),
                None,
            ),
            MessageBody::System { text } => (text.clone(), MessageType::Text, None, Some(true)),
        };
        WireMessage {
            id: msg.id.clone(),
            room_id: msg.room_id,
            sender: Some(msg.sender),
            sender_username: msg.sender_username.clone(),
            message,
            timestamp: msg.timestamp.clone(),
            message_type: Some(message_type),
            image_url,
            is_system,
        }
    }
}

/// Payload published to `/app/chat/sendMessage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundChatRequest {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub message: String,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl OutboundChatRequest {
    pub fn text(room_id: RoomId, sender_id: UserId, message: impl Into<String>) -> Self {
        Self {
            room_id,
            sender_id,
            message: message.into(),
            message_type: MessageType::Text,
            image_url: None,
        }
    }
}
