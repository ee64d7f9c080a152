use crate::common::models::{ChatMessage, MessageBody, UserId};
use chrono::{DateTime, Local, NaiveDateTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    Own,
    Other { name: String },
    /// Matching-status announcements and other server notices
    System,
}

/// One line of the message list, ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: String,
    pub author: Author,
    pub text: String,
    pub image_url: Option<String>,
    pub time: String,
}

impl MessageRow {
    pub fn project(msg: &ChatMessage, me: Option<UserId>) -> Self {
        let author = if msg.is_system() {
            Author::System
        } else if Some(msg.sender) == me {
            Author::Own
        } else {
            Author::Other { name: msg.sender_username.clone() }
        };
        let image_url = match &msg.body {
            MessageBody::Image { url, .. } => Some(url.clone()),
            _ => None,
        };
        Self {
            id: msg.id.clone(),
            author,
            text: msg.text().to_string(),
            image_url,
            time: format_timestamp(&msg.timestamp),
        }
    }

    /// Plain-text rendering for the console
    pub fn line(&self) -> String {
        let text = match &self.image_url {
            Some(url) if self.text.is_empty() => format!("[image] {}", url),
            Some(url) => format!("{} [image] {}", self.text, url),
            None => self.text.clone(),
        };
        match &self.author {
            Author::System => format!("*** {} ***", text),
            Author::Own => format!("[{}] me: {}", self.time, text),
            Author::Other { name } => format!("[{}] {}: {}", self.time, name, text),
        }
    }
}

pub fn rows(messages: &[ChatMessage], me: Option<UserId>) -> Vec<MessageRow> {
    messages.iter().map(|m| MessageRow::project(m, me)).collect()
}

/// `HH:MM` for the timestamp formats the backend uses, the raw text otherwise.
/// Offset-less timestamps are shown as sent.
pub fn format_timestamp(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Local).format("%H:%M").to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.format("%H:%M").to_string();
    }
    raw.to_string()
}
