use crate::client::session::SessionContext;
use crate::common::models::{ChatMessage, ChatRoom, CurrentUser, MessageError, RoomId, WireMessage};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {path}")]
    Status { status: u16, path: String },
    #[error("response from {path} has no data")]
    MissingData { path: String },
    #[error("malformed response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Common `{ success, data, message }` wrapper of the backend responses
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// The REST calls the chat subsystem depends on
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /chat/rooms/my`; `None` when the user has no active room
    async fn my_room(&self) -> Result<Option<ChatRoom>, ApiError>;

    /// `GET /chat/rooms/history/{roomId}`, server order
    async fn room_history(&self, room_id: RoomId) -> Result<Vec<ChatMessage>, ApiError>;

    /// `GET /auth`
    async fn current_user(&self) -> Result<CurrentUser, ApiError>;
}

const MY_ROOM_PATH: &str = "/chat/rooms/my";
const AUTH_PATH: &str = "/auth";

pub struct HttpChatApi {
    base_url: String,
    bearer: Option<String>,
    client: Client,
}

impl HttpChatApi {
    pub fn new(base_url: &str, session: &SessionContext) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("roommate-chat/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer: session.bearer().map(str::to_string),
            client,
        })
    }

    /// Raw body of a successful `GET`
    async fn get(&self, path: &str) -> Result<String, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("[CHAT:API] GET {}", url);
        let mut req = self.client.get(&url);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status { status: resp.status().as_u16(), path: path.to_string() });
        }
        Ok(resp.text().await?)
    }
}

fn parse_envelope<T: DeserializeOwned>(body: &str, path: &str) -> Result<Envelope<T>, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Decode { path: path.to_string(), source })
}

/// `success: false` and a missing or null `data` both mean "no room"
fn decode_my_room(body: &str) -> Result<Option<ChatRoom>, ApiError> {
    let envelope = parse_envelope::<ChatRoom>(body, MY_ROOM_PATH)?;
    if envelope.success == Some(false) {
        debug!("[CHAT:API] my room query unsuccessful: {:?}", envelope.message);
        return Ok(None);
    }
    Ok(envelope.data)
}

/// Entries are decoded one by one so a single bad entry does not throw away
/// the whole history.
fn decode_history(room_id: RoomId, body: &str) -> Result<Vec<ChatMessage>, ApiError> {
    let path = history_path(room_id);
    let raw = parse_envelope::<Vec<serde_json::Value>>(body, &path)?.data.unwrap_or_default();
    let mut messages = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<WireMessage>(value)
            .map_err(MessageError::from)
            .and_then(ChatMessage::try_from)
        {
            Ok(msg) => messages.push(msg),
            Err(e) => warn!("[CHAT:API] dropping history entry for room {}: {}", room_id, e),
        }
    }
    Ok(messages)
}

fn decode_current_user(body: &str) -> Result<CurrentUser, ApiError> {
    parse_envelope::<CurrentUser>(body, AUTH_PATH)?
        .data
        .ok_or_else(|| ApiError::MissingData { path: AUTH_PATH.to_string() })
}

fn history_path(room_id: RoomId) -> String {
    format!("/chat/rooms/history/{}", room_id)
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn my_room(&self) -> Result<Option<ChatRoom>, ApiError> {
        decode_my_room(&self.get(MY_ROOM_PATH).await?)
    }

    async fn room_history(&self, room_id: RoomId) -> Result<Vec<ChatMessage>, ApiError> {
        decode_history(room_id, &self.get(&history_path(room_id)).await?)
    }

    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        decode_current_user(&self.get(AUTH_PATH).await?)
    }
}
