use crate::common::models::RoomId;
use crate::common::stomp::HeartBeat;
use log::info;
use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_WS_PATH: &str = "/ws-chat";
pub const SEND_DESTINATION: &str = "/app/chat/sendMessage";
const ROOM_TOPIC_PREFIX: &str = "/topic/room/";

pub fn room_topic(room_id: RoomId) -> String {
    format!("{}{}", ROOM_TOPIC_PREFIX, room_id)
}

/// What happens to the store right after a successful send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// The message shows up only once the server echoes it back
    #[default]
    WaitForEcho,
    /// A pending local copy is shown and replaced by the echo
    Optimistic,
}

/// How the history fetched on connect is merged with live events that
/// arrived while the fetch was in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMerge {
    /// Live events are held back, then re-appended on top of the history
    #[default]
    BufferLive,
    /// History overwrites the store, dropping anything appended before it
    Replace,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_base_url: String,
    pub ws_path: String,
    /// The server registers the endpoint with SockJS, so the raw WebSocket
    /// lives under `<path>/websocket`
    pub sockjs: bool,
    pub reconnect_delay: Duration,
    pub heart_beat: HeartBeat,
    pub echo_policy: EchoPolicy,
    pub history_merge: HistoryMerge,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            sockjs: true,
            reconnect_delay: Duration::from_secs(5),
            heart_beat: HeartBeat::new(Duration::from_secs(10), Duration::from_secs(10)),
            echo_policy: EchoPolicy::default(),
            history_merge: HistoryMerge::default(),
        }
    }
}

impl ChatConfig {
    /// Loads `.env` (if any) and reads the process environment
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn log_summary(&self) {
        info!("Chat configuration loaded:");
        info!("  API base url: {}", self.api_base_url);
        info!("  WebSocket path: {} (sockjs: {})", self.ws_path, self.sockjs);
        info!("  Reconnect delay: {:?}", self.reconnect_delay);
        info!("  Heart-beat: {}", self.heart_beat.header_value());
        info!("  Echo policy: {:?}, history merge: {:?}", self.echo_policy, self.history_merge);
    }

    /// Builds the config from an arbitrary key lookup; unset or invalid
    /// values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        Self {
            api_base_url: lookup("API_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.api_base_url),
            ws_path: lookup("CHAT_WS_PATH")
                .filter(|v| v.starts_with('/'))
                .unwrap_or(defaults.ws_path),
            sockjs: lookup("CHAT_WS_SOCKJS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.sockjs),
            reconnect_delay: millis("CHAT_RECONNECT_DELAY_MS", defaults.reconnect_delay),
            heart_beat: HeartBeat::new(
                millis("CHAT_HEARTBEAT_OUT_MS", defaults.heart_beat.outgoing),
                millis("CHAT_HEARTBEAT_IN_MS", defaults.heart_beat.incoming),
            ),
            echo_policy: match lookup("CHAT_ECHO_POLICY").as_deref() {
                Some("optimistic") => EchoPolicy::Optimistic,
                _ => defaults.echo_policy,
            },
            history_merge: match lookup("CHAT_HISTORY_MERGE").as_deref() {
                Some("replace") => HistoryMerge::Replace,
                _ => defaults.history_merge,
            },
        }
    }

    /// `http(s)://host/base` becomes `ws(s)://host/base/ws-chat[/websocket]`
    pub fn websocket_url(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.api_base_url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => anyhow::bail!("unsupported api scheme: {}", other),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("cannot switch {} to {}", self.api_base_url, scheme))?;

        let mut path = url.path().trim_end_matches('/').to_string();
        path.push_str(&self.ws_path);
        if self.sockjs {
            path.push_str("/websocket");
        }
        url.set_path(&path);
        Ok(url)
    }
}
