pub mod config;
pub mod services;
pub mod session;
pub mod utils;
pub mod views;

pub use config::{ChatConfig, EchoPolicy, HistoryMerge};
pub use services::api_client::{ApiError, ChatApi, HttpChatApi};
pub use services::chat_session::ChatSession;
pub use services::connection_manager::{ConnectionManager, ConnectionState, ConnectionStatus, SendError};
pub use services::message_store::{AppendOutcome, MessageStore};
pub use services::room_binder::{RoomBinding, SessionBinder};
pub use services::transport::{Connector, Link, TransportError, WsConnector};
pub use session::SessionContext;
