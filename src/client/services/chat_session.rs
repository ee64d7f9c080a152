use crate::client::config::ChatConfig;
use crate::client::services::api_client::ChatApi;
use crate::client::services::connection_manager::{ConnectionManager, ConnectionStatus, SendError};
use crate::client::services::room_binder::{RoomBinding, SessionBinder};
use crate::client::services::transport::Connector;
use crate::client::session::SessionContext;
use crate::client::views::message_list::{self, MessageRow};
use crate::common::models::{ChatMessage, CurrentUser, RoomId};
use log::warn;
use std::sync::Arc;
use tokio::sync::watch;

/// Owns everything the chat screen needs for its lifetime: the room binder,
/// the connection manager and, through it, the message store.
pub struct ChatSession {
    binder: SessionBinder,
    manager: ConnectionManager,
    user: Option<CurrentUser>,
}

impl ChatSession {
    /// Resolves the user and the room concurrently; the connection starts as
    /// soon as a room is bound.
    pub async fn open(
        config: &ChatConfig,
        session: SessionContext,
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let binder = SessionBinder::new(api.clone());
        let known_user = session.user.clone();
        let manager = ConnectionManager::spawn(config, session, api.clone(), connector, binder.subscribe());

        let resolve_user = async {
            if known_user.is_some() {
                return known_user;
            }
            match api.current_user().await {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("[CHAT:SESSION] Could not resolve current user: {}", e);
                    None
                }
            }
        };
        let (user, _) = tokio::join!(resolve_user, binder.resolve_my_room());
        manager.set_user(user.clone());

        Self { binder, manager, user }
    }

    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.user.as_ref()
    }

    pub fn room(&self) -> RoomBinding {
        self.binder.binding()
    }

    /// Asks the backend again, e.g. after the user joined or left a room
    pub async fn refresh_room(&self) -> Option<RoomId> {
        self.binder.resolve_my_room().await
    }

    pub async fn send_message(&self, text: &str) -> Result<(), SendError> {
        self.manager.send_message(text).await
    }

    pub fn messages(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.manager.messages()
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.manager.status()
    }

    /// Current messages projected for display
    pub fn rows(&self) -> Vec<MessageRow> {
        let me = self.user.as_ref().map(|u| u.id);
        message_list::rows(&self.manager.messages().borrow(), me)
    }

    pub async fn close(self) {
        self.binder.clear();
        self.manager.shutdown().await;
    }
}
