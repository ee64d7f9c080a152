use crate::client::services::api_client::ChatApi;
use crate::common::models::{ChatRoom, RoomId};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;

/// The room the logged-in user currently belongs to, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomBinding {
    pub room: Option<ChatRoom>,
    pub is_recruiting: bool,
}

impl RoomBinding {
    pub fn room_id(&self) -> Option<RoomId> {
        self.room.as_ref().map(|r| r.id)
    }
}

/// Resolves "my room" and publishes it. Its watch channel is what drives
/// the connection manager.
pub struct SessionBinder {
    api: Arc<dyn ChatApi>,
    binding: watch::Sender<RoomBinding>,
}

impl SessionBinder {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        let (binding, _) = watch::channel(RoomBinding::default());
        Self { api, binding }
    }

    /// Queries the backend once. A missing room and a failed query both end
    /// up as "no room". Can be called again to refresh.
    pub async fn resolve_my_room(&self) -> Option<RoomId> {
        let binding = match self.api.my_room().await {
            Ok(Some(room)) => {
                info!("[CHAT:BINDER] Current room {} ({})", room.id, room.name);
                RoomBinding { is_recruiting: room.is_recruiting(), room: Some(room) }
            }
            Ok(None) => {
                info!("[CHAT:BINDER] No active room");
                RoomBinding::default()
            }
            Err(e) => {
                warn!("[CHAT:BINDER] Could not resolve current room: {}", e);
                RoomBinding::default()
            }
        };
        let room_id = binding.room_id();
        self.publish(binding);
        room_id
    }

    /// Unbinds without asking the backend, e.g. on logout
    pub fn clear(&self) {
        self.publish(RoomBinding::default());
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.binding.borrow().room_id()
    }

    pub fn binding(&self) -> RoomBinding {
        self.binding.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RoomBinding> {
        self.binding.subscribe()
    }

    fn publish(&self, binding: RoomBinding) {
        self.binding.send_if_modified(|current| {
            if *current == binding {
                false
            } else {
                *current = binding;
                true
            }
        });
    }
}
