use crate::client::config::{ChatConfig, EchoPolicy, HistoryMerge, SEND_DESTINATION};
use crate::client::services::api_client::{ApiError, ChatApi};
use crate::client::services::connection_handle::{
    ConnectionHandle, Generation, HandleSettings, LinkEvent, Tag,
};
use crate::client::services::message_store::{AppendOutcome, MessageStore};
use crate::client::services::room_binder::RoomBinding;
use crate::client::services::transport::Connector;
use crate::client::session::SessionContext;
use crate::common::models::{ChatMessage, CurrentUser, MessageBody, OutboundChatRequest, RoomId};
use crate::common::stomp::Frame;
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Last thing heard from the server was an ERROR frame
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub room_id: Option<RoomId>,
    pub state: ConnectionState,
}

/// Reasons a send is refused before anything is published
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("room or user info unavailable")]
    RoomOrUserUnavailable,
    #[error("not connected to server")]
    NotConnected,
    #[error("could not encode message: {0}")]
    Encode(String),
    #[error("chat session closed")]
    Closed,
}

enum ManagerCommand {
    SetUser(Option<CurrentUser>),
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    Shutdown,
}

/// Keeps exactly one live connection for the bound room and the message
/// store in sync with it.
///
/// All state lives in one task; this struct is the handle to talk to it.
/// Dropping it tears the connection down as well.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<ManagerCommand>,
    status: watch::Receiver<ConnectionStatus>,
    messages: watch::Receiver<Vec<ChatMessage>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn spawn(
        config: &ChatConfig,
        session: SessionContext,
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn Connector>,
        rooms: watch::Receiver<RoomBinding>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let (messages_tx, messages_rx) = watch::channel(Vec::new());
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (history_tx, history_rx) = mpsc::unbounded_channel();

        let actor = Actor {
            settings: HandleSettings {
                heart_beat: config.heart_beat,
                reconnect_delay: config.reconnect_delay,
                bearer: session.bearer().map(str::to_string),
            },
            session,
            api,
            connector,
            echo_policy: config.echo_policy,
            history_merge: config.history_merge,
            room_id: None,
            generation: 0,
            handle: None,
            retiring: None,
            state: ConnectionState::Disconnected,
            hydration: None,
            store: MessageStore::new(),
            link_tx,
            history_tx,
            status_tx,
            messages_tx,
        };
        let task = tokio::spawn(actor.run(commands_rx, rooms, link_rx, history_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
            messages: messages_rx,
            task: Some(task),
        }
    }

    /// Publishes `text` to the room. Returns once the frame is handed to the
    /// connection; delivery is only confirmed by the server echo.
    pub async fn send_message(&self, text: &str) -> Result<(), SendError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ManagerCommand::Send { text: text.to_string(), reply })
            .map_err(|_| SendError::Closed)?;
        response.await.map_err(|_| SendError::Closed)?
    }

    pub fn set_user(&self, user: Option<CurrentUser>) {
        let _ = self.commands.send(ManagerCommand::SetUser(user));
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn messages(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.messages.clone()
    }

    /// Disconnects and waits until the link is closed
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(ManagerCommand::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// History fetch in flight for one connect cycle, with the live events held
/// back meanwhile
struct Hydration {
    attempt: u32,
    buffered: Vec<ChatMessage>,
}

struct Actor {
    session: SessionContext,
    api: Arc<dyn ChatApi>,
    connector: Arc<dyn Connector>,
    settings: HandleSettings,
    echo_policy: EchoPolicy,
    history_merge: HistoryMerge,
    room_id: Option<RoomId>,
    generation: Generation,
    handle: Option<ConnectionHandle>,
    /// Driver of a deactivated handle that may still be closing its link
    retiring: Option<JoinHandle<()>>,
    state: ConnectionState,
    hydration: Option<Hydration>,
    store: MessageStore,
    link_tx: mpsc::UnboundedSender<(Tag, LinkEvent)>,
    history_tx: mpsc::UnboundedSender<(Tag, Result<Vec<ChatMessage>, ApiError>)>,
    status_tx: watch::Sender<ConnectionStatus>,
    messages_tx: watch::Sender<Vec<ChatMessage>>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ManagerCommand>,
        mut rooms: watch::Receiver<RoomBinding>,
        mut link_rx: mpsc::UnboundedReceiver<(Tag, LinkEvent)>,
        mut history_rx: mpsc::UnboundedReceiver<(Tag, Result<Vec<ChatMessage>, ApiError>)>,
    ) {
        let initial = rooms.borrow_and_update().room_id();
        self.switch_room(initial);

        let mut binder_alive = true;
        loop {
            tokio::select! {
                biased;
                cmd = commands.recv() => match cmd {
                    Some(ManagerCommand::Send { text, reply }) => {
                        let _ = reply.send(self.send_message(&text));
                    }
                    Some(ManagerCommand::SetUser(user)) => self.session.user = user,
                    Some(ManagerCommand::Shutdown) | None => break,
                },
                changed = rooms.changed(), if binder_alive => match changed {
                    Ok(()) => {
                        let room_id = rooms.borrow_and_update().room_id();
                        self.switch_room(room_id);
                    }
                    // binder gone, keep whatever room we have
                    Err(_) => binder_alive = false,
                },
                Some((tag, event)) = link_rx.recv() => self.on_link_event(tag, event),
                Some((tag, result)) = history_rx.recv() => self.on_history(tag, result),
            }
        }

        self.teardown().await;
    }

    fn switch_room(&mut self, room_id: Option<RoomId>) {
        if room_id == self.room_id && (room_id.is_none() || self.handle.is_some()) {
            return;
        }

        // the old handle is always told to stop before a new one exists
        if let Some(old) = self.handle.take() {
            info!("[CHAT:CONN] Leaving room {}", old.room_id());
            self.retiring = old.deactivate();
        }

        self.generation += 1;
        self.room_id = room_id;
        self.hydration = None;
        self.store.clear();
        self.publish_messages();

        match room_id {
            Some(room) => {
                info!("[CHAT:CONN] Binding to room {}", room);
                self.handle = Some(ConnectionHandle::activate(
                    self.generation,
                    room,
                    self.connector.clone(),
                    self.settings.clone(),
                    self.link_tx.clone(),
                    self.retiring.take(),
                ));
                self.set_state(ConnectionState::Connecting);
            }
            None => self.set_state(ConnectionState::Disconnected),
        }
    }

    fn on_link_event(&mut self, tag: Tag, event: LinkEvent) {
        if tag.generation != self.generation {
            debug!("[CHAT:CONN] Discarding {:?} from retired handle #{}", event, tag.generation);
            return;
        }

        match event {
            LinkEvent::Connecting => {
                self.hydration = None;
                self.set_state(ConnectionState::Connecting);
            }
            LinkEvent::Connected => {
                self.set_state(ConnectionState::Connected);
                self.hydration = Some(Hydration { attempt: tag.attempt, buffered: Vec::new() });
                self.fetch_history(tag);
            }
            LinkEvent::Message(msg) => self.on_live_message(tag, msg),
            LinkEvent::ProtocolError(reason) => {
                warn!("[CHAT:CONN] Protocol error on room {:?}: {}", self.room_id, reason);
                self.set_state(ConnectionState::Error(reason));
            }
            LinkEvent::Dropped(reason) => {
                debug!("[CHAT:CONN] Room {:?} disconnected: {}", self.room_id, reason);
                if let Some(hydration) = self.hydration.take() {
                    self.append_all(hydration.buffered);
                }
                if !matches!(self.state, ConnectionState::Error(_)) {
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
    }

    fn on_live_message(&mut self, tag: Tag, msg: ChatMessage) {
        if Some(msg.room_id) != self.room_id {
            warn!("[CHAT:CONN] Dropping message {} addressed to room {}", msg.id, msg.room_id);
            return;
        }

        if self.history_merge == HistoryMerge::BufferLive {
            if let Some(hydration) = self.hydration.as_mut().filter(|h| h.attempt == tag.attempt) {
                hydration.buffered.push(msg);
                return;
            }
        }

        if self.store.append(msg) != AppendOutcome::Duplicate {
            self.publish_messages();
        }
    }

    fn fetch_history(&self, tag: Tag) {
        let Some(room_id) = self.room_id else { return };
        let api = self.api.clone();
        let results = self.history_tx.clone();
        tokio::spawn(async move {
            let result = api.room_history(room_id).await;
            let _ = results.send((tag, result));
        });
    }

    fn on_history(&mut self, tag: Tag, result: Result<Vec<ChatMessage>, ApiError>) {
        let current = tag.generation == self.generation
            && self.hydration.as_ref().is_some_and(|h| h.attempt == tag.attempt);
        if !current {
            debug!(
                "[CHAT:CONN] Discarding stale history (handle #{}, attempt {})",
                tag.generation, tag.attempt
            );
            return;
        }
        let Some(hydration) = self.hydration.take() else { return };

        match result {
            Ok(history) => {
                info!(
                    "[CHAT:CONN] Room {:?} hydrated with {} messages (+{} live)",
                    self.room_id,
                    history.len(),
                    hydration.buffered.len()
                );
                self.store.replace_all(history);
                self.append_all(hydration.buffered);
                self.publish_messages();
            }
            Err(e) => {
                warn!("[CHAT:CONN] History fetch for room {:?} failed: {}", self.room_id, e);
                self.append_all(hydration.buffered);
            }
        }
    }

    fn append_all(&mut self, messages: Vec<ChatMessage>) {
        if messages.is_empty() {
            return;
        }
        for msg in messages {
            self.store.append(msg);
        }
        self.publish_messages();
    }

    fn send_message(&mut self, text: &str) -> Result<(), SendError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let (Some(room_id), Some(user)) = (self.room_id, self.session.user.as_ref()) else {
            return Err(SendError::RoomOrUserUnavailable);
        };
        let handle = match &self.handle {
            Some(handle) if self.state == ConnectionState::Connected => handle,
            _ => return Err(SendError::NotConnected),
        };

        let request = OutboundChatRequest::text(room_id, user.id, text);
        let body = serde_json::to_string(&request).map_err(|e| SendError::Encode(e.to_string()))?;
        if !handle.publish(Frame::send_json(SEND_DESTINATION, body)) {
            return Err(SendError::NotConnected);
        }
        debug!("[CHAT:CONN] Published message to room {}", room_id);

        if self.echo_policy == EchoPolicy::Optimistic {
            let local = ChatMessage {
                id: format!("local-{}", uuid::Uuid::new_v4()),
                room_id,
                sender: user.id,
                sender_username: user.name.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                body: MessageBody::Text { text: text.to_string() },
            };
            self.store.insert_pending(local);
            self.publish_messages();
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.retiring = handle.deactivate();
        }
        if let Some(task) = self.retiring.take() {
            let _ = task.await;
        }
        self.room_id = None;
        self.hydration = None;
        self.store.clear();
        self.publish_messages();
        self.set_state(ConnectionState::Disconnected);
        debug!("[CHAT:CONN] Connection manager stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state.clone();
        self.status_tx.send_replace(ConnectionStatus { room_id: self.room_id, state });
    }

    fn publish_messages(&self) {
        self.messages_tx.send_replace(self.store.messages().to_vec());
    }
}
