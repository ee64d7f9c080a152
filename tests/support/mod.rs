#![allow(dead_code)]

use async_trait::async_trait;
use roommate_chat::client::{
    ApiError, ChatApi, ChatConfig, ConnectionState, ConnectionStatus, Connector, Link, RoomBinding,
    SessionContext, TransportError,
};
use roommate_chat::common::models::{ChatMessage, ChatRoom, CurrentUser, MessageBody, RoomId, WireMessage};
use roommate_chat::common::stomp::{Command, Frame, FrameError, Packet};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

const WAIT: Duration = Duration::from_secs(120);

pub fn text(id: &str, room_id: RoomId, sender: i64, body: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        room_id,
        sender,
        sender_username: format!("user{}", sender),
        timestamp: "2024-05-01T10:00:00".to_string(),
        body: MessageBody::Text { text: body.to_string() },
    }
}

pub fn room(id: RoomId) -> ChatRoom {
    ChatRoom {
        id,
        name: format!("Room {}", id),
        post_id: Some(id * 10),
        max_member_count: 3,
        current_user_count: 2,
    }
}

pub fn binding(room_id: Option<RoomId>) -> RoomBinding {
    RoomBinding { room: room_id.map(room), is_recruiting: room_id.is_some() }
}

pub fn user(id: i64) -> CurrentUser {
    CurrentUser { id, name: format!("user{}", id), is_host: false }
}

pub fn session(user_id: Option<i64>) -> SessionContext {
    SessionContext::new(Some("secret-token".to_string())).with_user(user_id.map(user))
}

pub fn config() -> ChatConfig {
    ChatConfig::default()
}

pub fn ids(messages: &[ChatMessage]) -> Vec<String> {
    messages.iter().map(|m| m.id.clone()).collect()
}

pub async fn wait_ids(rx: &mut watch::Receiver<Vec<ChatMessage>>, expected: &[&str]) {
    let found = matches!(
        tokio::time::timeout(WAIT, rx.wait_for(|m| ids(m) == expected)).await,
        Ok(Ok(_))
    );
    assert!(
        found,
        "store never became {:?}, last seen {:?}",
        expected,
        ids(&rx.borrow())
    );
}

pub async fn wait_state(rx: &mut watch::Receiver<ConnectionStatus>, room_id: Option<RoomId>, state: ConnectionState) {
    let found = matches!(
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.room_id == room_id && s.state == state)).await,
        Ok(Ok(_))
    );
    assert!(
        found,
        "status never became {:?}/{:?}, last seen {:?}",
        room_id,
        state,
        *rx.borrow()
    );
}

/// Lets every ready task run without moving the paused clock far
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Server side of one fake connection
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<Result<Packet, TransportError>>,
    from_client: mpsc::UnboundedReceiver<Packet>,
}

impl ServerEnd {
    pub async fn next_packet(&mut self) -> Option<Packet> {
        tokio::time::timeout(WAIT, self.from_client.recv()).await.expect("client went quiet")
    }

    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.next_packet().await? {
                Packet::Heartbeat => continue,
                Packet::Frame(frame) => return Some(frame),
            }
        }
    }

    /// Whatever the client already sent, without waiting
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Ok(packet) = self.from_client.try_recv() {
            out.push(packet);
        }
        out
    }

    /// Answers CONNECT without heart-beats and returns the subscribed topic
    pub async fn handshake(&mut self) -> String {
        self.handshake_with("0,0").await
    }

    pub async fn handshake_with(&mut self, heart_beat: &str) -> String {
        let connect = self.next_frame().await.expect("client sent CONNECT");
        assert_eq!(connect.command, Command::Connect);
        self.send(Frame::new(Command::Connected).header("version", "1.2").header("heart-beat", heart_beat));
        let subscribe = self.next_frame().await.expect("client subscribed");
        assert_eq!(subscribe.command, Command::Subscribe);
        subscribe.get("destination").unwrap_or_default().to_string()
    }

    pub fn send(&self, frame: Frame) {
        let _ = self.to_client.send(Ok(Packet::Frame(frame)));
    }

    pub fn deliver(&self, msg: &ChatMessage) {
        let body = serde_json::to_string(&WireMessage::from(msg)).expect("wire json");
        self.deliver_raw(msg.room_id, &body);
    }

    pub fn deliver_raw(&self, room_id: RoomId, body: &str) {
        self.send(
            Frame::new(Command::Message)
                .header("destination", format!("/topic/room/{}", room_id))
                .header("subscription", "sub-0")
                .header("message-id", "srv-1")
                .with_body(body),
        );
    }

    pub fn send_garbage(&self) {
        let _ = self.to_client.send(Err(TransportError::Frame(FrameError::Unterminated)));
    }

    /// Waits for the client to close the link, returning the frames it sent meanwhile
    pub async fn wait_closed(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(packet) = self.next_packet().await {
            if let Packet::Frame(frame) = packet {
                frames.push(frame);
            }
        }
        frames
    }
}

pub struct FakeConnector {
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
    accepted_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerEnd>>,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            accepted_tx,
            accepted_rx: tokio::sync::Mutex::new(accepted_rx),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        })
    }

    pub async fn accept(&self) -> ServerEnd {
        let mut rx = self.accepted_rx.lock().await;
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("no connection attempt")
            .expect("connector alive")
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn Link>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now_live, Ordering::SeqCst);
        let _ = self.accepted_tx.send(ServerEnd { to_client, from_client });
        Ok(Box::new(FakeLink { rx: client_rx, tx: Some(client_tx), live: self.live.clone() }))
    }

    fn host(&self) -> String {
        "chat.test".to_string()
    }
}

struct FakeLink {
    rx: mpsc::UnboundedReceiver<Result<Packet, TransportError>>,
    tx: Option<mpsc::UnboundedSender<Packet>>,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl Link for FakeLink {
    async fn send(&mut self, packet: Packet) -> Result<(), TransportError> {
        match &self.tx {
            Some(tx) => tx.send(packet).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn recv(&mut self) -> Option<Result<Packet, TransportError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

impl Drop for FakeLink {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

enum HistoryReply {
    Ready(Vec<ChatMessage>),
    Gated(oneshot::Receiver<Vec<ChatMessage>>),
    Fail,
}

pub struct FakeApi {
    my_room: Mutex<Result<Option<ChatRoom>, u16>>,
    user: Mutex<Result<CurrentUser, u16>>,
    history: Mutex<HashMap<RoomId, VecDeque<HistoryReply>>>,
    history_calls: Mutex<Vec<RoomId>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            my_room: Mutex::new(Ok(None)),
            user: Mutex::new(Ok(user(7))),
            history: Mutex::new(HashMap::new()),
            history_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_room(&self, room_id: Option<RoomId>) {
        *self.my_room.lock().unwrap() = Ok(room_id.map(room));
    }

    pub fn fail_room(&self, status: u16) {
        *self.my_room.lock().unwrap() = Err(status);
    }

    pub fn fail_user(&self, status: u16) {
        *self.user.lock().unwrap() = Err(status);
    }

    pub fn push_history(&self, room_id: RoomId, messages: Vec<ChatMessage>) {
        self.queue(room_id, HistoryReply::Ready(messages));
    }

    pub fn fail_history(&self, room_id: RoomId) {
        self.queue(room_id, HistoryReply::Fail);
    }

    /// The next history request for `room_id` hangs until the sender is used
    pub fn gate_history(&self, room_id: RoomId) -> oneshot::Sender<Vec<ChatMessage>> {
        let (tx, rx) = oneshot::channel();
        self.queue(room_id, HistoryReply::Gated(rx));
        tx
    }

    pub fn history_calls(&self) -> Vec<RoomId> {
        self.history_calls.lock().unwrap().clone()
    }

    fn queue(&self, room_id: RoomId, reply: HistoryReply) {
        self.history.lock().unwrap().entry(room_id).or_default().push_back(reply);
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn my_room(&self) -> Result<Option<ChatRoom>, ApiError> {
        self.my_room
            .lock()
            .unwrap()
            .clone()
            .map_err(|status| ApiError::Status { status, path: "/chat/rooms/my".to_string() })
    }

    async fn room_history(&self, room_id: RoomId) -> Result<Vec<ChatMessage>, ApiError> {
        self.history_calls.lock().unwrap().push(room_id);
        let reply = self.history.lock().unwrap().get_mut(&room_id).and_then(|q| q.pop_front());
        let path = format!("/chat/rooms/history/{}", room_id);
        match reply {
            None => Ok(Vec::new()),
            Some(HistoryReply::Ready(messages)) => Ok(messages),
            Some(HistoryReply::Gated(rx)) => Ok(rx.await.unwrap_or_default()),
            Some(HistoryReply::Fail) => Err(ApiError::Status { status: 500, path }),
        }
    }

    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        self.user
            .lock()
            .unwrap()
            .clone()
            .map_err(|status| ApiError::Status { status, path: "/auth".to_string() })
    }
}
