//! One live STOMP connection for one room, with its own reconnect loop.
//!
//! A handle spawns a driver task that connects, subscribes to the room topic,
//! forwards what it sees to the manager as [`LinkEvent`]s and reconnects after
//! a fixed delay when the link drops. Stopping the handle ends the driver after
//! a graceful DISCONNECT.

use crate::client::config::room_topic;
use crate::client::services::transport::{Connector, Link, TransportError};
use crate::common::models::{ChatMessage, RoomId};
use crate::common::stomp::{Command, Frame, HeartBeat, Packet};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval};

pub type Generation = u64;

const SUBSCRIPTION_ID: &str = "sub-0";

/// Identifies which handle (`generation`) and which connect cycle of that
/// handle (`attempt`) an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub generation: Generation,
    pub attempt: u32,
}

#[derive(Debug)]
pub enum LinkEvent {
    Connecting,
    /// CONNECTED received and the room topic subscribed
    Connected,
    Message(ChatMessage),
    ProtocolError(String),
    Dropped(String),
}

#[derive(Debug, Clone)]
pub struct HandleSettings {
    pub heart_beat: HeartBeat,
    pub reconnect_delay: Duration,
    pub bearer: Option<String>,
}

pub struct ConnectionHandle {
    generation: Generation,
    room_id: RoomId,
    outgoing: mpsc::UnboundedSender<Frame>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// Spawns the driver. When `previous` is given the driver waits for it to
    /// finish before opening its own transport.
    pub fn activate(
        generation: Generation,
        room_id: RoomId,
        connector: Arc<dyn Connector>,
        settings: HandleSettings,
        events: mpsc::UnboundedSender<(Tag, LinkEvent)>,
        previous: Option<JoinHandle<()>>,
    ) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let driver = Driver {
            generation,
            room_id,
            connector,
            settings,
            events,
            outgoing: outgoing_rx,
            stop: stop_rx,
        };
        let task = tokio::spawn(driver.run(previous));
        debug!("[CHAT:CONN] Activated handle #{} for room {}", generation, room_id);

        Self {
            generation,
            room_id,
            outgoing: outgoing_tx,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Queues a frame for the live link. Fire and forget.
    pub fn publish(&self, frame: Frame) -> bool {
        self.outgoing.send(frame).is_ok()
    }

    /// Asks the driver to disconnect and returns its task so a successor can
    /// wait for the link to be gone.
    pub fn deactivate(mut self) -> Option<JoinHandle<()>> {
        debug!("[CHAT:CONN] Deactivating handle #{} for room {}", self.generation, self.room_id);
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.take()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

enum SessionEnd {
    Stopped,
    Dropped(String),
}

struct Driver {
    generation: Generation,
    room_id: RoomId,
    connector: Arc<dyn Connector>,
    settings: HandleSettings,
    events: mpsc::UnboundedSender<(Tag, LinkEvent)>,
    outgoing: mpsc::UnboundedReceiver<Frame>,
    stop: oneshot::Receiver<()>,
}

impl Driver {
    async fn run(mut self, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            // previous drivers are already stopped, this only waits for their link to close
            let _ = previous.await;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let tag = Tag { generation: self.generation, attempt };
            self.emit(tag, LinkEvent::Connecting);

            match self.session(tag).await {
                SessionEnd::Stopped => break,
                SessionEnd::Dropped(reason) => {
                    debug!(
                        "[CHAT:CONN] Room {} link dropped ({}), retrying in {:?}",
                        self.room_id, reason, self.settings.reconnect_delay
                    );
                    self.emit(tag, LinkEvent::Dropped(reason));
                }
            }

            tokio::select! {
                _ = &mut self.stop => break,
                _ = time::sleep(self.settings.reconnect_delay) => {}
            }
        }
        debug!("[CHAT:CONN] Driver #{} for room {} finished", self.generation, self.room_id);
    }

    fn emit(&self, tag: Tag, event: LinkEvent) {
        // the manager going away is the same as being stopped
        let _ = self.events.send((tag, event));
    }

    async fn session(&mut self, tag: Tag) -> SessionEnd {
        let mut link = tokio::select! {
            _ = &mut self.stop => return SessionEnd::Stopped,
            res = self.connector.connect() => match res {
                Ok(link) => link,
                Err(e) => return SessionEnd::Dropped(format!("connect failed: {}", e)),
            },
        };

        let connect = Frame::connect(
            &self.connector.host(),
            self.settings.heart_beat,
            self.settings.bearer.as_deref(),
        );
        if let Err(e) = link.send(connect.into()).await {
            return SessionEnd::Dropped(format!("CONNECT failed: {}", e));
        }

        let agreed = loop {
            let packet = tokio::select! {
                _ = &mut self.stop => {
                    link.close().await;
                    return SessionEnd::Stopped;
                }
                packet = link.recv() => packet,
            };
            let frame = match packet {
                None => return SessionEnd::Dropped("closed during handshake".to_string()),
                Some(Ok(Packet::Heartbeat)) => continue,
                Some(Ok(Packet::Frame(frame))) => frame,
                Some(Err(TransportError::Frame(e))) => {
                    warn!("[CHAT:STOMP] Ignoring malformed frame during handshake: {}", e);
                    continue;
                }
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
            };
            match frame.command {
                Command::Connected => {
                    let server = frame.get("heart-beat").and_then(HeartBeat::parse).unwrap_or_default();
                    break HeartBeat::negotiate(self.settings.heart_beat, server);
                }
                Command::Error => {
                    let reason = describe_error(&frame);
                    warn!("[CHAT:STOMP] Server refused CONNECT for room {}: {}", self.room_id, reason);
                    self.emit(tag, LinkEvent::ProtocolError(reason.clone()));
                    link.close().await;
                    return SessionEnd::Dropped(reason);
                }
                other => debug!("[CHAT:STOMP] Unexpected {} during handshake", other.as_str()),
            }
        };

        let topic = room_topic(self.room_id);
        if let Err(e) = link.send(Frame::subscribe(SUBSCRIPTION_ID, &topic).into()).await {
            return SessionEnd::Dropped(format!("SUBSCRIBE failed: {}", e));
        }
        info!("[CHAT:CONN] Connected, subscribed to {}", topic);
        self.emit(tag, LinkEvent::Connected);

        self.pump(tag, link.as_mut(), agreed).await
    }

    async fn pump(&mut self, tag: Tag, link: &mut dyn Link, agreed: HeartBeat) -> SessionEnd {
        let mut heartbeat = (!agreed.outgoing.is_zero())
            .then(|| time::interval_at(Instant::now() + agreed.outgoing, agreed.outgoing));
        let mut last_seen = Instant::now();

        loop {
            let silence_deadline = last_seen + agreed.incoming * 2;
            tokio::select! {
                _ = &mut self.stop => {
                    let _ = link.send(Frame::disconnect().into()).await;
                    link.close().await;
                    return SessionEnd::Stopped;
                }
                frame = self.outgoing.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = link.send(frame.into()).await {
                            return SessionEnd::Dropped(format!("send failed: {}", e));
                        }
                    }
                    None => {
                        link.close().await;
                        return SessionEnd::Stopped;
                    }
                },
                _ = tick(&mut heartbeat) => {
                    if let Err(e) = link.send(Packet::Heartbeat).await {
                        return SessionEnd::Dropped(format!("heart-beat failed: {}", e));
                    }
                }
                _ = silence(silence_deadline, agreed.incoming) => {
                    link.close().await;
                    return SessionEnd::Dropped("server heart-beat missed".to_string());
                }
                packet = link.recv() => {
                    last_seen = Instant::now();
                    match packet {
                        None => return SessionEnd::Dropped("closed by server".to_string()),
                        Some(Ok(Packet::Heartbeat)) => {}
                        Some(Ok(Packet::Frame(frame))) => self.on_frame(tag, frame),
                        Some(Err(TransportError::Frame(e))) => {
                            warn!("[CHAT:STOMP] Dropping malformed frame: {}", e);
                        }
                        Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                    }
                }
            }
        }
    }

    fn on_frame(&self, tag: Tag, frame: Frame) {
        match frame.command {
            Command::Message => {
                if frame.get("subscription").is_some_and(|s| s != SUBSCRIPTION_ID) {
                    debug!("[CHAT:STOMP] Ignoring MESSAGE for foreign subscription");
                    return;
                }
                match ChatMessage::from_json(&frame.body) {
                    Ok(msg) => self.emit(tag, LinkEvent::Message(msg)),
                    Err(e) => warn!(
                        "[CHAT:STOMP] Dropping unreadable message on {}: {}",
                        frame.get("destination").unwrap_or("?"),
                        e
                    ),
                }
            }
            Command::Error => {
                let reason = describe_error(&frame);
                warn!("[CHAT:STOMP] ERROR frame for room {}: {}", self.room_id, reason);
                self.emit(tag, LinkEvent::ProtocolError(reason));
            }
            Command::Receipt => debug!("[CHAT:STOMP] Receipt {:?}", frame.get("receipt-id")),
            other => debug!("[CHAT:STOMP] Ignoring {} frame", other.as_str()),
        }
    }
}

fn describe_error(frame: &Frame) -> String {
    match (frame.get("message"), frame.body.trim()) {
        (Some(msg), "") => msg.to_string(),
        (Some(msg), body) => format!("{}: {}", msg, body),
        (None, "") => "unspecified error".to_string(),
        (None, body) => body.to_string(),
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn silence(deadline: Instant, incoming: Duration) {
    if incoming.is_zero() {
        std::future::pending::<()>().await
    } else {
        time::sleep_until(deadline).await
    }
}
