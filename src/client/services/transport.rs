use crate::common::stomp::{FrameError, Packet};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
    #[error("connection closed")]
    Closed,
}

/// One open transport carrying STOMP packets
#[async_trait]
pub trait Link: Send {
    async fn send(&mut self, packet: Packet) -> Result<(), TransportError>;

    /// `None` once the peer has closed the connection. A malformed packet is
    /// reported as `Some(Err(TransportError::Frame(_)))` and the link stays usable.
    async fn recv(&mut self) -> Option<Result<Packet, TransportError>>;

    async fn close(&mut self);
}

/// Opens links to the fixed chat endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Link>, TransportError>;

    /// Value of the STOMP `host` header
    fn host(&self) -> String;
}

pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Link>, TransportError> {
        debug!("[CHAT:WS] Connecting to {}", self.url);
        let (stream, _) = connect_async(self.url.as_str()).await?;
        info!("[CHAT:WS] Connected to {}", self.url);
        Ok(Box::new(WsLink { stream }))
    }

    fn host(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => "localhost".to_string(),
        }
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, packet: Packet) -> Result<(), TransportError> {
        self.stream.send(Message::Text(packet.encode())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Packet, TransportError>> {
        loop {
            let text = match self.stream.next().await? {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => return Some(Err(FrameError::InvalidUtf8.into())),
                },
                Ok(Message::Close(_)) => return None,
                // ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            };
            return Some(Packet::parse(&text).map_err(Into::into));
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("[CHAT:WS] Close failed: {}", e);
        }
    }
}
