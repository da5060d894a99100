//! Client side of the relay connection.
//!
//! Sends are fire-and-forget: the frame loop queues actions in an
//! [`Outbox`], flushes them through a [`Transport`], and polls the
//! transport for whatever the server pushed in the meantime.

use crate::protocol::{BoardAction, ClientMessage, ServerMessage};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid WebSocket URL scheme: {0}")]
    Scheme(String),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    Send(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events surfaced by a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
    Error { message: String },
}

/// A connection to the relay.
pub trait Transport {
    fn send(&mut self, message: &ClientMessage) -> TransportResult<()>;

    /// Drain pending events without blocking.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Actions waiting to be sent.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    pending: Vec<BoardAction>,
}

impl Outbox {
    pub fn push(&mut self, action: BoardAction) {
        self.pending.push(action);
    }

    pub fn drain(&mut self) -> Vec<BoardAction> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

mod native {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client backed by a background thread.
    pub struct NativeWebSocket {
        state: ConnectionState,
        cmd_tx: Option<Sender<WsCommand>>,
        event_rx: Option<Receiver<TransportEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        pub fn connect(&mut self, url: &str) -> TransportResult<()> {
            if self.cmd_tx.is_some() {
                return Err(TransportError::AlreadyConnected);
            }
            let parsed = Url::parse(url)?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(TransportError::Scheme(parsed.scheme().to_string()));
            }

            self.state = ConnectionState::Connecting;
            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<TransportEvent>();
            let url = url.to_string();
            let handle = thread::spawn(move || run(url, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

    impl Transport for NativeWebSocket {
        fn send(&mut self, message: &ClientMessage) -> TransportResult<()> {
            let tx = self.cmd_tx.as_ref().ok_or(TransportError::NotConnected)?;
            let json = serde_json::to_string(message)?;
            tx.send(WsCommand::Send(json))
                .map_err(|e| TransportError::Send(e.to_string()))
        }

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            let Some(rx) = self.event_rx.as_ref() else {
                return Vec::new();
            };
            let mut events = Vec::new();
            while let Ok(event) = rx.try_recv() {
                match &event {
                    TransportEvent::Connected => self.state = ConnectionState::Connected,
                    TransportEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    TransportEvent::Error { .. } => self.state = ConnectionState::Error,
                    TransportEvent::Message(_) => {}
                }
                events.push(event);
            }
            events
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }

    fn run(url: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<TransportEvent>) {
        log::info!("WebSocket thread: connecting to {url}");
        let mut socket = match connect(&url) {
            Ok((socket, response)) => {
                log::info!("WebSocket connected, status: {}", response.status());
                socket
            }
            Err(e) => {
                log::error!("WebSocket connection failed: {e}");
                let _ = event_tx.send(TransportEvent::Error {
                    message: format!("Connection failed: {e}"),
                });
                return;
            }
        };
        let _ = event_tx.send(TransportEvent::Connected);

        // Short read timeouts let the loop interleave reads and sends.
        if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    if let Err(e) = socket.send(Message::text(msg)) {
                        log::error!("WebSocket send error: {e}");
                        break;
                    }
                }
                Ok(WsCommand::Close) => {
                    let _ = socket.close(None);
                    break;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                    Ok(msg) => {
                        let _ = event_tx.send(TransportEvent::Message(msg));
                    }
                    Err(e) => log::warn!("Failed to parse server message: {e}"),
                },
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
                Err(e) => {
                    log::error!("WebSocket read error: {e}");
                    let _ = event_tx.send(TransportEvent::Error { message: e.to_string() });
                    break;
                }
            }
        }

        log::info!("WebSocket thread exiting");
        let _ = event_tx.send(TransportEvent::Disconnected);
    }
}

pub use native::NativeWebSocket;
