//! Headless WebSocket client for the canvas hub.
//!
//! Drives the same wire protocol the browser client speaks, without any
//! rendering: connect, receive the quota/baseline handshake, stream remote
//! deltas, submit edits. Used by the integration suite and by headless
//! tooling (bots, load probes).

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use fresco_core::Color;

use crate::protocol::{ClientFrame, ProtocolError, ServerEvent};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events surfaced to the application driving the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasEvent {
    /// Transport established.
    Connected,
    /// Transport lost or closed.
    Disconnected,
    /// The hub reported this client's remaining quota.
    QuotaChanged(u32),
    /// The full-grid baseline received on connect.
    InitialImage(Vec<Color>),
    /// Another client's accepted edit.
    RemotePixel { index: usize, color: Color },
}

/// A canvas protocol client.
pub struct CanvasClient {
    server_url: String,
    state: Arc<RwLock<ClientState>>,
    outgoing_tx: Option<mpsc::Sender<Message>>,
    event_rx: Option<mpsc::Receiver<CanvasEvent>>,
    event_tx: mpsc::Sender<CanvasEvent>,
}

impl CanvasClient {
    /// Create a client for the given `ws://` URL. Call [`connect`] to dial.
    ///
    /// [`connect`]: CanvasClient::connect
    pub fn new(server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ClientState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be taken once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<CanvasEvent>> {
        self.event_rx.take()
    }

    /// Dial the server and spawn the reader/writer tasks.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ClientState::Connecting;

        let (ws_stream, _) = match tokio_tungstenite::connect_async(&self.server_url).await {
            Ok(ok) => ok,
            Err(e) => {
                log::warn!("failed to connect to {}: {e}", self.server_url);
                *self.state.write().await = ClientState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel onto the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if ws_writer.send(msg).await.is_err() {
                    break;
                }
            }
        });

        *self.state.write().await = ClientState::Connected;
        let _ = self.event_tx.send(CanvasEvent::Connected).await;

        // Reader task: decode server events until the transport drops.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerEvent::decode(text.as_str()) {
                        Ok(event) => {
                            let mapped = match event {
                                ServerEvent::PixelsRemaining { pixels_remaining } => {
                                    CanvasEvent::QuotaChanged(pixels_remaining)
                                }
                                ServerEvent::InitialImage { data } => {
                                    CanvasEvent::InitialImage(data)
                                }
                                ServerEvent::DrawPixel { index, color } => {
                                    CanvasEvent::RemotePixel { index, color }
                                }
                            };
                            if event_tx.send(mapped).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("undecodable server event: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *state.write().await = ClientState::Disconnected;
            let _ = event_tx.send(CanvasEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Submit one edit request.
    pub async fn send_edit(&self, index: usize, color: Color) -> Result<(), ProtocolError> {
        let frame = ClientFrame::new(index, color).encode()?;
        self.send_message(Message::Text(frame.into())).await
    }

    /// Send a raw text frame, bypassing the edit encoder. Test hook for
    /// malformed-input behavior.
    pub async fn send_raw(&self, text: impl Into<String>) -> Result<(), ProtocolError> {
        let text: String = text.into();
        self.send_message(Message::Text(text.into())).await
    }

    /// Close the connection gracefully.
    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        let result = self.send_message(Message::Close(None)).await;
        self.outgoing_tx = None;
        result
    }

    async fn send_message(&self, msg: Message) -> Result<(), ProtocolError> {
        let tx = self
            .outgoing_tx
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(msg)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Current connection state.
    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// The server URL this client dials.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
