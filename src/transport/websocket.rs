//! `WebSocketConnector` — the session channel over `tokio-tungstenite`.
//!
//! The stream is split: the write half lives in [`WebSocketSender`] and is
//! only touched by the controller; the read half is owned by a reader task
//! that decodes text frames and forwards events in order.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::codec;
use super::{
    Connection, Connector, InboundEvent, OutboundMessage, TransportError, TransportSender,
    EVENT_CHANNEL_DEPTH,
};
use crate::config::{SessionConfig, TransportConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the closing handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// WebSocketConnector
// ---------------------------------------------------------------------------

/// Opens session channels to the configured endpoint.
///
/// # Example
/// ```rust,no_run
/// use voice_session::config::AppConfig;
/// use voice_session::transport::{Connector, WebSocketConnector};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let config = AppConfig::load()?;
/// let connector = WebSocketConnector::from_config(&config.transport);
/// let connection = connector.connect(&config.session).await?;
/// # drop(connection);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    config: TransportConfig,
}

impl WebSocketConnector {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, session: &SessionConfig) -> Result<Connection, TransportError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        // Bearer token only when a non-empty key is configured.
        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let (ws, _response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        log::info!("transport: connected to {}", self.config.url);

        let (mut sink, stream) = ws.split();
        sink.send(Message::Text(codec::encode_setup(session)?.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;

        let (tx, events) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let reader = tokio::spawn(read_loop(stream, tx));

        Ok(Connection {
            sender: Box::new(WebSocketSender {
                sink,
                reader,
                closed: false,
            }),
            events,
        })
    }
}

/// Decode frames until the stream ends, then deliver exactly one terminal
/// event.
async fn read_loop(mut stream: SplitStream<WsStream>, tx: mpsc::Sender<InboundEvent>) {
    let terminal = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match codec::decode_inbound(text.as_str()) {
                Ok(Some(event)) => {
                    let last = event.is_terminal();
                    if tx.send(event).await.is_err() {
                        return;
                    }
                    if last {
                        return;
                    }
                }
                Ok(None) => {}
                Err(TransportError::Protocol(detail)) => {
                    log::error!("transport: {detail}");
                    break InboundEvent::ConnectionError(detail);
                }
                Err(e) => log::warn!("transport: dropping inbound message: {e}"),
            },
            Some(Ok(Message::Close(frame))) => {
                log::info!("transport: remote closed ({frame:?})");
                break InboundEvent::ConnectionClosed;
            }
            // Ping/pong are answered by tungstenite; binary is not used.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                log::error!("transport: read failed: {e}");
                break InboundEvent::ConnectionError(e.to_string());
            }
            None => break InboundEvent::ConnectionClosed,
        }
    };
    let _ = tx.send(terminal).await;
}

// ---------------------------------------------------------------------------
// WebSocketSender
// ---------------------------------------------------------------------------

struct WebSocketSender {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
    closed: bool,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let text = codec::encode_outbound(&message)?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // Stop delivery first; the reader owns the only event sender.
        self.reader.abort();
        let _ = (&mut self.reader).await;

        if tokio::time::timeout(CLOSE_TIMEOUT, self.sink.close()).await.is_err() {
            log::warn!("transport: close handshake timed out");
        }
        log::info!("transport: closed");
    }
}

impl Drop for WebSocketSender {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
