//! In-process transport for tests.
//!
//! [`memory_pair`] returns a [`MemoryConnector`] for the session and a
//! [`RemoteEnd`] standing in for the remote model: events pushed on
//! `RemoteEnd::events` reach the session in order, and everything the
//! session sends shows up on `RemoteEnd::outbound`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    Connection, Connector, InboundEvent, OutboundMessage, TransportError, TransportSender,
    EVENT_CHANNEL_DEPTH,
};
use crate::audio::device::ReleaseLog;
use crate::config::SessionConfig;

struct Link {
    events: mpsc::Receiver<InboundEvent>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

/// Hands out its single pre-built link on the first `connect`.
pub struct MemoryConnector {
    link: Mutex<Option<Link>>,
    fail: bool,
    closed: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
    releases: Option<ReleaseLog>,
}

/// The remote side of a [`MemoryConnector`].
pub struct RemoteEnd {
    pub events: mpsc::Sender<InboundEvent>,
    pub outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    closed: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
}

impl RemoteEnd {
    /// `true` once the session has closed its sender.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub async fn push(&self, event: InboundEvent) {
        self.events.send(event).await.unwrap();
    }

    /// Every tool-result batch sent so far, skipping audio.
    pub fn drain_tool_results(&mut self) -> Vec<Vec<crate::tools::ToolResult>> {
        let mut out = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            if let OutboundMessage::ToolResults(results) = msg {
                out.push(results);
            }
        }
        out
    }
}

pub fn memory_pair() -> (MemoryConnector, RemoteEnd) {
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let connects = Arc::new(AtomicUsize::new(0));
    (
        MemoryConnector {
            link: Mutex::new(Some(Link {
                events: event_rx,
                outbound: out_tx,
            })),
            fail: false,
            closed: Arc::clone(&closed),
            connects: Arc::clone(&connects),
            releases: None,
        },
        RemoteEnd {
            events: event_tx,
            outbound: out_rx,
            closed,
            connects,
        },
    )
}

impl MemoryConnector {
    /// A connector whose `connect` always fails.
    pub fn refusing() -> Self {
        let (connector, _remote) = memory_pair();
        Self {
            fail: true,
            ..connector
        }
    }

    /// Record "transport" in `log` when the session closes its sender.
    pub fn with_releases(self, log: ReleaseLog) -> Self {
        Self {
            releases: Some(log),
            ..self
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _config: &SessionConfig) -> Result<Connection, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TransportError::Connect("connection refused".into()));
        }
        let link = self
            .link
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::Connect("memory link already used".into()))?;
        Ok(Connection {
            sender: Box::new(MemorySender {
                outbound: Some(link.outbound),
                closed: Arc::clone(&self.closed),
                releases: self.releases.clone(),
            }),
            events: link.events,
        })
    }
}

struct MemorySender {
    outbound: Option<mpsc::UnboundedSender<OutboundMessage>>,
    closed: Arc<AtomicBool>,
    releases: Option<ReleaseLog>,
}

#[async_trait]
impl TransportSender for MemorySender {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        tx.send(message).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {
        if self.outbound.take().is_some() {
            if let Some(releases) = &self.releases {
                releases.lock().unwrap().push("transport");
            }
        }
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_and_messages_cross_the_pair() {
        let (connector, mut remote) = memory_pair();
        let mut conn = connector.connect(&SessionConfig::default()).await.unwrap();

        remote.push(InboundEvent::TurnComplete).await;
        assert_eq!(conn.events.recv().await, Some(InboundEvent::TurnComplete));

        conn.sender
            .send(OutboundMessage::ToolResults(Vec::new()))
            .await
            .unwrap();
        assert_eq!(remote.drain_tool_results(), vec![Vec::new()]);

        conn.sender.close().await;
        assert!(remote.is_closed());
        assert!(matches!(
            conn.sender.send(OutboundMessage::ToolResults(Vec::new())).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn refusing_connector_fails() {
        let connector = MemoryConnector::refusing();
        assert!(connector.connect(&SessionConfig::default()).await.is_err());
    }
}
