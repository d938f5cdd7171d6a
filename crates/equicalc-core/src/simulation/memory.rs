//! In-process transport
//!
//! Every `connect` hands a [`MemoryPeer`] to the [`MemoryServer`], which plays
//! the simulation service. The transport counts open connections.

use super::transport::{SimulationConnection, SimulationTransport};
use crate::error::TransportError;
use async_trait::async_trait;
use equicalc_types::{SimulationConfig, SimulationFrame};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Client side of the in-process transport
#[derive(Debug)]
pub struct MemoryTransport {
    incoming: mpsc::UnboundedSender<MemoryPeer>,
    open: Arc<AtomicUsize>,
    total: AtomicUsize,
    refuse: AtomicBool,
}

/// Server side: accepts connections opened by the transport
#[derive(Debug)]
pub struct MemoryServer {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryTransport {
    /// Create a connected transport/server pair
    #[must_use]
    pub fn pair() -> (Arc<Self>, MemoryServer) {
        let (incoming, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            incoming,
            open: Arc::new(AtomicUsize::new(0)),
            total: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        });
        (transport, MemoryServer { incoming: rx })
    }

    /// Connections currently open from the client side
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Connections opened so far
    #[must_use]
    pub fn total_connections(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Make subsequent `connect` calls fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl SimulationTransport for MemoryTransport {
    async fn connect(&self) -> Result<Box<dyn SimulationConnection>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        self.incoming
            .send(MemoryPeer {
                from_client,
                to_client,
            })
            .map_err(|_| TransportError::Connect("server is gone".into()))?;

        self.open.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            to_server: Some(to_server),
            from_server,
            open: Arc::clone(&self.open),
        }))
    }
}

impl MemoryServer {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }
}

/// Server end of one connection
#[derive(Debug)]
pub struct MemoryPeer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MemoryPeer {
    /// Next text frame from the client; `None` once the client closed
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Read the configuration frame; `None` if the client closed first or
    /// sent something else
    pub async fn recv_config(&mut self) -> Option<SimulationConfig> {
        let text = self.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Send a raw text frame; `false` if the client is gone
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Ok(text.into())).is_ok()
    }

    /// Send a protocol frame; `false` if the client is gone
    pub fn send_frame(&self, frame: &SimulationFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(text) => self.send_text(text),
            Err(_) => false,
        }
    }

    /// Drop the connection abnormally
    pub fn abort(self) {
        let _ = self
            .to_client
            .send(Err(TransportError::Receive("connection reset by peer".into())));
    }

    /// Wait until the client closes its side, discarding anything it sends
    pub async fn closed(&mut self) {
        while self.from_client.recv().await.is_some() {}
    }
}

struct MemoryConnection {
    to_server: Option<mpsc::UnboundedSender<String>>,
    from_server: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    open: Arc<AtomicUsize>,
}

impl MemoryConnection {
    fn release(&mut self) {
        if self.to_server.take().is_some() {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl SimulationConnection for MemoryConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let to_server = self.to_server.as_ref().ok_or(TransportError::Closed)?;
        to_server
            .send(text)
            .map_err(|_| TransportError::Send("peer is gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        if self.to_server.is_none() {
            return None;
        }
        self.from_server.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}
