use async_trait::async_trait;
use thiserror::Error;

pub mod mock;
pub mod websocket;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport channel closed")]
    ChannelClosed,
    #[error("connect failed: {0}")]
    Connect(String),
}

/// Transport trait abstracting the persistent socket under a session.
///
/// Delivery is in-order; the session relies on that for its lock-free
/// event handling.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one encoded frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive the next frame. `None` means the transport dropped.
    async fn recv(&mut self) -> Option<Vec<u8>>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// Factory seam the connection supervisor uses to dial and re-dial.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn dial(&self) -> Result<Box<dyn Transport>, TransportError>;
}
