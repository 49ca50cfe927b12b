/// Owns the socket lifecycle for one session: dialing, drop detection, and
/// the fixed-delay reconnect schedule. Only this type transitions the
/// session's connection state.
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::transport::{Connector, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        }
    }
}

pub struct ConnectionSupervisor {
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    reconnect_delay: Duration,
    reconnect_at: Option<Instant>,
}

impl ConnectionSupervisor {
    pub fn new(connector: Box<dyn Connector>, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            transport: None,
            state: ConnectionState::Disconnected,
            reconnect_delay,
            reconnect_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
            && self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    /// Deadline of the scheduled reconnect attempt, if one is armed.
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Fail fast when submission is not permitted.
    pub fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    /// Initial or manual connect. Accepted from `Disconnected` and `Error`;
    /// a no-op in every other state.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if !matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Error
        ) {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;
        match self.connector.dial().await {
            Ok(transport) => {
                info!("connected to executor");
                self.transport = Some(transport);
                self.state = ConnectionState::Connected;
                self.reconnect_at = None;
                Ok(())
            }
            Err(err) => {
                warn!(%err, "connect failed");
                self.state = ConnectionState::Error;
                Err(err)
            }
        }
    }

    /// Unexpected drop: schedule one reconnect attempt after the fixed
    /// delay.
    pub fn mark_dropped(&mut self) {
        warn!(delay = ?self.reconnect_delay, "transport dropped, reconnect scheduled");
        self.transport = None;
        self.state = ConnectionState::Reconnecting;
        self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
    }

    /// The scheduled attempt fired.
    pub async fn attempt_reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnect_at = None;
        match self.connector.dial().await {
            Ok(transport) => {
                info!("reconnected to executor");
                self.transport = Some(transport);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                warn!(%err, "reconnect failed");
                self.state = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Send one encoded frame, failing fast when not connected. A send
    /// failure on a live transport counts as a drop.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let transport = self.transport.as_ref().ok_or(TransportError::NotConnected)?;
        match transport.send(data).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.mark_dropped();
                Err(err)
            }
        }
    }

    /// Next inbound frame. Pends forever while no transport is attached,
    /// which lets the session's select loop keep this branch armed
    /// unconditionally. `None` means the live transport dropped.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        match self.transport.as_mut() {
            Some(transport) => transport.recv().await,
            None => std::future::pending().await,
        }
    }
}
