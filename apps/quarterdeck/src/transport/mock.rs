/// In-memory transport for tests: a paired endpoint scripts the executor
/// side, and a connector hands out pre-built transports so reconnect paths
/// can be driven deterministically.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use quarterdeck_proto::{ClientFrame, ServerFrame};

use super::{Connector, Transport, TransportError};

pub struct MockTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
}

/// The test's half of the pair: plays the executor.
pub struct MockEndpoint {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn pair() -> (MockTransport, MockEndpoint) {
        let (to_remote_tx, to_remote_rx) = mpsc::unbounded_channel();
        let (to_local_tx, to_local_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        (
            MockTransport {
                tx: to_remote_tx,
                rx: to_local_rx,
                connected: connected.clone(),
            },
            MockEndpoint {
                tx: Some(to_local_tx),
                rx: to_remote_rx,
                connected,
            },
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(data.to_vec())
            .map_err(|_| TransportError::ChannelClosed)
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl MockEndpoint {
    /// Deliver a frame to the local side.
    pub fn send_frame(&self, frame: &ServerFrame) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(frame.encode().expect("mock frame encodes"));
        }
    }

    /// Next frame the local side sent, decoded.
    pub async fn recv_frame(&mut self) -> Option<ClientFrame> {
        let bytes = self.rx.recv().await?;
        Some(ClientFrame::decode(&bytes).expect("mock frame decodes"))
    }

    /// Non-blocking variant for draining what has already been sent.
    pub fn try_recv_frame(&mut self) -> Option<ClientFrame> {
        let bytes = self.rx.try_recv().ok()?;
        Some(ClientFrame::decode(&bytes).expect("mock frame decodes"))
    }

    /// Simulate a transport drop: the local side's `recv` yields `None`
    /// and subsequent sends fail.
    pub fn sever(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.tx = None;
    }
}

/// Hands out scripted transports in order; dialing past the script fails
/// like an unreachable host.
#[derive(Clone, Default)]
pub struct MockConnector {
    queue: Arc<Mutex<VecDeque<MockTransport>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, transport: MockTransport) {
        self.queue
            .lock()
            .expect("mock connector lock")
            .push_back(transport);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn dial(&self) -> Result<Box<dyn Transport>, TransportError> {
        let next = self
            .queue
            .lock()
            .expect("mock connector lock")
            .pop_front();
        match next {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(TransportError::Connect("no transport scripted".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_both_directions() {
        let (transport, mut endpoint) = MockTransport::pair();
        transport
            .send(&ClientFrame::FetchHistory.encode().unwrap())
            .await
            .unwrap();
        assert_eq!(
            endpoint.recv_frame().await,
            Some(ClientFrame::FetchHistory)
        );
    }

    #[tokio::test]
    async fn sever_disconnects_the_local_side() {
        let (mut transport, mut endpoint) = MockTransport::pair();
        endpoint.sever();
        assert!(!transport.is_connected());
        assert!(transport.recv().await.is_none());
        assert!(matches!(
            transport.send(b"x").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn connector_hands_out_scripted_transports_in_order() {
        let connector = MockConnector::new();
        let (first, _keep1) = MockTransport::pair();
        connector.push(first);

        assert!(connector.dial().await.is_ok());
        assert!(matches!(
            connector.dial().await,
            Err(TransportError::Connect(_))
        ));
    }
}
