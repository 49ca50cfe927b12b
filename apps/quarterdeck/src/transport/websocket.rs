/// WebSocket implementation of the `Transport` trait.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{Connector, Transport, TransportError};

/// Configuration for the executor socket.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Base address, scheme optional.
    pub url: String,
    /// Optional path suffix (e.g. "/terminal/<session>").
    pub path: Option<String>,
    /// Whether to use TLS (wss:// vs ws://).
    pub use_tls: bool,
}

impl WebSocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        // Auto-detect TLS; loopback stays plaintext.
        let use_tls = url.starts_with("wss://")
            || (!url.starts_with("ws://")
                && !url.contains("127.0.0.1")
                && !url.contains("localhost"));
        Self {
            url,
            path: None,
            use_tls,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Build the full WebSocket URL.
    pub fn build_url(&self) -> String {
        let mut url = self.url.clone();
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            url = if self.use_tls {
                format!("wss://{url}")
            } else {
                format!("ws://{url}")
            };
        }
        // Normalize localhost to IPv4 to avoid IPv6 (::1) preference.
        if url.contains("localhost") {
            url = url.replace("localhost", "127.0.0.1");
        }
        if let Some(ref path) = self.path {
            if !url.ends_with('/') && !path.starts_with('/') {
                url.push('/');
            }
            url.push_str(path);
        }
        url
    }
}

pub struct WebSocketTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
    ws_task: Option<tokio::task::JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Connect and spawn the socket pump.
    pub async fn connect(config: &WebSocketConfig) -> Result<Self, TransportError> {
        let url = config.build_url();
        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let (tx_out, rx_out) = mpsc::unbounded_channel::<Vec<u8>>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<Vec<u8>>();
        let connected = Arc::new(AtomicBool::new(true));
        let pump_connected = connected.clone();

        let ws_task = tokio::spawn(async move {
            pump_websocket(ws_stream, rx_out, tx_in, pump_connected).await;
        });

        Ok(Self {
            tx: tx_out,
            rx: rx_in,
            connected,
            ws_task: Some(ws_task),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
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

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.ws_task.take() {
            task.abort();
        }
    }
}

async fn pump_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<Vec<u8>>,
    tx_in: mpsc::UnboundedSender<Vec<u8>>,
    connected: Arc<AtomicBool>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(data) = rx_out.recv().await {
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                if tx_in.send(data).is_err() {
                    break;
                }
            }
            Ok(Message::Text(text)) => {
                if tx_in.send(text.into_bytes()).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {} // Ping/Pong handled by tungstenite.
        }
    }

    connected.store(false, Ordering::SeqCst);
    send_task.abort();
    let _ = send_task.await;
}

/// Dials a fresh WebSocket for every (re)connect attempt.
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn dial(&self) -> Result<Box<dyn Transport>, TransportError> {
        let transport = WebSocketTransport::connect(&self.config).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_adds_scheme_and_path() {
        let config = WebSocketConfig::new("127.0.0.1:8080").with_path("terminal/abc");
        assert_eq!(config.build_url(), "ws://127.0.0.1:8080/terminal/abc");
    }

    #[test]
    fn localhost_normalizes_to_ipv4_and_stays_plaintext() {
        let config = WebSocketConfig::new("localhost:9000");
        assert!(!config.use_tls);
        assert_eq!(config.build_url(), "ws://127.0.0.1:9000");
    }

    #[test]
    fn remote_hosts_default_to_tls() {
        let config = WebSocketConfig::new("shell.example.com");
        assert!(config.use_tls);
        assert_eq!(config.build_url(), "wss://shell.example.com");
    }

    #[test]
    fn explicit_scheme_is_preserved() {
        let config = WebSocketConfig::new("ws://shell.example.com");
        assert_eq!(config.build_url(), "ws://shell.example.com");
    }
}
