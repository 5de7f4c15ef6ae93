//! WebSocket transport via `tokio-tungstenite`.
//!
//! Frames are text on the wire (the protocol is JSON and the browser
//! client reads text frames without a decode step); binary frames from
//! non-browser clients are accepted on the way in. Each accepted socket
//! is split into independent read and write halves, because volley's
//! connection handler runs them from two different tasks: a writer task
//! draining the gateway channel, and the read loop. Splitting means a
//! stalled send never blocks `recv` and vice versa.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use volley_protocol::ConnectionId;

use crate::{Connection, Transport, TransportError};

/// Counter for generating unique connection ids.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A half-open client gets this long to finish the HTTP upgrade. The
/// deadline also bounds how long one slow handshake can hold the accept
/// loop, so keep it short.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest inbound frame the protocol can legitimately produce. The
/// biggest real frame is a full lobby snapshot ack, a few KiB; anything
/// past this is hostile or broken.
const MAX_INBOUND_FRAME_BYTES: usize = 64 * 1024;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// A WebSocket [`Transport`] listening on a TCP address.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;

        let upgrade = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            tokio_tungstenite::accept_async(stream),
        );
        let ws = match upgrade.await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                return Err(TransportError::Handshake(format!("{peer}: {e}")));
            }
            Err(_) => {
                return Err(TransportError::Handshake(format!(
                    "{peer}: no upgrade within {}s",
                    HANDSHAKE_TIMEOUT.as_secs()
                )));
            }
        };

        let (sink, source) = ws.split();
        let id =
            ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %peer, "websocket session established");

        Ok(WebSocketConnection {
            id,
            peer,
            writer: Mutex::new(sink),
            reader: Mutex::new(source),
        })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// One established WebSocket session, split into independently locked
/// halves.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    writer: Mutex<WsSink>,
    reader: Mutex<WsSource>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // Outbound frames are always JSON produced by the codec, so
        // non-UTF-8 here is a caller bug worth surfacing, not padding
        // into a binary frame.
        let text = std::str::from_utf8(data)
            .map_err(|e| TransportError::Send(e.to_string()))?;
        self.writer
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut reader = self.reader.lock().await;
        while let Some(frame) = reader.next().await {
            let frame =
                frame.map_err(|e| TransportError::Receive(e.to_string()))?;
            let data = match frame {
                Message::Text(text) => text.as_bytes().to_vec(),
                Message::Binary(bytes) => bytes.into(),
                Message::Close(_) => return Ok(None),
                // Control frames carry nothing for the protocol;
                // tungstenite already answers pings on its own.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    continue;
                }
            };
            if data.len() > MAX_INBOUND_FRAME_BYTES {
                tracing::warn!(
                    id = %self.id,
                    peer = %self.peer,
                    bytes = data.len(),
                    "dropping oversized inbound frame"
                );
                return Err(TransportError::FrameTooLarge(data.len()));
            }
            return Ok(Some(data));
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        // SinkExt::close sends the close frame and flushes the sink.
        self.writer
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}
