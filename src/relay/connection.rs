//! The persistent relay connection.
//!
//! One background task owns the socket. Consumers see two plain byte
//! channels that survive reconnects: frames in flight at the moment of a
//! disconnect are lost (the reader is lossy by contract), frames queued on
//! the writer are flushed once the connection is back.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::error::WsError;
use crate::identity::Identity;
use crate::relay::token;

/// Incoming binary frames, in relay delivery order.
pub type Reader = mpsc::Receiver<Vec<u8>>;

/// Outgoing binary frames, FIFO per producer.
pub type Writer = mpsc::Sender<Vec<u8>>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const PING_INTERVAL: Duration = Duration::from_secs(20);
const PONG_WAIT: Duration = Duration::from_secs(40);
const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_CAP: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 256;

enum PumpEnd {
    /// Cancellation or all channel ends dropped; do not reconnect.
    Shutdown,
    /// The connection broke; reconnect with backoff.
    Disconnected,
}

/// A relay connection owned by a background task.
pub struct Connection {
    identity: Arc<Identity>,
    twin: u32,
    session: Option<String>,
    url: String,
}

impl Connection {
    pub fn new(
        identity: Arc<Identity>,
        url: impl Into<String>,
        session: Option<String>,
        twin: u32,
    ) -> Self {
        Self {
            identity,
            twin,
            session,
            url: url.into(),
        }
    }

    /// Spawn the connection task and return its channel endpoints.
    ///
    /// The endpoints stay valid across reconnects. Cancelling the token
    /// closes the socket and both channels.
    pub fn start(self, cancel: CancellationToken) -> (Reader, Writer) {
        let (reader_tx, reader_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (writer_tx, writer_rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(self.run(cancel, reader_tx, writer_rx));

        (reader_rx, writer_tx)
    }

    async fn run(
        self,
        cancel: CancellationToken,
        reader_tx: mpsc::Sender<Vec<u8>>,
        mut writer_rx: mpsc::Receiver<Vec<u8>>,
    ) {
        let mut backoff = RECONNECT_INITIAL;

        loop {
            let stream = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.connect() => match result {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::error!(url = %self.url, "failed to connect to relay: {e}");
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(RECONNECT_CAP);
                        continue;
                    }
                },
            };

            backoff = RECONNECT_INITIAL;
            tracing::info!(url = %self.url, twin = self.twin, "connected to relay");

            match self.pump(&cancel, stream, &reader_tx, &mut writer_rx).await {
                PumpEnd::Shutdown => return,
                PumpEnd::Disconnected => continue,
            }
        }
    }

    async fn connect(&self) -> Result<WsStream, WsError> {
        let token = token::connection_token(&self.identity, self.twin, self.session.as_deref());
        let url = format!("{}?{}", self.url, token);

        let (stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&url))
            .await
            .map_err(|_| WsError::ConnectionFailed("connection timeout".into()))?
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        Ok(stream)
    }

    async fn pump(
        &self,
        cancel: &CancellationToken,
        stream: WsStream,
        reader_tx: &mpsc::Sender<Vec<u8>>,
        writer_rx: &mut mpsc::Receiver<Vec<u8>>,
    ) -> PumpEnd {
        let (mut sink, mut source): (WsSink, WsSource) = stream.split();

        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.reset(); // skip the immediate first tick
        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client shutdown".into(),
                        })))
                        .await;
                    return PumpEnd::Shutdown;
                }

                frame = source.next() => match frame {
                    Some(Ok(Message::Binary(data))) => {
                        if reader_tx.send(data.to_vec()).await.is_err() {
                            // consumer gone
                            return PumpEnd::Shutdown;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::warn!("relay closed the connection");
                        return PumpEnd::Disconnected;
                    }
                    Some(Ok(_)) => {
                        tracing::error!("invalid message type received");
                        return PumpEnd::Disconnected;
                    }
                    Some(Err(e)) => {
                        tracing::error!("failed to read message: {e}");
                        return PumpEnd::Disconnected;
                    }
                },

                outgoing = writer_rx.recv() => match outgoing {
                    Some(data) => {
                        if let Err(e) = sink.send(Message::Binary(data.into())).await {
                            // the frame is lost; writers observe the drop only
                            // through missing responses
                            tracing::error!("failed to write message: {e}");
                            return PumpEnd::Disconnected;
                        }
                    }
                    None => return PumpEnd::Shutdown,
                },

                _ = ping.tick() => {
                    if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                        tracing::error!("failed to ping relay: {e}");
                        return PumpEnd::Disconnected;
                    }
                    if last_pong.elapsed() > PONG_WAIT {
                        tracing::error!("connection stalling, reconnecting");
                        return PumpEnd::Disconnected;
                    }
                }
            }
        }
    }
}
