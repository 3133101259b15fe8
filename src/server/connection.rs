//! Per-connection read and write tasks
//!
//! An upgraded WebSocket is split in two:
//!
//! ```text
//!   socket ──► read task ──► Codec::from_wire ──► Router::route
//!                 │
//!                 └── on exit: Hub::unregister(self)
//!
//!   Hub lanes ──► outbound queue ──► write task ──► socket
//!                                       │
//!                                       └── on queue close: close frame, close sink
//! ```
//!
//! The two tasks share nothing but the socket halves. The write task stops when the
//! registry drops the connection's handle, which happens on unregistration or when a
//! newer connection registers under the same key.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use crate::codec::Codec;
use crate::error::Result;
use crate::registry::{ConnectionKey, Hub};

use super::handler::{ConnectionContext, Router};

/// Why a read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseReason {
    /// Peer sent a close frame
    #[default]
    CloseFrame,
    /// Stream ended without a close frame
    EndOfStream,
    /// Non-retryable read error
    Error,
    /// Router panicked while handling a frame
    RouterPanic,
}

/// Outcome of a connection's read loop
#[derive(Debug, Clone, Default)]
pub struct ReadSummary {
    /// Data frames handed to the codec
    pub frames_received: u64,
    /// Frames the codec rejected
    pub decode_errors: u64,
    /// What ended the loop
    pub reason: CloseReason,
}

/// Handles for a running connection
#[derive(Debug)]
pub struct ConnectionTasks {
    /// Context shared with the router
    pub context: ConnectionContext,
    /// Read loop; finishes after the connection unregistered itself
    pub reader: JoinHandle<ReadSummary>,
    /// Write loop; yields the number of frames written
    pub writer: JoinHandle<u64>,
}

/// Inbound side of one WebSocket connection
pub struct Connection<C, R> {
    ctx: ConnectionContext,
    codec: Arc<C>,
    router: Arc<R>,
    hub: Hub,
}

impl<C, R> Connection<C, R>
where
    C: Codec,
    R: Router<C::Message>,
{
    /// Register an upgraded WebSocket with the hub and start its tasks
    ///
    /// The connection is registered before either task starts, so a send issued after
    /// this returns can reach it. If registration fails the socket is closed.
    pub async fn accept<S>(
        hub: &Hub,
        mut ws: WebSocketStream<S>,
        key: ConnectionKey,
        peer_addr: Option<SocketAddr>,
        codec: Arc<C>,
        router: Arc<R>,
    ) -> Result<ConnectionTasks>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (handle, outbound) = hub.outbound_channel(key.clone());
        let ctx = ConnectionContext::new(key, handle.serial(), peer_addr);

        if let Err(e) = hub.register(handle).await {
            let _ = ws.close(None).await;
            return Err(e.into());
        }

        let (sink, stream) = ws.split();
        let writer = tokio::spawn(write_loop(ctx.clone(), sink, outbound));

        let connection = Connection {
            ctx: ctx.clone(),
            codec,
            router,
            hub: hub.clone(),
        };
        let reader = tokio::spawn(connection.read(stream));

        Ok(ConnectionTasks {
            context: ctx,
            reader,
            writer,
        })
    }

    async fn read<S>(self, mut stream: SplitStream<WebSocketStream<S>>) -> ReadSummary
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Unregistration must happen however the pump ends
        let pumped = AssertUnwindSafe(pump_inbound(
            &mut stream,
            &self.ctx,
            &*self.codec,
            &*self.router,
        ))
        .catch_unwind()
        .await;

        let summary = match pumped {
            Ok(summary) => summary,
            Err(_) => {
                tracing::error!(
                    group = self.ctx.group(),
                    id = self.ctx.id(),
                    serial = self.ctx.serial(),
                    "Router panicked, closing connection"
                );
                ReadSummary {
                    reason: CloseReason::RouterPanic,
                    ..ReadSummary::default()
                }
            }
        };

        if let Err(e) = self.hub.unregister(self.ctx.key(), self.ctx.serial()).await {
            tracing::warn!(
                group = self.ctx.group(),
                id = self.ctx.id(),
                error = %e,
                "Failed to unregister connection"
            );
        }
        drop(stream);

        tracing::info!(
            group = self.ctx.group(),
            id = self.ctx.id(),
            serial = self.ctx.serial(),
            reason = ?summary.reason,
            frames = summary.frames_received,
            "Connection closed"
        );

        summary
    }
}

/// Decode inbound frames and route them until the stream closes
///
/// Shared by server connections and [`HubClient`](crate::client::HubClient).
pub(crate) async fn pump_inbound<St, C, R>(
    stream: &mut St,
    ctx: &ConnectionContext,
    codec: &C,
    router: &R,
) -> ReadSummary
where
    St: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    C: Codec,
    R: Router<C::Message> + ?Sized,
{
    let mut summary = ReadSummary::default();

    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) if is_retryable(&e) => {
                tracing::debug!(
                    group = ctx.group(),
                    id = ctx.id(),
                    error = %e,
                    "Retryable read error"
                );
                continue;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    group = ctx.group(),
                    id = ctx.id(),
                    error = %e,
                    "Read error, closing connection"
                );
                summary.reason = CloseReason::Error;
                break;
            }
            None => {
                summary.reason = CloseReason::EndOfStream;
                break;
            }
        };

        let payload = match message {
            Message::Binary(data) => data,
            Message::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            Message::Close(_) => {
                summary.reason = CloseReason::CloseFrame;
                break;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        summary.frames_received += 1;
        tracing::debug!(
            group = ctx.group(),
            id = ctx.id(),
            len = payload.len(),
            "Frame received"
        );

        match codec.from_wire(payload) {
            Ok((kind, message)) => router.route(ctx, kind, message),
            Err(e) => {
                summary.decode_errors += 1;
                tracing::warn!(
                    group = ctx.group(),
                    id = ctx.id(),
                    error = %e,
                    "Failed to decode frame"
                );
            }
        }
    }

    summary
}

async fn write_loop<S>(
    ctx: ConnectionContext,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Bytes>,
) -> u64
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frames_sent = 0u64;

    while let Some(payload) = outbound.recv().await {
        let len = payload.len();
        match sink.send(Message::Binary(payload)).await {
            Ok(()) => {
                frames_sent += 1;
                tracing::debug!(group = ctx.group(), id = ctx.id(), len = len, "Frame sent");
            }
            Err(e) => {
                tracing::warn!(group = ctx.group(), id = ctx.id(), error = %e, "Write failed");
            }
        }
    }

    // Queue closed by the registry
    if let Err(e) = sink.send(Message::Close(None)).await {
        tracing::debug!(group = ctx.group(), id = ctx.id(), error = %e, "Close frame not sent");
    }
    if let Err(e) = sink.close().await {
        tracing::debug!(group = ctx.group(), id = ctx.id(), error = %e, "Socket close failed");
    }

    tracing::debug!(
        group = ctx.group(),
        id = ctx.id(),
        frames = frames_sent,
        "Write loop finished"
    );

    frames_sent
}

fn is_retryable(error: &tungstenite::Error) -> bool {
    match error {
        tungstenite::Error::Io(e) => matches!(
            e.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
        ),
        _ => false,
    }
}
