//! Hub client
//!
//! Connects to a hub server as a member of a group, routes everything the server sends
//! through a codec and router, and sends encoded messages back.

pub mod config;

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::codec::Codec;
use crate::error::Result;
use crate::registry::ConnectionKey;
use crate::server::connection::{pump_inbound, CloseReason, ReadSummary};
use crate::server::handler::{ConnectionContext, Router};

pub use config::ClientConfig;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Client connection to a hub server
///
/// # Example
/// ```no_run
/// use wshub::client::{ClientConfig, HubClient};
/// use wshub::codec::TaggedCodec;
/// use wshub::server::handler::ConnectionContext;
///
/// # async fn example() -> wshub::error::Result<()> {
/// let config = ClientConfig::new("127.0.0.1", 8080, "lobby", "alice");
/// let router = |_ctx: &ConnectionContext, kind: u32, msg: bytes::Bytes| {
///     println!("kind={} len={}", kind, msg.len());
/// };
///
/// let mut client = HubClient::connect(config, TaggedCodec, router).await?;
/// client.send(1, &bytes::Bytes::from_static(b"hi")).await?;
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct HubClient<C: Codec> {
    context: ConnectionContext,
    codec: Arc<C>,
    sink: WsSink,
    reader: JoinHandle<ReadSummary>,
}

impl<C: Codec> HubClient<C> {
    /// Dial the server and start routing inbound frames
    pub async fn connect<R>(config: ClientConfig, codec: C, router: R) -> Result<Self>
    where
        R: Router<C::Message>,
    {
        let url = config.url();
        let (ws, _response) = connect_async(url.as_str()).await?;
        tracing::info!(url = %url, "Connected to hub");

        let context = ConnectionContext::new(ConnectionKey::new(config.group, config.id), 0, None);
        let codec = Arc::new(codec);
        let (sink, mut stream) = ws.split();

        let reader = {
            let context = context.clone();
            let codec = Arc::clone(&codec);
            tokio::spawn(async move {
                let summary = pump_inbound(&mut stream, &context, &*codec, &router).await;
                tracing::info!(
                    group = context.group(),
                    id = context.id(),
                    reason = ?summary.reason,
                    "Disconnected from hub"
                );
                summary
            })
        };

        Ok(Self {
            context,
            codec,
            sink,
            reader,
        })
    }

    /// Group and identity this client registered as
    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Encode and send one message
    pub async fn send(&mut self, kind: u32, message: &C::Message) -> Result<()> {
        let payload = self.codec.to_wire(kind, message)?;
        self.send_raw(payload).await
    }

    /// Send an already encoded payload as one binary frame
    pub async fn send_raw(&mut self, payload: Bytes) -> Result<()> {
        self.sink.send(Message::Binary(payload)).await?;
        Ok(())
    }

    /// Check if the read side is still running
    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished()
    }

    /// Close the connection and wait for the read side to finish
    pub async fn close(mut self) -> Result<ReadSummary> {
        self.sink.send(Message::Close(None)).await?;
        match self.reader.await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::warn!(
                    group = self.context.group(),
                    id = self.context.id(),
                    error = %e,
                    "Client read task failed"
                );
                Ok(ReadSummary {
                    reason: if e.is_panic() {
                        CloseReason::RouterPanic
                    } else {
                        CloseReason::Error
                    },
                    ..ReadSummary::default()
                })
            }
        }
    }
}
