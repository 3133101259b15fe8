//! Hub server listener
//!
//! Handles the TCP accept loop, the WebSocket upgrade, and hands upgraded sockets to
//! [`Connection::accept`].

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderValue, StatusCode};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use crate::codec::Codec;
use crate::drive::timestamped;
use crate::error::{Error, Result};
use crate::registry::{ConnectionKey, Hub};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::Router;

/// WebSocket hub server
///
/// Accepts connections on `ws://<bind_addr>/<prefix>/<group>/<id>` and registers each
/// one with the given [`Hub`].
pub struct HubServer<C, R> {
    config: ServerConfig,
    hub: Hub,
    codec: Arc<C>,
    router: Arc<R>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<C, R> HubServer<C, R>
where
    C: Codec,
    R: Router<C::Message>,
{
    /// Create a new server
    pub fn new(config: ServerConfig, hub: Hub, codec: C, router: R) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            hub,
            codec: Arc::new(codec),
            router: Arc::new(router),
            connection_semaphore,
        }
    }

    /// Get a reference to the hub
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(addr = ?listener.local_addr().ok(), "Hub server listening");
        self.accept_loop(&listener).await
    }

    /// Serve connections from an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(addr = ?listener.local_addr().ok(), "Hub server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        tracing::debug!(peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(peer = %peer_addr, error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let hub = self.hub.clone();
        let codec = Arc::clone(&self.codec);
        let router = Arc::clone(&self.router);

        tokio::spawn(async move {
            if let Err(e) = serve_connection(socket, peer_addr, config, hub, codec, router, permit).await {
                tracing::warn!(peer = %peer_addr, error = %e, "Connection rejected");
            }
        });
    }
}

async fn serve_connection<C, R>(
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    hub: Hub,
    codec: Arc<C>,
    router: Arc<R>,
    _permit: Option<OwnedSemaphorePermit>,
) -> Result<()>
where
    C: Codec,
    R: Router<C::Message>,
{
    let (ws, key) = upgrade(socket, &config).await?;
    let tasks = Connection::accept(&hub, ws, key.clone(), Some(peer_addr), codec, router).await?;

    tracing::info!(
        peer = %peer_addr,
        group = %key.group,
        id = %key.id,
        serial = tasks.context.serial(),
        "Connection accepted"
    );

    if let Some(delay) = config.greeting_delay {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = hub
                .send_to(&key.id, &key.group, timestamped("Send message"))
                .await
            {
                tracing::debug!(group = %key.group, id = %key.id, error = %e, "Greeting not sent");
            }
        });
    }

    // Hold the connection permit until both sides are done
    if let Err(e) = tasks.reader.await {
        tracing::error!(peer = %peer_addr, error = %e, "Read task failed");
    }
    if let Err(e) = tasks.writer.await {
        tracing::error!(peer = %peer_addr, error = %e, "Write task failed");
    }
    Ok(())
}

async fn upgrade(
    socket: TcpStream,
    config: &ServerConfig,
) -> Result<(WebSocketStream<TcpStream>, ConnectionKey)> {
    let prefix = config.path_prefix.clone();
    let target: Arc<Mutex<Option<ConnectionKey>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&target);

    let callback = move |req: &Request, mut resp: Response| -> std::result::Result<Response, ErrorResponse> {
        let path = req.uri().path();
        let Some(key) = parse_path(path, &prefix) else {
            tracing::warn!(path = path, "Upgrade rejected: unknown path");
            return Err(not_found(path));
        };

        if let Some(protocol) = first_protocol(req.headers()) {
            resp.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
        }

        if let Ok(mut guard) = slot.lock() {
            *guard = Some(key);
        }
        Ok(resp)
    };

    let ws = tokio::time::timeout(config.handshake_timeout, accept_hdr_async(socket, callback))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    let key = target
        .lock()
        .ok()
        .and_then(|mut guard| guard.take())
        .ok_or_else(|| Error::InvalidPath(String::new()))?;

    Ok((ws, key))
}

/// Extract the connection key from `/<prefix>/<group>/<id>`
///
/// Returns `None` when the prefix does not match, a segment is empty, or extra
/// segments follow the identity. A single trailing slash is allowed.
pub fn parse_path(path: &str, prefix: &str) -> Option<ConnectionKey> {
    let mut segments = path.strip_prefix('/').unwrap_or(path).split('/');

    for expected in prefix.split('/').filter(|s| !s.is_empty()) {
        if segments.next()? != expected {
            return None;
        }
    }

    let group = segments.next()?;
    let id = segments.next()?;
    if group.is_empty() || id.is_empty() {
        return None;
    }

    match segments.next() {
        None | Some("") if segments.next().is_none() => Some(ConnectionKey::new(group, id)),
        _ => None,
    }
}

fn first_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    let offered = headers.get(SEC_WEBSOCKET_PROTOCOL)?.to_str().ok()?;
    let first = offered.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    HeaderValue::from_str(first).ok()
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("No hub route for {}", path)));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
