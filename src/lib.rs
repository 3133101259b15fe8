//! Group-aware WebSocket connection hub
//!
//! `wshub` accepts WebSocket connections, files each one under a named group and an
//! identity, and lets the rest of the application address payloads to a single
//! connection, to every member of a group, or to every connection.
//!
//! ```text
//!   HubServer ──accept──► Connection::accept ──register──► Dispatcher
//!                              │    │                        │ (owns group → id → handle)
//!                        read task  write task ◄──outbound───┤
//!                              │                             │
//!                          Codec → Router          Hub::send_to / send_to_group / send_to_all
//! ```
//!
//! The [`registry::Dispatcher`] is the only owner of group membership. Everything else
//! talks to it through a cloneable [`registry::Hub`] handle.
//!
//! # Example
//! ```no_run
//! use wshub::codec::RawCodec;
//! use wshub::server::handler::ConnectionContext;
//! use wshub::{Hub, HubConfig, HubServer, ServerConfig};
//!
//! # async fn example() -> wshub::error::Result<()> {
//! let (hub, _dispatcher) = Hub::spawn(HubConfig::default());
//!
//! let router = |ctx: &ConnectionContext, kind: u32, msg: bytes::Bytes| {
//!     println!("[{}/{}] kind={} len={}", ctx.group(), ctx.id(), kind, msg.len());
//! };
//!
//! let server = HubServer::new(ServerConfig::default(), hub, RawCodec, router);
//! server.run().await
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod drive;
pub mod error;
pub mod registry;
pub mod server;
pub mod stats;

pub use client::{ClientConfig, HubClient};
pub use codec::{Codec, CodecError};
pub use error::{Error, Result};
pub use registry::{Hub, HubConfig, HubError, OverflowPolicy};
pub use server::{HubServer, ServerConfig};
pub use stats::HubInfo;
