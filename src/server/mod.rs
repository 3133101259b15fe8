//! WebSocket server side of the hub
//!
//! - [`listener`]: TCP accept loop and WebSocket upgrade
//! - [`connection`]: per-connection read and write tasks
//! - [`handler`]: the [`Router`](handler::Router) trait applications implement

pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use connection::{CloseReason, Connection, ConnectionTasks, ReadSummary};
pub use handler::{ConnectionContext, Router};
pub use listener::{parse_path, HubServer};
