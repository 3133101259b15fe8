//! Connection registry and message dispatcher
//!
//! The registry files every live connection under `group → id` and routes payloads to
//! them. Membership is changed only by a single [`Dispatcher`] task. Callers hold a
//! cloneable [`Hub`] and submit requests through bounded queues.
//!
//! # Architecture
//!
//! ```text
//!        Hub (cloneable)
//!   ┌──────────────────────┐
//!   │ register    ─────────┼── queue ──┐
//!   │ unregister  ─────────┼── queue ──┴──► Dispatcher ── publishes ──┐
//!   │                      │               (groups: group → id → handle)
//!   │ send_to     ─────────┼── queue ─────► unicast lane   ◄── snapshot ┤
//!   │ send_to_group ───────┼── queue ─────► group lane     ◄── snapshot ┤
//!   │ send_to_all ─────────┼── queue ─────► broadcast lane ◄── snapshot ┘
//!   └──────────────────────┘                     │
//!                                                ▼
//!                                  per-connection outbound queues → write tasks
//! ```
//!
//! # Delivery lanes
//!
//! Each delivery class is consumed by its own lane task, which resolves targets against
//! the latest membership snapshot. A connection that stops draining its queue stalls
//! only the lane feeding it; registration and the other classes keep running.
//! Within a class, payloads reach a given connection in submission order.

pub mod config;
pub mod entry;
pub mod error;
pub(crate) mod lane;
pub mod message;
pub mod policy;
pub mod store;

pub use config::HubConfig;
pub use entry::{ConnectionHandle, ConnectionKey};
pub use error::HubError;
pub use message::{AddressedMessage, BroadcastMessage, GroupMessage};
pub use policy::OverflowPolicy;
pub use store::{Dispatcher, Hub};
