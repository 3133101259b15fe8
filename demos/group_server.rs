//! Group Server - WebSocket hub with group and broadcast exercises
//!
//! Run with: cargo run --example group_server -- [bind_addr]
//!
//! Connect with any WebSocket client at `ws://<bind_addr>/ws/<group>/<id>`. Each new
//! connection is greeted after two seconds. Members of group `leffss` receive a
//! timestamped group message every 20 seconds and every connection receives a broadcast
//! every 25 seconds.
//!
//! Inbound frames use the tagged wire format (first byte is the kind):
//!
//! ```text
//!   kind 1  echo the payload back to the sender
//!   kind 2  relay the payload to the sender's group
//!   kind 3  relay the payload to every connection
//! ```

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;

use wshub::codec::TaggedCodec;
use wshub::drive::{spawn_broadcast_exercise, spawn_group_exercise, BROADCAST_INTERVAL, GROUP_INTERVAL};
use wshub::registry::ConnectionKey;
use wshub::server::handler::ConnectionContext;
use wshub::{Codec, Hub, HubConfig, HubServer, ServerConfig};

const ECHO: u32 = 1;
const GROUP: u32 = 2;
const ALL: u32 = 3;

/// Routed message waiting to be handed to the hub
struct Relay {
    from: ConnectionKey,
    kind: u32,
    payload: Bytes,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wshub=debug".parse()?)
                .add_directive("group_server=debug".parse()?),
        )
        .init();

    let bind_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:8080".to_string())
        .parse()?;

    let (hub, _dispatcher) = Hub::spawn(HubConfig::default());

    // Routers run on the read task, so submissions are forwarded to a relay task
    let (relay_tx, mut relay_rx) = mpsc::unbounded_channel::<Relay>();
    let router = move |ctx: &ConnectionContext, kind: u32, payload: Bytes| {
        let _ = relay_tx.send(Relay {
            from: ctx.key().clone(),
            kind,
            payload,
        });
    };

    let relay_hub = hub.clone();
    tokio::spawn(async move {
        while let Some(relay) = relay_rx.recv().await {
            let wire = match TaggedCodec.to_wire(relay.kind, &relay.payload) {
                Ok(wire) => wire,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot re-encode relay");
                    continue;
                }
            };

            let result = match relay.kind {
                ECHO => relay_hub.send_to(&relay.from.id, &relay.from.group, wire).await,
                GROUP => relay_hub.send_to_group(&relay.from.group, wire).await,
                ALL => relay_hub.send_to_all(wire).await,
                other => {
                    tracing::debug!(from = %relay.from, kind = other, "Ignoring unknown kind");
                    continue;
                }
            };

            if let Err(e) = result {
                tracing::warn!(error = %e, "Relay stopped");
                break;
            }
        }
    });

    spawn_group_exercise(hub.clone(), "leffss", GROUP_INTERVAL);
    spawn_broadcast_exercise(hub.clone(), BROADCAST_INTERVAL);

    let server = HubServer::new(ServerConfig::with_addr(bind_addr), hub, TaggedCodec, router);
    tracing::info!(addr = %bind_addr, "Group server listening");
    server.run().await?;

    Ok(())
}
