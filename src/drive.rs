//! Periodic load exercises for a running hub
//!
//! These tasks push timestamped payloads through the group and broadcast paths at a
//! fixed interval, which is handy for watching a live deployment or soak-testing the
//! dispatcher. Each task stops once the hub refuses a submission.

use std::time::Duration;

use bytes::Bytes;
use chrono::Local;
use tokio::task::JoinHandle;

use crate::registry::Hub;

/// Default interval of the group exercise
pub const GROUP_INTERVAL: Duration = Duration::from_secs(20);

/// Default interval of the broadcast exercise
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(25);

/// `"<prefix> ----<local time>"` as a payload
pub fn timestamped(prefix: &str) -> Bytes {
    Bytes::from(format!(
        "{} ----{}",
        prefix,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ))
}

/// Send a timestamped payload to `group` every `interval`
pub fn spawn_group_exercise(hub: Hub, group: impl Into<String>, interval: Duration) -> JoinHandle<()> {
    let group = group.into();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            if let Err(e) = hub.send_to_group(&group, timestamped("SendGroup message")).await {
                tracing::warn!(group = %group, error = %e, "Group exercise stopped");
                break;
            }
        }
    })
}

/// Send a timestamped payload to every connection every `interval`, logging hub info
pub fn spawn_broadcast_exercise(hub: Hub, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            if let Err(e) = hub.send_to_all(timestamped("SendAll message")).await {
                tracing::warn!(error = %e, "Broadcast exercise stopped");
                break;
            }
            tracing::info!(info = %hub.info(), "Hub info");
        }
    })
}
