// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::source::MetadataSource;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Poll the version of `source` every `interval` and await `on_change` with every new version.
///
/// No version has been seen when polling starts, so the first successful poll fires. A failed
/// poll is logged and retried on the next tick. Never returns.
pub async fn watch<S, F, Fut>(source: &S, interval: Duration, mut on_change: F)
where
    S: MetadataSource,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut seen: Option<String> = None;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match source.version().await {
            Ok(version) if seen.as_deref() == Some(version.as_str()) => {}
            Ok(version) => {
                debug!("Metadata version changed to {version}");
                seen = Some(version.clone());
                on_change(version).await;
            }
            Err(e) => warn!("Failed to poll metadata version: {e}"),
        }
    }
}
