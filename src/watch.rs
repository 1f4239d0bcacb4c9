//! Periodic reachability re-checks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::service::ServerService;

/// Load the fleet, then ping every known address once per `period` until
/// `shutdown` resolves.
///
/// Pings go through [`ServerService::ping`] one at a time, so each emits its
/// usual placeholder and terminal state. A failed list is retried on the
/// next tick instead of pinging an empty fleet.
pub async fn run<F>(service: Arc<ServerService>, period: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut loaded = false;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("watch stopped");
                return;
            }
            _ = ticker.tick() => {
                if !loaded {
                    loaded = !service.list().await.is_error();
                    continue;
                }
                sweep(&service).await;
            }
        }
    }
}

/// Ping every address in the current snapshot once, in display order.
pub async fn sweep(service: &ServerService) -> usize {
    let addresses: Vec<String> = service
        .snapshot()
        .servers()
        .iter()
        .map(|s| s.ip_address.clone())
        .collect();

    let mut failures = 0;
    for address in &addresses {
        if service.ping(address).await.is_error() {
            failures += 1;
        }
    }
    tracing::debug!(checked = addresses.len(), failures, "sweep finished");
    failures
}
