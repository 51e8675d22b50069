use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use common::access::AccessInfo;

use super::managed::ManagedDriver;

/// How long to wait between datastore probes
pub const READINESS_INTERVAL: Duration = Duration::from_secs(5);

/// Probe the managed datastore in the background until it answers.
///
/// The returned receiver resolves with `Ok(())` once a probe succeeds. If
///  shutdown is signalled first the sender is dropped without sending, so the
///  receiver resolves with an error instead. With no driver there is nothing
///  to wait for and the signal fires immediately.
pub fn spawn_readiness_poller(
    driver: Option<Arc<dyn ManagedDriver>>,
    info: Option<AccessInfo>,
    mut shutdown_rx: watch::Receiver<()>,
) -> oneshot::Receiver<()> {
    let (ready_tx, ready_rx) = oneshot::channel();

    let Some(driver) = driver else {
        let _ = ready_tx.send(());
        return ready_rx;
    };

    tokio::spawn(async move {
        loop {
            let result = tokio::select! {
                result = driver.test(info.as_ref()) => result,
                _ = shutdown_rx.changed() => {
                    tracing::debug!("readiness poller for {} shutting down", driver.name());
                    return;
                }
            };

            match result {
                Ok(()) => {
                    tracing::info!("{} data store connection OK", driver.name());
                    let _ = ready_tx.send(());
                    return;
                }
                Err(e) => tracing::info!("Failed to test data store connection: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(READINESS_INTERVAL) => {}
                _ = shutdown_rx.changed() => {
                    tracing::debug!("readiness poller for {} shutting down", driver.name());
                    return;
                }
            }
        }
    });

    ready_rx
}
