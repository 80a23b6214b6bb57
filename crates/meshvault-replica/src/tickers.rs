//! Background tickers for `verify()` and `rebalance()` — independent
//! tasks, each with its own interval and cancellation token (§9 Design
//! Notes: "never as free-running loops without a stop signal").

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::manager::ReplicaManager;

pub fn spawn_verify_ticker(
    manager: Arc<ReplicaManager>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("verify ticker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = manager.verify().await {
                        tracing::error!(error = %e, "verify cycle failed");
                    }
                }
            }
        }
    })
}

pub fn spawn_rebalance_ticker(
    manager: Arc<ReplicaManager>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("rebalance ticker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = manager.rebalance().await {
                        tracing::error!(error = %e, "rebalance cycle failed");
                    }
                }
            }
        }
    })
}
