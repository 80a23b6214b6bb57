//! The Transport Adapter contract (§4.6): ship chunks and probe peers,
//! with explicit per-call timeouts. The adapter never retries silently —
//! that policy belongs to the caller (Replica Manager, Reassembler).

use std::time::Duration;

use async_trait::async_trait;
use meshvault_core::NodeId;

use crate::error::{Result, TransportError};

/// Default timeout for [`TransportAdapter::probe`] (§4.6).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for [`TransportAdapter::put_chunk`] / `get_chunk`.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a successful probe: round-trip time, used by Placement
/// Policy's latency scoring.
#[derive(Clone, Copy, Debug)]
pub struct ProbeResult {
    pub latency: Duration,
}

#[async_trait]
pub trait TransportAdapter: Send + Sync {
    async fn put_chunk(&self, node: &NodeId, key: &str, bytes: &[u8], timeout: Duration) -> Result<()>;

    async fn get_chunk(&self, node: &NodeId, key: &str, timeout: Duration) -> Result<Vec<u8>>;

    async fn probe(&self, node: &NodeId, timeout: Duration) -> Result<ProbeResult>;
}

/// Wrap a future so that exceeding `timeout` surfaces as
/// [`TransportError::Timeout`] rather than hanging forever or panicking —
/// every concrete `TransportAdapter` should route its RPCs through this so
/// the "no silent retries, explicit timeouts" contract holds uniformly.
pub async fn with_timeout<T>(
    node: &NodeId,
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            node: node.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}
