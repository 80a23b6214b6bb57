//! An in-process `TransportAdapter` backed by a `DashMap`, used for tests
//! and single-process demos where every "node" is really the same
//! process. Mirrors the reference crate's `MemoryBlockStore` in spirit:
//! no network, but the same contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use meshvault_core::NodeId;
use parking_lot::Mutex;

use crate::adapter::{with_timeout, ProbeResult, TransportAdapter};
use crate::error::{Result, TransportError};

/// Per-node simulated latency and reachability, settable by tests to
/// exercise timeout and failure paths deterministically.
#[derive(Clone, Copy, Debug)]
pub struct NodeBehavior {
    pub latency: Duration,
    pub reachable: bool,
}

impl Default for NodeBehavior {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(1),
            reachable: true,
        }
    }
}

#[derive(Clone, Default)]
pub struct LoopbackTransport {
    blobs: Arc<DashMap<(NodeId, String), Vec<u8>>>,
    behavior: Arc<Mutex<HashMap<NodeId, NodeBehavior>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure how `node` behaves for subsequent calls. Used by tests to
    /// simulate an unreachable node or an artificially slow one.
    pub fn set_behavior(&self, node: NodeId, behavior: NodeBehavior) {
        self.behavior.lock().insert(node, behavior);
    }

    fn behavior_for(&self, node: &NodeId) -> NodeBehavior {
        self.behavior.lock().get(node).copied().unwrap_or_default()
    }
}

#[async_trait]
impl TransportAdapter for LoopbackTransport {
    async fn put_chunk(&self, node: &NodeId, key: &str, bytes: &[u8], timeout: Duration) -> Result<()> {
        let behavior = self.behavior_for(node);
        with_timeout(node, timeout, async {
            tokio::time::sleep(behavior.latency).await;
            if !behavior.reachable {
                return Err(TransportError::Unreachable(node.to_string()));
            }
            self.blobs.insert((node.clone(), key.to_string()), bytes.to_vec());
            Ok(())
        })
        .await
    }

    async fn get_chunk(&self, node: &NodeId, key: &str, timeout: Duration) -> Result<Vec<u8>> {
        let behavior = self.behavior_for(node);
        with_timeout(node, timeout, async {
            tokio::time::sleep(behavior.latency).await;
            if !behavior.reachable {
                return Err(TransportError::Unreachable(node.to_string()));
            }
            self.blobs
                .get(&(node.clone(), key.to_string()))
                .map(|v| v.clone())
                .ok_or_else(|| TransportError::NotFound {
                    node: node.to_string(),
                    key: key.to_string(),
                })
        })
        .await
    }

    async fn probe(&self, node: &NodeId, timeout: Duration) -> Result<ProbeResult> {
        let behavior = self.behavior_for(node);
        with_timeout(node, timeout, async {
            tokio::time::sleep(behavior.latency).await;
            if !behavior.reachable {
                return Err(TransportError::Unreachable(node.to_string()));
            }
            Ok(ProbeResult {
                latency: behavior.latency,
            })
        })
        .await
    }
}
