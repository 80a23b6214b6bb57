//! A `TransportAdapter` stub for a peer-specific RPC client. Wire
//! transport is an explicit non-goal (§1); this exists so the Supervisor
//! has a concrete type to wire in place of [`crate::LoopbackTransport`]
//! once a real RPC client is available, without any other component
//! needing to change.

use std::time::Duration;

use async_trait::async_trait;
use meshvault_core::NodeId;

use crate::adapter::{ProbeResult, TransportAdapter};
use crate::error::{Result, TransportError};

/// Connection details for a peer's agent, sufficient for a real RPC client
/// to dial it. Not used by this stub beyond storing it for later.
#[derive(Clone, Debug)]
pub struct AgentEndpoint {
    pub address: String,
    pub port: u16,
}

/// Stub `TransportAdapter`. Every call fails with
/// [`TransportError::Unreachable`] since no RPC client is wired in —
/// replace with a real implementation when the wire protocol is chosen.
#[derive(Clone, Default)]
pub struct LocalAgentTransport;

impl LocalAgentTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportAdapter for LocalAgentTransport {
    async fn put_chunk(&self, node: &NodeId, _key: &str, _bytes: &[u8], _timeout: Duration) -> Result<()> {
        Err(TransportError::Unreachable(node.to_string()))
    }

    async fn get_chunk(&self, node: &NodeId, _key: &str, _timeout: Duration) -> Result<Vec<u8>> {
        Err(TransportError::Unreachable(node.to_string()))
    }

    async fn probe(&self, node: &NodeId, _timeout: Duration) -> Result<ProbeResult> {
        Err(TransportError::Unreachable(node.to_string()))
    }
}
