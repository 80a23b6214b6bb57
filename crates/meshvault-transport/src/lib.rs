//! Transport Adapter contract (§4.6): `put_chunk` / `get_chunk` / `probe`
//! with explicit per-call timeouts and no silent retries. Two
//! implementations ship here: [`LoopbackTransport`] (in-process, for
//! tests and single-process demos) and [`LocalAgentTransport`] (a stub
//! extension point — wire transport itself is an explicit non-goal).

mod adapter;
mod error;
mod loopback;
mod local_agent;

pub use adapter::{
    with_timeout, ProbeResult, TransportAdapter, DEFAULT_PROBE_TIMEOUT, DEFAULT_TRANSFER_TIMEOUT,
};
pub use error::{Result, TransportError};
pub use local_agent::{AgentEndpoint, LocalAgentTransport};
pub use loopback::{LoopbackTransport, NodeBehavior};
