//! Supervisor: wires the Blob Store, Metadata Store, Chunk Pipeline,
//! Membership & Health, Placement Policy, Replica Manager, and
//! Reassembler into one running system, and exposes the operations an
//! HTTP layer (explicitly out of scope here) would call.

mod config;
mod corruption;
mod error;
mod stats;
mod supervisor;

pub use config::{Args, SupervisorConfig};
pub use corruption::ReplicaManagerCorruptionReporter;
pub use error::{Result, SupervisorError};
pub use stats::SystemStats;
pub use supervisor::Supervisor;
