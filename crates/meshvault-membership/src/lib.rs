//! Membership & Health tracking, and the Placement Policy that scores
//! nodes for replica selection.

mod error;
pub mod health;
pub mod placement;

pub use error::{MembershipError, Result};
pub use health::{
    spawn_heartbeat_ticker, transition, MembershipTable, NodeFailureEvent,
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_NODE_TIMEOUT,
};
pub use placement::{
    average_score, clears_rebalance_bar, needs_rebalance, score, select_replica_nodes, Strategy,
};
