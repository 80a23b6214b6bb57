//! Supervisor configuration: a plain `struct` with a `Default` impl,
//! overlaid by CLI flags (`clap::Parser`, each with an `env` fallback) and
//! an optional layered config file — the same split the reference crate
//! uses between `GatewayConfig` and its `main.rs` `Args`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use meshvault_membership::Strategy;
use serde::{Deserialize, Serialize};

/// Supervisor-wide configuration. Constructed via [`SupervisorConfig::load`]
/// in `meshvaultd`, or directly via `Default`/struct-update syntax in tests
/// and embedders.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Root directory for the filesystem Blob Store and metadata file.
    /// Ignored when `memory_store` is set.
    pub data_dir: PathBuf,
    /// Default Chunk Pipeline window size in bytes (§4.1).
    pub chunk_size: u32,
    /// Desired replica count for newly-registered chunks (§4.4).
    pub default_replica_count: u32,
    /// Retry cap for a single replica placement attempt (§4.4).
    pub retry_cap: u32,
    /// Placement Policy strategy (§4.3).
    pub placement_strategy: Strategy,
    /// Membership heartbeat interval, seconds (§4.2).
    pub heartbeat_interval_secs: u64,
    /// Stale-heartbeat timeout, seconds (§4.2).
    pub node_timeout_secs: u64,
    /// `verify()` ticker interval, seconds (§4.4).
    pub verify_interval_secs: u64,
    /// How stale `last_verified` must be before re-verifying, seconds (§4.4).
    pub verify_staleness_secs: u64,
    /// `rebalance()` ticker interval, seconds (§4.4).
    pub rebalance_interval_secs: u64,
    /// Max concurrent chunk fetchers per reassembly job (§4.5).
    pub reassembly_max_fetchers: usize,
    /// Bounded reassembly job history length (§4.5).
    pub reassembly_history_cap: usize,
    /// Use in-memory metadata/blob stores instead of the filesystem (for
    /// tests and ephemeral demos — data does not persist across restarts).
    pub memory_store: bool,
    /// Enable debug-level logging.
    pub debug: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./meshvault-data"),
            chunk_size: 1024 * 1024,
            default_replica_count: meshvault_replica::DEFAULT_REPLICA_COUNT,
            retry_cap: meshvault_replica::DEFAULT_RETRY_CAP,
            placement_strategy: Strategy::Balanced,
            heartbeat_interval_secs: meshvault_membership::DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            node_timeout_secs: meshvault_membership::DEFAULT_NODE_TIMEOUT.as_secs(),
            verify_interval_secs: meshvault_replica::DEFAULT_VERIFY_INTERVAL.as_secs(),
            verify_staleness_secs: meshvault_replica::DEFAULT_VERIFY_STALENESS.as_secs(),
            rebalance_interval_secs: meshvault_replica::DEFAULT_REBALANCE_INTERVAL.as_secs(),
            reassembly_max_fetchers: meshvault_reassembler::DEFAULT_MAX_FETCHERS,
            reassembly_history_cap: meshvault_reassembler::DEFAULT_HISTORY_CAP,
            memory_store: false,
            debug: false,
        }
    }
}

impl SupervisorConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }

    pub fn verify_interval(&self) -> Duration {
        Duration::from_secs(self.verify_interval_secs)
    }

    pub fn verify_staleness(&self) -> Duration {
        Duration::from_secs(self.verify_staleness_secs)
    }

    pub fn rebalance_interval(&self) -> Duration {
        Duration::from_secs(self.rebalance_interval_secs)
    }

    /// Layer an optional `meshvaultd.toml` under the process environment
    /// (`MESHVAULT_*`), then fold in explicit CLI flags from `args`. File
    /// and environment values are optional; CLI flags always win.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let layered = ::config::Config::builder()
            .add_source(::config::File::with_name("meshvaultd").required(false))
            .add_source(::config::Environment::with_prefix("MESHVAULT").separator("__"))
            .build()?;

        let mut cfg: Self = match layered.try_deserialize() {
            Ok(cfg) => cfg,
            Err(_) => Self::default(),
        };

        if let Some(data_dir) = &args.data_dir {
            cfg.data_dir = data_dir.clone();
        }
        if let Some(chunk_size) = args.chunk_size {
            cfg.chunk_size = chunk_size;
        }
        if let Some(count) = args.replica_count {
            cfg.default_replica_count = count;
        }
        if let Some(strategy) = &args.placement_strategy {
            cfg.placement_strategy = parse_strategy(strategy)?;
        }
        if args.memory_store {
            cfg.memory_store = true;
        }
        if args.debug {
            cfg.debug = true;
        }
        Ok(cfg)
    }
}

/// CLI flags, each with an `env` fallback, overlaid on [`SupervisorConfig`]
/// by [`SupervisorConfig::load`].
#[derive(Parser, Debug)]
#[command(name = "meshvaultd")]
#[command(about = "Distributed chunked file store supervisor")]
#[command(version)]
pub struct Args {
    /// Root directory for on-disk storage
    #[arg(long, env = "MESHVAULT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Chunk Pipeline window size in bytes
    #[arg(long, env = "MESHVAULT_CHUNK_SIZE")]
    pub chunk_size: Option<u32>,

    /// Desired replica count for new chunks
    #[arg(long, env = "MESHVAULT_REPLICA_COUNT")]
    pub replica_count: Option<u32>,

    /// Placement Policy strategy: balanced, performance, reliability, or capacity
    #[arg(long, env = "MESHVAULT_PLACEMENT_STRATEGY")]
    pub placement_strategy: Option<String>,

    /// Use in-memory storage (for testing, data will not persist)
    #[arg(long, env = "MESHVAULT_MEMORY_STORE")]
    pub memory_store: bool,

    /// Enable debug logging
    #[arg(short, long, env = "MESHVAULT_DEBUG")]
    pub debug: bool,
}

fn parse_strategy(s: &str) -> anyhow::Result<Strategy> {
    match s.to_ascii_lowercase().as_str() {
        "balanced" => Ok(Strategy::Balanced),
        "performance" => Ok(Strategy::Performance),
        "reliability" => Ok(Strategy::Reliability),
        "capacity" => Ok(Strategy::Capacity),
        other => anyhow::bail!("unknown placement strategy: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_component_defaults() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.default_replica_count, meshvault_replica::DEFAULT_REPLICA_COUNT);
        assert_eq!(cfg.placement_strategy, Strategy::Balanced);
        assert!(!cfg.memory_store);
    }
}
