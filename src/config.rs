use serde_derive::Deserialize;

use crate::error::Result;

/// Process-wide configuration for a consensus peer, loaded the same way the teacher's
/// `client_db.rs` loads its own `Config`: a file source overlaid with environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// This peer's index into `peers`.
    pub id: u64,
    /// Every peer's gRPC listen address, including this one's, in a fixed, globally agreed order.
    pub peers: Vec<String>,
    #[serde(default)]
    pub tuning: Tuning,
}

/// The tuning constants from spec §6.5, with the spec's defaults baked in so a config file only
/// needs to override what it cares about.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub heartbeat_interval_ms: u64,
    pub election_timeout_lo_ms: u64,
    pub election_timeout_hi_ms: u64,
    pub applier_poll_ms: u64,
    pub paxos_backoff_base_ms: u64,
    pub paxos_backoff_jitter_ms: u64,
    pub paxos_pending_poll_base_ms: u64,
    pub paxos_pending_poll_max_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 105,
            election_timeout_lo_ms: 500,
            election_timeout_hi_ms: 800,
            applier_poll_ms: 50,
            paxos_backoff_base_ms: 100,
            paxos_backoff_jitter_ms: 100,
            paxos_pending_poll_base_ms: 20,
            paxos_pending_poll_max_ms: 2000,
        }
    }
}

impl Config {
    /// Loads configuration from `file` (a path without extension, per the `config` crate's
    /// convention) overlaid with `RAFTPAX_`-prefixed environment variables.
    pub fn load(file: &str) -> Result<Self> {
        let c = config::Config::builder()
            .add_source(config::File::with_name(file))
            .add_source(config::Environment::with_prefix("RAFTPAX").separator("__"))
            .build()?;
        Ok(c.try_deserialize()?)
    }
}
