//! Replicated consensus cores: a Raft leader-election/log-replication engine and a Multi-Paxos
//! instance log, each usable over either a gRPC transport or an in-process loopback transport
//! built for deterministic tests.

pub mod config;
pub mod error;
pub mod event;
pub mod paxos;
pub mod persist;
pub mod proto;
pub mod raft;
pub mod transport;

/// Identifies a peer within a cluster. Peers are addressed by position in the `peers` list each
/// engine is constructed with; this is that position, not a network address.
pub type PeerId = u64;
