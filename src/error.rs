use std::fmt;

/// The crate-wide result alias, matching the teacher's `crate::error::{Result, Error}` pattern.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the plumbing around the consensus cores: construction, transport wiring,
/// and configuration. The Raft and Paxos state machines themselves never return `Result` from
/// their core transition functions (see DESIGN.md) — only this surrounding code can fail.
#[derive(Debug, Clone)]
pub enum Error {
    /// A transport-level failure that does not fit the normal "Call returned false" path, e.g.
    /// the gRPC channel could not be constructed at all.
    Transport(String),
    /// Configuration could not be loaded or was malformed.
    Config(String),
    /// Anything else that should never happen in a correctly wired process.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(msg) => write!(f, "transport error: {msg}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Transport(status.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
