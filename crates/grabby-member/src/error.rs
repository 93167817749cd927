//! Error types for the member layer.

use thiserror::Error;

/// Failure signalled by a single member's error source.
///
/// The fan-in engine recovers from all of these locally by dropping the
/// member; none of them reach the application directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemberError {
    #[error("connection to {address} lost: {reason}")]
    Disconnected { address: String, reason: String },

    #[error("read from {address} failed: {reason}")]
    Read { address: String, reason: String },

    #[error("message stream from {address} ended")]
    Ended { address: String },
}

impl MemberError {
    /// Address of the member that failed.
    pub fn address(&self) -> &str {
        match self {
            MemberError::Disconnected { address, .. }
            | MemberError::Read { address, .. }
            | MemberError::Ended { address } => address,
        }
    }
}

/// Failure to open a member handle for an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot connect to {address} for queue {queue}: {reason}")]
pub struct ConnectionError {
    pub address: String,
    pub queue: String,
    pub reason: String,
}

impl ConnectionError {
    pub fn new(address: &str, queue: &str, reason: impl Into<String>) -> Self {
        Self {
            address: address.to_string(),
            queue: queue.to_string(),
            reason: reason.into(),
        }
    }
}
