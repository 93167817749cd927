//! The member handle surface and the factory that opens handles.

use std::sync::Arc;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};

use crate::error::{ConnectionError, MemberError};
use crate::message::ReadMessage;

/// Read stream for one queue on one cluster member.
///
/// Handles are shared between the membership tracker and the merge
/// engine, so every method takes `&self`. Implementations must register
/// the waker passed to the `poll_*` methods when they return `Pending`.
pub trait MemberHandle: Send + Sync {
    /// Address this handle reads from.
    fn address(&self) -> &str;

    /// Poll for the next message, in the order the member produced them.
    ///
    /// `Ready(None)` means the source has ended and will yield nothing
    /// further.
    fn poll_message(&self, cx: &mut Context<'_>) -> Poll<Option<ReadMessage>>;

    /// Poll the error source. Fires at most once.
    fn poll_error(&self, cx: &mut Context<'_>) -> Poll<MemberError>;

    /// Ask the member to stop reading. Idempotent and non-blocking.
    fn close(&self);
}

/// A member handle shared between owners.
pub type SharedMember = Arc<dyn MemberHandle>;

/// Opens member handles for newly discovered addresses.
pub trait MemberFactory: Send + Sync {
    fn create(
        &self,
        address: &str,
        queue: &str,
        retry: Option<&RetryPolicy>,
    ) -> Result<SharedMember, ConnectionError>;
}

/// Retry parameters handed to the member layer.
///
/// The member layer turns these into actual reconnect delays; the reader
/// only carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    /// Zero means retry forever.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
            max_attempts: 0,
        }
    }
}
