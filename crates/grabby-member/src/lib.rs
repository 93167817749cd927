//! grabby-member — the single-member side of a grabby reader.
//!
//! Each queue server in the cluster exposes its own read stream for a
//! named queue. This crate defines the surface the fan-in engine consumes
//! from one such stream, independent of the wire protocol behind it.
//!
//! # Components
//!
//! - **`handle`** — [`MemberHandle`] (messages, error, close) and the
//!   [`MemberFactory`] that opens one per address
//! - **`message`** — [`ReadMessage`] with its ack/abort continuations
//! - **`memory`** — an in-process member used by tests and the simulator

pub mod error;
pub mod handle;
pub mod memory;
pub mod message;

pub use error::{ConnectionError, MemberError};
pub use handle::{MemberFactory, MemberHandle, RetryPolicy, SharedMember};
pub use memory::{MemoryFactory, MemoryMember};
pub use message::ReadMessage;
