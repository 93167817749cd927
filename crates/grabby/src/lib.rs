//! grabby — one read stream over every member of a replicated queue.
//!
//! Each member of a queue cluster serves its own read stream. A grabby
//! reader opens a handle on every member that discovery reports and
//! merges them into a single [`MergedHandle`], dropping members that fail
//! or leave and picking up members that join.
//!
//! # Architecture
//!
//! ```text
//! build(discovery, config, factory, metrics)
//!   └── MergeEngine (one task)
//!       ├── close                      → close all members, ReadClosed
//!       ├── message from any member    → forward (OutstandingTracker)
//!       ├── member error               → drop member, AllHandlesDied if none left
//!       └── discovery report           → MembershipTracker → adopt new set
//!
//! MergedHandle
//!   ├── recv()        merged messages
//!   ├── next_error()  Discovery(..)*, then ReadClosed | AllHandlesDied
//!   └── close()       idempotent shutdown
//! ```
//!
//! # Metrics
//!
//! `num_read_handles` (gauge) always; `messages.received`, `messages.ack`,
//! `messages.abort` (counters) and `outstanding_reads` (gauge) when
//! `track_outstanding` is set.

pub mod builder;
pub mod config;
mod engine;
pub mod error;
pub mod handle;
mod metrics;
pub mod outstanding;

pub use builder::build;
pub use config::ReaderConfig;
pub use error::{ConfigError, ReadError};
pub use handle::MergedHandle;
pub use metrics::NUM_READ_HANDLES;
pub use outstanding::{
    OutstandingTracker, MESSAGES_ABORT, MESSAGES_ACK, MESSAGES_RECEIVED, OUTSTANDING_READS,
};

pub use grabby_cluster::{discovery, Discovery, DiscoveryPublisher, DiscoveryStream};
pub use grabby_member::{MemberError, MemberFactory, MemberHandle, ReadMessage, RetryPolicy};
