//! grabby-cluster — cluster membership for grabby readers.
//!
//! Turns a stream of discovery reports into the live set of member
//! handles the fan-in engine reads from.
//!
//! # Architecture
//!
//! ```text
//! discovery source (naming, static host list, publisher)
//!   └── Discovery reports: Bound | Pending | Negative | Failed
//!         └── MembershipTracker
//!             ├── MemberFactory::create() for new addresses
//!             ├── drops entries for vanished addresses
//!             └── MembershipUpdate::Snapshot(address → handle)
//! ```
//!
//! The tracker never closes handles itself. Closing a vanished member is
//! the engine's job when it adopts the new snapshot.

pub mod discovery;
pub mod membership;

pub use discovery::{Discovery, DiscoveryPublisher, DiscoveryStream};
pub use membership::{MembershipTracker, MembershipUpdate, Snapshot};
