//! Membership tracker — maps discovered addresses to member handles.
//!
//! Applies discovery reports to the address → handle map and returns
//! the snapshot the reader should adopt. All map mutation happens under
//! one lock, so reports arriving from several threads are serialized.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use grabby_member::{MemberFactory, RetryPolicy, SharedMember};

use crate::discovery::Discovery;

/// Live mapping from member address to its handle.
pub type Snapshot = BTreeMap<String, SharedMember>;

/// What the reader should do after a report was applied.
pub enum MembershipUpdate {
    /// Adopt this set of members.
    Snapshot(Snapshot),
    /// Discovery failed; the current members stay as they are.
    Failed(String),
}

/// Tracks the member handles for one queue.
pub struct MembershipTracker {
    queue: String,
    retry: Option<RetryPolicy>,
    factory: Arc<dyn MemberFactory>,
    members: Mutex<Snapshot>,
}

impl MembershipTracker {
    /// Create a tracker that opens handles for `queue` via `factory`.
    pub fn new(queue: &str, factory: Arc<dyn MemberFactory>) -> Self {
        Self {
            queue: queue.to_string(),
            retry: None,
            factory,
            members: Mutex::new(BTreeMap::new()),
        }
    }

    /// Retry parameters passed to the factory for every new handle.
    pub fn with_retry(mut self, retry: Option<RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Apply one discovery report.
    pub fn apply(&self, report: Discovery) -> MembershipUpdate {
        let mut members = self.members.lock().expect("membership lock");

        match report {
            Discovery::Bound(addresses) => {
                self.rebind(&mut members, &addresses);
                MembershipUpdate::Snapshot(members.clone())
            }
            Discovery::Pending => {
                debug!(queue = %self.queue, members = members.len(), "discovery pending");
                MembershipUpdate::Snapshot(members.clone())
            }
            Discovery::Negative => {
                if !members.is_empty() {
                    info!(queue = %self.queue, dropped = members.len(), "queue name no longer resolves");
                }
                members.clear();
                MembershipUpdate::Snapshot(Snapshot::new())
            }
            Discovery::Failed(cause) => {
                warn!(queue = %self.queue, %cause, "discovery failed");
                MembershipUpdate::Failed(cause)
            }
        }
    }

    /// Drop the entry for a member that failed on its own.
    ///
    /// A later `Bound` report that still lists the address opens a fresh
    /// handle instead of handing back the dead one.
    pub fn forget(&self, address: &str) -> bool {
        let mut members = self.members.lock().expect("membership lock");
        members.remove(address).is_some()
    }

    /// Addresses currently tracked.
    pub fn addresses(&self) -> BTreeSet<String> {
        self.members
            .lock()
            .expect("membership lock")
            .keys()
            .cloned()
            .collect()
    }

    fn rebind(&self, members: &mut Snapshot, addresses: &BTreeSet<String>) {
        members.retain(|address, _| {
            let keep = addresses.contains(address);
            if !keep {
                debug!(%address, queue = %self.queue, "member left discovery set");
            }
            keep
        });

        for address in addresses {
            if members.contains_key(address) {
                continue;
            }
            match self
                .factory
                .create(address, &self.queue, self.retry.as_ref())
            {
                Ok(handle) => {
                    info!(%address, queue = %self.queue, "member joined");
                    members.insert(address.clone(), handle);
                }
                // Left out for now; the next Bound report listing it retries.
                Err(e) => {
                    warn!(%address, queue = %self.queue, error = %e, "failed to open member");
                }
            }
        }
    }
}
