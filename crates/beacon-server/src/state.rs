//! Shared application state for a Beacon replica.
//!
//! [`AppState`] owns the replica's [`StateStore`] together with its identity
//! and the HTTP client used to pull from peers. It is wrapped in [`Arc`] and
//! injected into handlers via Axum's `State` extractor; there is no global
//! store.
//!
//! [`Arc`]: std::sync::Arc

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use beacon_core::StateStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one running replica process.
///
/// Uses UUID v7 so identifiers sort by start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared state for one replica's router.
#[derive(Debug)]
pub struct AppState<S> {
    /// The replica's current snapshot.
    pub store: StateStore<S>,
    /// Identity of this process.
    pub node_id: NodeId,
    /// Human-readable label reported by status endpoints (e.g. `"blue"`).
    pub label: String,
    /// Client used for `/sync` pulls.
    pub http: reqwest::Client,
    requests: AtomicU64,
}

impl<S> AppState<S>
where
    S: Send + Sync + 'static,
{
    /// Create state around `initial` with a default HTTP client.
    pub fn new(initial: S, label: impl Into<String>) -> Self {
        Self::with_client(initial, label, reqwest::Client::new())
    }

    /// Create state around `initial` using a preconfigured HTTP client.
    pub fn with_client(initial: S, label: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            store: StateStore::new(initial),
            node_id: NodeId::new(),
            label: label.into(),
            http,
            requests: AtomicU64::new(0),
        }
    }

    /// Count one handled request.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests handled since start.
    pub fn requests_processed(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}
