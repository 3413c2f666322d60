//! Pull-based replication between replicas.
//!
//! A replica syncs by fetching a peer's `/export` body and merging it
//! locally. All network I/O completes before the store is touched, so the
//! store lock is never held across an `.await`.

use std::sync::Arc;

use beacon_core::{Mergeable, Reconciled, codec};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /sync`.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// Base URL of the peer, e.g. `http://127.0.0.1:8081`.
    pub peer: String,
}

/// Fetch `{peer}/export` and merge it into `state`'s store.
///
/// # Errors
///
/// [`ApiError::BadRequest`] for an empty peer URL and [`ApiError::Peer`]
/// when the peer is unreachable, answers with a non-success status, or
/// sends something that does not decode as a snapshot.
pub async fn pull_from_peer<S>(
    state: &AppState<S>,
    peer: &str,
) -> Result<Reconciled<Arc<S>, S::Conflict>, ApiError>
where
    S: Mergeable + DeserializeOwned,
{
    let peer = peer.trim().trim_end_matches('/');
    if peer.is_empty() {
        return Err(ApiError::BadRequest(String::from("peer URL is required")));
    }

    let url = format!("{peer}/export");
    debug!(%url, "pulling snapshot from peer");

    let response = state
        .http
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| ApiError::Peer(format!("request to {url} failed: {e}")))?;

    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::Peer(format!("reading body from {url} failed: {e}")))?;

    let outcome = codec::import_and_merge(&state.store, &body)
        .map_err(|e| ApiError::Peer(format!("{url} sent an invalid snapshot: {e}")))?;

    info!(
        %url,
        bytes = body.len(),
        conflicts = outcome.conflicts.len(),
        "merged snapshot from peer"
    );
    Ok(outcome)
}
