//! The export/import boundary between replicas.
//!
//! Snapshots travel as JSON. [`export`] and [`import`] round-trip any
//! snapshot to a value-equal copy; [`import_and_merge`] decodes an incoming
//! snapshot and, only once decoding has succeeded, merges it into a store.
//! Malformed input therefore fails fast and never touches the receiving
//! store.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::mergeable::{Mergeable, Reconciled};
use crate::store::StateStore;

/// Errors at the serialization boundary.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The snapshot could not be encoded.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    /// The input is not a valid encoded snapshot.
    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a snapshot for transfer to another replica.
pub fn export<S: Serialize>(snapshot: &S) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(snapshot).map_err(CodecError::Encode)
}

/// Decode a snapshot produced by [`export`] on some replica.
pub fn import<S: DeserializeOwned>(bytes: &[u8]) -> Result<S, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

/// Decode `bytes` and merge the snapshot into `store`.
///
/// The store is only touched after decoding succeeds.
pub fn import_and_merge<S>(
    store: &StateStore<S>,
    bytes: &[u8],
) -> Result<Reconciled<Arc<S>, S::Conflict>, CodecError>
where
    S: Mergeable + DeserializeOwned,
{
    let incoming: S = import(bytes)?;
    debug!(bytes = bytes.len(), "decoded incoming snapshot");
    Ok(store.merge(&incoming))
}
