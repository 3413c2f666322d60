//! Error types for the Beacon HTTP handlers.
//!
//! [`ApiError`] unifies handler failures into a single enum that converts
//! into an Axum response via its [`IntoResponse`] implementation. Every
//! error body has the shape `{"error": message, "status": code}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use beacon_core::{CodecError, CounterExhausted, PlacementError, StoreError};

/// Errors that can occur while serving a request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was well-formed JSON but semantically unusable.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A snapshot could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A cell placement was refused.
    #[error("placement rejected: {0}")]
    Placement(#[from] PlacementError),

    /// The todo ID counter has no IDs left.
    #[error(transparent)]
    Counter(#[from] CounterExhausted),

    /// The transformation behind a write failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A peer could not be reached or sent an unusable snapshot.
    #[error("peer error: {0}")]
    Peer(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Codec(CodecError::Decode(_)) => StatusCode::BAD_REQUEST,
            Self::Placement(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Counter(_) => StatusCode::CONFLICT,
            Self::Peer(_) => StatusCode::BAD_GATEWAY,
            Self::Codec(CodecError::Encode(_)) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
