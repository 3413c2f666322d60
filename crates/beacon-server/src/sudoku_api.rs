//! Handlers for the collaborative sudoku replica.
//!
//! Replicas fill cells independently and converge by exchanging boards.
//! Every response carries the replica label as `version`.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use beacon_core::{SudokuState, codec};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::replication::{SyncRequest, pull_from_peer};
use crate::state::AppState;

/// State type for the sudoku router.
pub type SudokuApp = AppState<SudokuState>;

/// Body of `POST /place`.
#[derive(Debug, Deserialize)]
pub struct PlaceRequest {
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column.
    pub col: usize,
    /// Digit to place, `1..=9`.
    pub num: u8,
}

fn board_summary(board: &SudokuState, version: &str) -> serde_json::Value {
    serde_json::json!({
        "board": board.board(),
        "filled": board.count_filled(),
        "valid": board.is_valid(),
        "solved": board.is_solved(),
        "version": version,
    })
}

/// Place one digit. Refused placements answer 422 with the reason.
pub async fn place(
    State(state): State<Arc<SudokuApp>>,
    Json(request): Json<PlaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.record_request();
    let PlaceRequest { row, col, num } = request;

    let board = state
        .store
        .try_apply(|current| current.try_place(row, col, num))
        .inspect_err(|e| warn!(row, col, num, error = %e, "placement rejected"))?;

    info!(row, col, num, filled = board.count_filled(), "digit placed");
    Ok(Json(serde_json::json!({
        "success": true,
        "filled": board.count_filled(),
        "valid": board.is_valid(),
        "solved": board.is_solved(),
        "version": state.label,
    })))
}

/// Current board with its derived status.
pub async fn board(State(state): State<Arc<SudokuApp>>) -> impl IntoResponse {
    state.record_request();
    Json(board_summary(&state.store.read(), &state.label))
}

/// The board in transfer form.
///
/// Carries the same status fields as `/board`; `/merge` ignores them, so
/// this body can be forwarded to a peer unchanged.
pub async fn export(State(state): State<Arc<SudokuApp>>) -> impl IntoResponse {
    state.record_request();
    Json(board_summary(&state.store.read(), &state.label))
}

/// Merge an incoming board. Cells both sides filled differently are
/// resolved in favor of the incoming board and reported as conflicts.
pub async fn merge(
    State(state): State<Arc<SudokuApp>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.record_request();
    let outcome = codec::import_and_merge(&state.store, &body)?;
    report_conflicts(&outcome.conflicts);

    let board = &outcome.merged;
    info!(
        version = %state.label,
        filled = board.count_filled(),
        conflicts = outcome.conflicts.len(),
        "merge completed"
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "filled": board.count_filled(),
        "valid": board.is_valid(),
        "solved": board.is_solved(),
        "conflicts": outcome.conflicts.len(),
        "version": state.label,
    })))
}

/// Pull a peer's board and merge it.
pub async fn sync(
    State(state): State<Arc<SudokuApp>>,
    Json(request): Json<SyncRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.record_request();
    let outcome = pull_from_peer(&state, &request.peer).await?;
    report_conflicts(&outcome.conflicts);

    let board = &outcome.merged;
    Ok(Json(serde_json::json!({
        "success": true,
        "peer": request.peer,
        "filled": board.count_filled(),
        "valid": board.is_valid(),
        "solved": board.is_solved(),
        "conflicts": outcome.conflicts.len(),
        "version": state.label,
    })))
}

fn report_conflicts(conflicts: &[beacon_core::CellConflict]) {
    for conflict in conflicts {
        warn!(
            row = conflict.row,
            col = conflict.col,
            local = conflict.left,
            incoming = conflict.right,
            "cell conflict during merge, incoming value kept"
        );
    }
}
