//! Handlers for the todo-list replica.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Current todo list |
//! | `POST` | `/add` | Append a todo |
//! | `GET` | `/metrics` | Request and store counters |
//! | `GET` | `/verify` | Consistency and idempotence check of the live snapshot |
//! | `GET` | `/export` | Encoded snapshot for peers |
//! | `POST` | `/merge` | Merge an encoded snapshot |
//! | `POST` | `/sync` | Pull and merge a peer's snapshot |

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use beacon_core::{IdCollision, TodoState, codec, laws};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::replication::{SyncRequest, pull_from_peer};
use crate::state::AppState;

/// State type for the todo router.
pub type TodoApp = AppState<TodoState>;

/// Body of `POST /add`.
#[derive(Debug, Deserialize)]
pub struct AddTodoRequest {
    /// Title of the new todo; must not be blank.
    pub title: String,
}

// ---------------------------------------------------------------------------
// GET / -- current list
// ---------------------------------------------------------------------------

/// Return every todo with the count and next ID.
pub async fn list_todos(State(state): State<Arc<TodoApp>>) -> impl IntoResponse {
    state.record_request();
    let snapshot = state.store.read();

    Json(serde_json::json!({
        "todos": snapshot.todos(),
        "count": snapshot.len(),
        "next_id": snapshot.next_id(),
    }))
}

// ---------------------------------------------------------------------------
// POST /add
// ---------------------------------------------------------------------------

/// Append a todo with the next ID.
///
/// Answers 409 once the ID counter is exhausted.
pub async fn add_todo(
    State(state): State<Arc<TodoApp>>,
    Json(request): Json<AddTodoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.record_request();
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest(String::from("title required")));
    }

    let committed = state.store.try_apply(|current| current.try_add(title))?;
    let todo = committed.last().cloned();
    if let Some(todo) = &todo {
        info!(id = todo.id, title = %todo.title, "todo added");
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "todo": todo,
        "count": committed.len(),
    })))
}

// ---------------------------------------------------------------------------
// GET /metrics
// ---------------------------------------------------------------------------

/// Report request and store counters for this replica.
pub async fn metrics(State(state): State<Arc<TodoApp>>) -> impl IntoResponse {
    state.record_request();
    let snapshot = state.store.read();
    let stats = state.store.stats();

    Json(serde_json::json!({
        "requests_processed": state.requests_processed(),
        "commits": stats.commits,
        "rederivations": stats.rederivations,
        "todo_count": snapshot.len(),
        "next_id": snapshot.next_id(),
        "node_id": state.node_id,
        "label": state.label,
    }))
}

// ---------------------------------------------------------------------------
// GET /verify
// ---------------------------------------------------------------------------

/// Check the live snapshot for duplicate IDs, a stale counter, and merge
/// idempotence.
pub async fn verify(State(state): State<Arc<TodoApp>>) -> impl IntoResponse {
    state.record_request();
    let snapshot = state.store.read();

    let consistency = snapshot.check_consistency();
    let idempotent = laws::check_idempotent(snapshot.as_ref()).is_ok();
    let message = match &consistency {
        Ok(()) if idempotent => String::from("snapshot is consistent"),
        Ok(()) => String::from("merging the snapshot with itself changed it"),
        Err(e) => e.to_string(),
    };

    Json(serde_json::json!({
        "consistent": consistency.is_ok(),
        "todo_count": snapshot.len(),
        "next_id": snapshot.next_id(),
        "idempotent": idempotent,
        "message": message,
    }))
}

// ---------------------------------------------------------------------------
// GET /export
// ---------------------------------------------------------------------------

/// Encode the current snapshot for another replica.
pub async fn export(State(state): State<Arc<TodoApp>>) -> Result<impl IntoResponse, ApiError> {
    state.record_request();
    let bytes = codec::export(state.store.read().as_ref())?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}

// ---------------------------------------------------------------------------
// POST /merge
// ---------------------------------------------------------------------------

/// Merge an encoded snapshot into this replica.
///
/// Malformed input is rejected with 400 before the store is touched. Records
/// dropped by ID collisions are logged at `warn`.
pub async fn merge(
    State(state): State<Arc<TodoApp>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.record_request();
    let incoming: TodoState = codec::import(&body)?;
    let outcome = state.store.merge(&incoming);

    report_collisions(&outcome.conflicts);
    info!(
        incoming = incoming.len(),
        todo_count = outcome.merged.len(),
        next_id = outcome.merged.next_id(),
        "merge completed"
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "todo_count": outcome.merged.len(),
        "next_id": outcome.merged.next_id(),
        "merged": incoming.len(),
        "collisions": outcome.conflicts.len(),
    })))
}

// ---------------------------------------------------------------------------
// POST /sync
// ---------------------------------------------------------------------------

/// Pull a peer's snapshot and merge it.
///
/// Collisions are logged the same way as for `/merge`.
pub async fn sync(
    State(state): State<Arc<TodoApp>>,
    Json(request): Json<SyncRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.record_request();
    let outcome = pull_from_peer(&state, &request.peer).await?;
    report_collisions(&outcome.conflicts);

    Ok(Json(serde_json::json!({
        "success": true,
        "peer": request.peer,
        "todo_count": outcome.merged.len(),
        "next_id": outcome.merged.next_id(),
        "collisions": outcome.conflicts.len(),
    })))
}

fn report_collisions(collisions: &[IdCollision]) {
    for collision in collisions {
        warn!(
            id = collision.id,
            kept = %collision.kept.title,
            dropped = %collision.dropped.title,
            "id collision during merge, incoming record dropped"
        );
    }
}
