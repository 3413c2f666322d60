//! Axum router construction for both replica kinds.
//!
//! Each router carries CORS (any origin, for browser demos) and request
//! tracing.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::sudoku_api::{self, SudokuApp};
use crate::todo_api::{self, TodoApp};

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the router for a todo-list replica.
///
/// - `GET /` -- current list
/// - `POST /add` -- append a todo
/// - `GET /metrics` -- counters
/// - `GET /verify` -- consistency check
/// - `GET /export` -- encoded snapshot
/// - `POST /merge` -- merge an encoded snapshot
/// - `POST /sync` -- pull from a peer
pub fn build_todo_router(state: Arc<TodoApp>) -> Router {
    Router::new()
        .route("/", get(todo_api::list_todos))
        .route("/add", post(todo_api::add_todo))
        .route("/metrics", get(todo_api::metrics))
        .route("/verify", get(todo_api::verify))
        .route("/export", get(todo_api::export))
        .route("/merge", post(todo_api::merge))
        .route("/sync", post(todo_api::sync))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the router for a sudoku replica.
///
/// - `POST /place` -- place a digit
/// - `GET /board` -- board and status
/// - `GET /export` -- board in transfer form
/// - `POST /merge` -- merge an incoming board
/// - `POST /sync` -- pull from a peer
pub fn build_sudoku_router(state: Arc<SudokuApp>) -> Router {
    Router::new()
        .route("/place", post(sudoku_api::place))
        .route("/board", get(sudoku_api::board))
        .route("/export", get(sudoku_api::export))
        .route("/merge", post(sudoku_api::merge))
        .route("/sync", post(sudoku_api::sync))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
