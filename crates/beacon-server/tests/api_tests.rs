//! Integration tests for the replica HTTP endpoints.
//!
//! Most tests drive the routers directly via `tower::ServiceExt` without a
//! TCP server. The sync tests start a real peer on a loopback port, since
//! `/sync` pulls over HTTP.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use beacon_core::{IdBand, SudokuState, TodoState, codec};
use beacon_server::{AppState, build_sudoku_router, build_todo_router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

fn todo_state(replica: u64) -> Arc<AppState<TodoState>> {
    let band = IdBand::for_replica(replica).unwrap();
    Arc::new(AppState::new(TodoState::in_band(band), format!("replica-{replica}")))
}

fn sudoku_state(label: &str) -> Arc<AppState<SudokuState>> {
    Arc::new(AppState::new(SudokuState::new(), label))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn post(router: &Router, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn post_json(router: &Router, uri: &str, value: &Value) -> (StatusCode, Value) {
    post(router, uri, serde_json::to_vec(value).unwrap()).await
}

/// Serve `router` on an ephemeral loopback port and return its base URL.
async fn spawn_peer(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// =========================================================================
// Todo replica
// =========================================================================

#[tokio::test]
async fn test_list_starts_empty_in_band() {
    let router = build_todo_router(todo_state(1));

    let (status, json) = get(&router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);
    assert_eq!(json["next_id"], 100);
    assert_eq!(json["todos"], json!([]));
}

#[tokio::test]
async fn test_add_assigns_band_ids() {
    let router = build_todo_router(todo_state(2));

    let (status, json) = post_json(&router, "/add", &json!({ "title": "buy milk" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["todo"]["id"], 200);
    assert_eq!(json["todo"]["title"], "buy milk");
    assert_eq!(json["todo"]["completed"], false);
    assert_eq!(json["count"], 1);

    let (_, json) = post_json(&router, "/add", &json!({ "title": "walk dog" })).await;
    assert_eq!(json["todo"]["id"], 201);

    let (_, json) = get(&router, "/").await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["next_id"], 202);
}

#[tokio::test]
async fn test_add_rejects_blank_title() {
    let state = todo_state(1);
    let router = build_todo_router(Arc::clone(&state));

    let (status, json) = post_json(&router, "/add", &json!({ "title": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);
    assert!(json["error"].as_str().unwrap().contains("title"));
    assert!(state.store.read().is_empty());
}

#[tokio::test]
async fn test_metrics_count_requests_and_commits() {
    let state = todo_state(1);
    let router = build_todo_router(Arc::clone(&state));

    post_json(&router, "/add", &json!({ "title": "a" })).await;
    post_json(&router, "/add", &json!({ "title": "b" })).await;
    get(&router, "/").await;

    let (status, json) = get(&router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["requests_processed"], 4);
    assert_eq!(json["commits"], 2);
    assert_eq!(json["todo_count"], 2);
    assert_eq!(json["next_id"], 102);
    assert_eq!(json["node_id"], state.node_id.to_string());
    assert_eq!(json["label"], "replica-1");
}

#[tokio::test]
async fn test_verify_reports_consistent_snapshot() {
    let router = build_todo_router(todo_state(1));
    post_json(&router, "/add", &json!({ "title": "a" })).await;

    let (status, json) = get(&router, "/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["consistent"], true);
    assert_eq!(json["idempotent"], true);
    assert_eq!(json["todo_count"], 1);
    assert_eq!(json["next_id"], 101);
}

#[tokio::test]
async fn test_export_then_merge_between_replicas() {
    let blue = build_todo_router(todo_state(1));
    let green = build_todo_router(todo_state(2));

    post_json(&blue, "/add", &json!({ "title": "blue task" })).await;
    post_json(&green, "/add", &json!({ "title": "green task" })).await;

    let response = blue
        .clone()
        .oneshot(Request::get("/export").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let exported = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let (status, json) = post(&green, "/merge", exported.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["todo_count"], 2);
    assert_eq!(json["next_id"], 201);
    assert_eq!(json["merged"], 1);
    assert_eq!(json["collisions"], 0);

    // Replaying the same export changes nothing.
    let (_, json) = post(&green, "/merge", exported).await;
    assert_eq!(json["todo_count"], 2);
}

#[tokio::test]
async fn test_merge_reports_collisions() {
    let state = Arc::new(AppState::new(TodoState::new().add("local"), "a"));
    let router = build_todo_router(Arc::clone(&state));
    let incoming = codec::export(&TodoState::new().add("remote")).unwrap();

    let (status, json) = post(&router, "/merge", incoming).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["todo_count"], 1);
    assert_eq!(json["collisions"], 1);
    assert_eq!(state.store.read().todos()[0].title, "local");
}

#[tokio::test]
async fn test_malformed_merge_is_rejected_and_store_untouched() {
    let state = todo_state(1);
    let router = build_todo_router(Arc::clone(&state));
    post_json(&router, "/add", &json!({ "title": "keep" })).await;
    let before = state.store.read();

    let (status, json) = post(&router, "/merge", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);
    assert_eq!(*state.store.read(), *before);
}

#[tokio::test]
async fn test_merge_rejects_record_beyond_counter() {
    let state = todo_state(1);
    let router = build_todo_router(Arc::clone(&state));
    post_json(&router, "/add", &json!({ "title": "keep" })).await;
    let before = state.store.read();

    let stale = json!({
        "todos": [
            {"id": 500, "title": "remote", "completed": false, "created_at": "2024-01-01T00:00:00Z"}
        ],
        "next_id": 1
    });
    let (status, json) = post_json(&router, "/merge", &stale).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("next_id"));
    assert_eq!(*state.store.read(), *before);

    // A later add still gets a fresh ID.
    let (_, json) = post_json(&router, "/add", &json!({ "title": "next" })).await;
    assert_eq!(json["todo"]["id"], 101);
}

#[tokio::test]
async fn test_add_with_exhausted_counter_is_conflict() {
    let state = todo_state(1);
    let router = build_todo_router(Arc::clone(&state));
    let full = json!({ "todos": [], "next_id": u64::MAX });
    let (status, _) = post_json(&router, "/merge", &full).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = post_json(&router, "/add", &json!({ "title": "one" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["status"], 409);
    let (status, _) = post_json(&router, "/add", &json!({ "title": "two" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = get(&router, "/verify").await;
    assert_eq!(json["consistent"], true);
    assert_eq!(json["todo_count"], 0);
    assert_eq!(state.store.read().next_id(), u64::MAX);
}

// =========================================================================
// Sudoku replica
// =========================================================================

#[tokio::test]
async fn test_place_and_board() {
    let router = build_sudoku_router(sudoku_state("blue"));

    let (status, json) = post_json(&router, "/place", &json!({ "row": 0, "col": 0, "num": 5 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["filled"], 1);
    assert_eq!(json["valid"], true);
    assert_eq!(json["solved"], false);
    assert_eq!(json["version"], "blue");

    let (status, json) = get(&router, "/board").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["board"][0][0], 5);
    assert_eq!(json["filled"], 1);
}

#[tokio::test]
async fn test_rejected_placements_answer_422() {
    let state = sudoku_state("blue");
    let router = build_sudoku_router(Arc::clone(&state));
    post_json(&router, "/place", &json!({ "row": 4, "col": 4, "num": 7 })).await;

    for body in [
        json!({ "row": 9, "col": 0, "num": 1 }),
        json!({ "row": 0, "col": 0, "num": 0 }),
        json!({ "row": 4, "col": 4, "num": 3 }),
    ] {
        let (status, json) = post_json(&router, "/place", &body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        assert_eq!(json["status"], 422);
    }

    assert_eq!(state.store.read().count_filled(), 1);
    assert_eq!(state.store.read().cell(4, 4), Some(7));
}

#[tokio::test]
async fn test_export_body_merges_directly() {
    let blue = build_sudoku_router(sudoku_state("blue"));
    let green = build_sudoku_router(sudoku_state("green"));

    post_json(&blue, "/place", &json!({ "row": 0, "col": 0, "num": 1 })).await;
    post_json(&blue, "/place", &json!({ "row": 1, "col": 4, "num": 2 })).await;
    post_json(&green, "/place", &json!({ "row": 8, "col": 8, "num": 9 })).await;

    let (_, exported) = get(&blue, "/export").await;
    let (status, json) = post_json(&green, "/merge", &exported).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["filled"], 3);
    assert_eq!(json["valid"], true);
    assert_eq!(json["conflicts"], 0);
    assert_eq!(json["version"], "green");

    let (_, json) = post_json(&green, "/merge", &exported).await;
    assert_eq!(json["filled"], 3);
}

#[tokio::test]
async fn test_conflicting_merge_keeps_incoming_and_reports() {
    let state = sudoku_state("blue");
    let router = build_sudoku_router(Arc::clone(&state));
    post_json(&router, "/place", &json!({ "row": 0, "col": 0, "num": 1 })).await;

    let incoming = codec::export(&SudokuState::new().place(0, 0, 2)).unwrap();
    let (status, json) = post(&router, "/merge", incoming).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["conflicts"], 1);
    assert_eq!(state.store.read().cell(0, 0), Some(2));
}

#[tokio::test]
async fn test_out_of_domain_board_is_rejected() {
    let state = sudoku_state("blue");
    let router = build_sudoku_router(Arc::clone(&state));

    let mut board = vec![vec![0_u8; 9]; 9];
    board[3][3] = 42;
    let (status, _) = post_json(&router, "/merge", &json!({ "board": board })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(&router, "/merge", &json!({ "board": [[1, 2, 3]] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(state.store.read().count_filled(), 0);
}

// =========================================================================
// Peer sync over loopback
// =========================================================================

#[tokio::test]
async fn test_todo_sync_pulls_from_live_peer() {
    let peer_state = todo_state(2);
    let peer = build_todo_router(Arc::clone(&peer_state));
    post_json(&peer, "/add", &json!({ "title": "from green" })).await;
    let peer_url = spawn_peer(peer).await;

    let local = build_todo_router(todo_state(1));
    post_json(&local, "/add", &json!({ "title": "from blue" })).await;

    let (status, json) = post_json(&local, "/sync", &json!({ "peer": peer_url })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["todo_count"], 2);
    assert_eq!(json["next_id"], 201);
    assert_eq!(json["collisions"], 0);

    // The pull never writes to the peer.
    assert_eq!(peer_state.store.read().len(), 1);
}

#[tokio::test]
async fn test_todo_sync_reports_collisions() {
    let peer = build_todo_router(todo_state(1));
    post_json(&peer, "/add", &json!({ "title": "remote" })).await;
    let peer_url = spawn_peer(peer).await;

    let local_state = todo_state(1);
    let local = build_todo_router(Arc::clone(&local_state));
    post_json(&local, "/add", &json!({ "title": "local" })).await;

    let (status, json) = post_json(&local, "/sync", &json!({ "peer": peer_url })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["todo_count"], 1);
    assert_eq!(json["collisions"], 1);
    assert_eq!(local_state.store.read().todos()[0].title, "local");
}

#[tokio::test]
async fn test_sudoku_sync_converges_two_nodes() {
    let blue_state = sudoku_state("blue");
    let green_state = sudoku_state("green");
    let blue = build_sudoku_router(Arc::clone(&blue_state));
    let green = build_sudoku_router(Arc::clone(&green_state));

    post_json(&blue, "/place", &json!({ "row": 0, "col": 0, "num": 5 })).await;
    post_json(&green, "/place", &json!({ "row": 8, "col": 8, "num": 4 })).await;

    let blue_url = spawn_peer(blue.clone()).await;
    let green_url = spawn_peer(green.clone()).await;

    let (status, _) = post_json(&green, "/sync", &json!({ "peer": blue_url })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = post_json(&blue, "/sync", &json!({ "peer": green_url })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["filled"], 2);

    assert_eq!(*blue_state.store.read(), *green_state.store.read());
}

#[tokio::test]
async fn test_sync_with_unreachable_peer_is_bad_gateway() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let state = todo_state(1);
    let router = build_todo_router(Arc::clone(&state));
    let (status, json) =
        post_json(&router, "/sync", &json!({ "peer": format!("http://{addr}") })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["status"], 502);
    assert_eq!(state.store.stats().commits, 0);
}

#[tokio::test]
async fn test_sync_requires_peer_url() {
    let router = build_sudoku_router(sudoku_state("blue"));
    let (status, _) = post_json(&router, "/sync", &json!({ "peer": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
