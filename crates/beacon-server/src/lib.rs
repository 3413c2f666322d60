//! HTTP surface for Beacon replicas.
//!
//! Two demo applications share one replication model:
//!
//! - **Todo list** ([`build_todo_router`]): replicas append records with IDs
//!   from disjoint bands and converge by exchanging snapshots.
//! - **Sudoku** ([`build_sudoku_router`]): replicas fill cells on a shared
//!   9x9 board and converge the same way.
//!
//! Every replica exposes `GET /export` and `POST /merge`. `POST /sync` pulls
//! a peer's export over HTTP and merges it locally, so two nodes can be
//! reconciled without an external script.
//!
//! # Architecture
//!
//! Each router owns an [`AppState`] holding a
//! [`StateStore`](beacon_core::StateStore). Handlers read by cloning the
//! current snapshot and write through the store's apply/merge operations, so
//! no lock is ever held across an `.await`.

pub mod error;
pub mod replication;
pub mod router;
pub mod server;
pub mod state;
pub mod sudoku_api;
pub mod todo_api;

pub use error::ApiError;
pub use router::{build_sudoku_router, build_todo_router};
pub use server::{ServerConfig, ServerError, start_server};
pub use state::{AppState, NodeId};
pub use sudoku_api::SudokuApp;
pub use todo_api::TodoApp;
