//! Immutable mergeable snapshots and the store that serves them.
//!
//! This crate is the part of Beacon that does real work: two snapshot shapes
//! with an associative, idempotent merge, and a concurrent store that swaps
//! whole snapshots atomically. The demo servers in `beacon-server` are thin
//! HTTP glue around it.
//!
//! # Modules
//!
//! - [`mergeable`] -- The [`Mergeable`] contract and [`Reconciled`] result.
//! - [`todo`] -- [`TodoState`], an append-only record collection with a
//!   monotonic ID counter.
//! - [`sudoku`] -- [`SudokuState`], a write-once 9×9 grid.
//! - [`store`] -- [`StateStore`], the lock-swapped holder of the current
//!   snapshot.
//! - [`codec`] -- JSON export/import between replicas.
//! - [`laws`] -- Executable checks for the merge laws.
//!
//! # Replication
//!
//! Two replicas never coordinate. One exports its snapshot, the other
//! imports and merges it:
//!
//! ```
//! use beacon_core::{StateStore, TodoState, codec};
//!
//! // Disjoint ID bands keep the two replicas from colliding.
//! let blue = StateStore::new(TodoState::starting_at(100));
//! let green = StateStore::new(TodoState::starting_at(200));
//!
//! blue.apply(|s| s.add("from blue"));
//! green.apply(|s| s.add("from green"));
//!
//! let payload = codec::export(&*blue.read()).ok().unwrap_or_default();
//! let outcome = codec::import_and_merge(&green, &payload);
//! assert!(outcome.is_ok());
//! assert_eq!(green.read().len(), 2);
//! ```
//!
//! [`Mergeable`]: mergeable::Mergeable
//! [`Reconciled`]: mergeable::Reconciled

pub mod codec;
pub mod laws;
pub mod mergeable;
pub mod store;
pub mod sudoku;
pub mod todo;

// Re-export primary types at crate root.
pub use codec::CodecError;
pub use laws::LawViolation;
pub use mergeable::{Mergeable, Reconciled, merge};
pub use store::{StateStore, StoreError, StoreStats};
pub use sudoku::{CellConflict, PlacementError, SudokuState};
pub use todo::{ConsistencyError, CounterExhausted, IdBand, IdCollision, Todo, TodoState};
