//! Record-collection snapshots: an append-only todo list.
//!
//! [`TodoState`] is an ordered sequence of uniquely identified [`Todo`]
//! records plus a monotonic `next_id` counter. Every operation returns a new
//! snapshot; the receiver is never touched.
//!
//! # Merge policy
//!
//! Merging deduplicates by ID. Records from the left operand come first, in
//! their original order, followed by right-operand records whose IDs were not
//! already seen. When both operands carry the same ID the left record wins,
//! **even when the payloads differ**. This is lossy on purpose: two replicas
//! that both count from 1 will silently drop each other's records on merge.
//! The store does not repair this. Replicas avoid it by drawing IDs from
//! disjoint [`IdBand`]s, and [`Mergeable::reconcile`] reports every dropped
//! record as an [`IdCollision`].

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mergeable::{Mergeable, Reconciled};

/// Width of the ID band assigned to each replica.
const BAND_WIDTH: u64 = 100;

/// Offset of the last ID inside a band.
const BAND_LAST_OFFSET: u64 = 99;

/// A single todo record.
///
/// Field order matters: the derived [`Ord`] sorts by `id` first, which the
/// order-insensitive equality on [`TodoState`] relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Todo {
    /// Identifier, unique within a snapshot.
    pub id: u64,
    /// Free-form title.
    pub title: String,
    /// Whether the item is done.
    pub completed: bool,
    /// When the record was created on its originating replica.
    pub created_at: DateTime<Utc>,
}

/// The range of record IDs one replica issues from.
///
/// Replica `k` owns `[100k, 100k + 99]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBand {
    start: u64,
}

impl IdBand {
    /// Band for replica number `replica`, or `None` if it would overflow.
    pub const fn for_replica(replica: u64) -> Option<Self> {
        match replica.checked_mul(BAND_WIDTH) {
            Some(start) => Some(Self { start }),
            None => None,
        }
    }

    /// First ID of the band.
    pub const fn start(self) -> u64 {
        self.start
    }

    /// Last ID of the band (inclusive).
    pub const fn end(self) -> u64 {
        self.start.saturating_add(BAND_LAST_OFFSET)
    }
}

/// Two records that shared an ID during a merge; `dropped` was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCollision {
    /// The shared ID.
    pub id: u64,
    /// The record that survived (first seen, left operand first).
    pub kept: Todo,
    /// The record that was discarded.
    pub dropped: Todo,
}

/// A snapshot that violates the record-collection invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    /// Two records carry the same ID.
    #[error("duplicate record id {id}")]
    DuplicateId {
        /// The repeated ID.
        id: u64,
    },

    /// A record ID was issued at or beyond the counter.
    #[error("record id {id} is not below next_id {next_id}")]
    IdBeyondCounter {
        /// The offending ID.
        id: u64,
        /// The snapshot's counter.
        next_id: u64,
    },
}

/// The ID counter has no IDs left to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("id counter exhausted at {next_id}")]
pub struct CounterExhausted {
    /// The counter value that cannot be issued and advanced.
    pub next_id: u64,
}

#[derive(Deserialize)]
struct RawTodoState {
    todos: Vec<Todo>,
    next_id: u64,
}

impl TryFrom<RawTodoState> for TodoState {
    type Error = ConsistencyError;

    fn try_from(raw: RawTodoState) -> Result<Self, Self::Error> {
        let state = Self {
            todos: raw.todos,
            next_id: raw.next_id,
        };
        state.check_consistency()?;
        Ok(state)
    }
}

/// Immutable snapshot of a todo list.
///
/// Every value satisfies [`TodoState::check_consistency`]: operations keep
/// it and decoding rejects input that breaks it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTodoState")]
pub struct TodoState {
    todos: Vec<Todo>,
    next_id: u64,
}

impl TodoState {
    /// An empty list whose first record gets ID 1.
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// An empty list whose first record gets ID `next_id`.
    pub const fn starting_at(next_id: u64) -> Self {
        Self {
            todos: Vec::new(),
            next_id,
        }
    }

    /// An empty list seeded at the start of `band`.
    pub const fn in_band(band: IdBand) -> Self {
        Self::starting_at(band.start())
    }

    /// Return a new snapshot with one more record titled `title`.
    ///
    /// The record gets `id = next_id` and the counter advances by one.
    /// Copies the backing sequence. Once the counter is exhausted the
    /// receiver is returned unchanged.
    #[must_use]
    pub fn add(&self, title: impl Into<String>) -> Self {
        self.add_at(title, Utc::now())
    }

    /// Like [`add`](Self::add) with an explicit creation time.
    #[must_use]
    pub fn add_at(&self, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        self.try_add_at(title, created_at).unwrap_or_else(|_| self.clone())
    }

    /// Like [`add`](Self::add), but reports an exhausted counter.
    ///
    /// # Errors
    ///
    /// [`CounterExhausted`] when `next_id` is `u64::MAX`.
    pub fn try_add(&self, title: impl Into<String>) -> Result<Self, CounterExhausted> {
        self.try_add_at(title, Utc::now())
    }

    /// Like [`try_add`](Self::try_add) with an explicit creation time.
    ///
    /// # Errors
    ///
    /// [`CounterExhausted`] when `next_id` is `u64::MAX`.
    pub fn try_add_at(
        &self,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CounterExhausted> {
        let next_id = self.next_id.checked_add(1).ok_or(CounterExhausted {
            next_id: self.next_id,
        })?;

        let mut todos = Vec::with_capacity(self.todos.len().saturating_add(1));
        todos.extend_from_slice(&self.todos);
        todos.push(Todo {
            id: self.next_id,
            title: title.into(),
            completed: false,
            created_at,
        });

        Ok(Self { todos, next_id })
    }

    /// All records, in insertion/merge order.
    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    /// The ID the next [`add`](Self::add) will issue.
    pub const fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.todos.len()
    }

    /// Whether the list has no records.
    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    /// The most recently appended record.
    pub fn last(&self) -> Option<&Todo> {
        self.todos.last()
    }

    /// Look up a record by ID.
    pub fn get(&self, id: u64) -> Option<&Todo> {
        self.todos.iter().find(|todo| todo.id == id)
    }

    /// Verify IDs are unique and all below the counter.
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        let mut seen = HashSet::with_capacity(self.todos.len());
        for todo in &self.todos {
            if !seen.insert(todo.id) {
                return Err(ConsistencyError::DuplicateId { id: todo.id });
            }
            if todo.id >= self.next_id {
                return Err(ConsistencyError::IdBeyondCounter {
                    id: todo.id,
                    next_id: self.next_id,
                });
            }
        }
        Ok(())
    }

    fn sorted_records(&self) -> Vec<&Todo> {
        let mut records: Vec<&Todo> = self.todos.iter().collect();
        records.sort_unstable();
        records
    }
}

impl Default for TodoState {
    fn default() -> Self {
        Self::new()
    }
}

/// Record-set equality: same counter, same records, order ignored.
impl PartialEq for TodoState {
    fn eq(&self, other: &Self) -> bool {
        self.next_id == other.next_id
            && self.todos.len() == other.todos.len()
            && self.sorted_records() == other.sorted_records()
    }
}

impl Eq for TodoState {}

impl Mergeable for TodoState {
    type Conflict = IdCollision;

    fn reconcile(&self, other: &Self) -> Reconciled<Self, IdCollision> {
        let capacity = self.todos.len().saturating_add(other.todos.len());
        let mut seen: HashMap<u64, &Todo> = HashMap::with_capacity(capacity);
        let mut todos = Vec::with_capacity(capacity);
        let mut conflicts = Vec::new();

        for todo in self.todos.iter().chain(&other.todos) {
            match seen.entry(todo.id) {
                Entry::Vacant(slot) => {
                    slot.insert(todo);
                    todos.push(todo.clone());
                }
                Entry::Occupied(slot) => {
                    let kept = *slot.get();
                    if kept != todo {
                        conflicts.push(IdCollision {
                            id: todo.id,
                            kept: kept.clone(),
                            dropped: todo.clone(),
                        });
                    }
                }
            }
        }

        Reconciled {
            merged: Self {
                todos,
                next_id: self.next_id.max(other.next_id),
            },
            conflicts,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    fn with_titles(start: u64, titles: &[&str]) -> TodoState {
        titles
            .iter()
            .fold(TodoState::starting_at(start), |state, title| {
                state.add_at(*title, at(1_700_000_000))
            })
    }

    #[test]
    fn add_issues_sequential_ids() {
        let state = with_titles(1, &["a", "b", "c"]);
        let ids: Vec<u64> = state.todos().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(state.next_id(), 4);
        assert!(state.todos().iter().all(|t| !t.completed));
    }

    #[test]
    fn add_leaves_receiver_untouched() {
        let original = with_titles(1, &["a"]);
        let before = original.clone();
        let grown = original.add("b");
        assert_eq!(original, before);
        assert_eq!(original.len(), 1);
        assert_eq!(grown.len(), 2);
        assert_eq!(grown.last().map(|t| t.title.as_str()), Some("b"));
    }

    #[test]
    fn merge_keeps_left_order_then_unseen_right() {
        let left = with_titles(1, &["a", "b"]);
        let right = with_titles(100, &["x"]);
        let merged = left.merge(&right);
        let ids: Vec<u64> = merged.todos().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 100]);
        assert_eq!(merged.next_id(), 101);
    }

    #[test]
    fn merge_takes_max_counter() {
        let left = TodoState::starting_at(40);
        let right = TodoState::starting_at(7);
        assert_eq!(left.merge(&right).next_id(), 40);
        assert_eq!(right.merge(&left).next_id(), 40);
    }

    #[test]
    fn colliding_ids_drop_the_right_record() {
        let left = with_titles(1, &["left"]);
        let right = with_titles(1, &["right"]);
        let outcome = left.reconcile(&right);

        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged.get(1).map(|t| t.title.as_str()), Some("left"));
        assert_eq!(outcome.conflicts.len(), 1);
        let collision = outcome.conflicts.first().cloned();
        assert_eq!(collision.as_ref().map(|c| c.dropped.title.as_str()), Some("right"));
        assert_eq!(collision.map(|c| c.id), Some(1));
    }

    #[test]
    fn identical_duplicates_are_not_conflicts() {
        let state = with_titles(1, &["a", "b"]);
        let outcome = state.reconcile(&state);
        assert!(outcome.is_clean());
        assert_eq!(outcome.merged, state);
    }

    #[test]
    fn overlapping_counters_lose_records() {
        let a = (0..5).fold(TodoState::new(), |s, i| s.add(format!("a{i}")));
        let b = (0..5).fold(TodoState::new(), |s, i| s.add(format!("b{i}")));
        let merged = a.merge(&b);
        assert_eq!(merged.len(), 5);
        assert!(merged.todos().iter().all(|t| t.title.starts_with('a')));
    }

    #[test]
    fn equality_ignores_record_order() {
        let a = with_titles(1, &["a"]);
        let b = with_titles(10, &["b"]);
        assert_eq!(a.merge(&b), b.merge(&a));
        assert_ne!(a.merge(&b).todos(), b.merge(&a).todos());
    }

    #[test]
    fn equality_checks_counter_and_payload() {
        let a = with_titles(1, &["a"]);
        assert_ne!(a, with_titles(1, &["other"]));
        assert_ne!(a, with_titles(1, &["a"]).merge(&TodoState::starting_at(9)));
    }

    #[test]
    fn consistency_detects_duplicates_and_stale_counter() {
        assert_eq!(with_titles(1, &["a", "b"]).check_consistency(), Ok(()));

        let record = |id| Todo {
            id,
            title: String::from("a"),
            completed: false,
            created_at: at(0),
        };
        let duplicated = TodoState {
            todos: vec![record(3), record(3)],
            next_id: 4,
        };
        assert_eq!(
            duplicated.check_consistency(),
            Err(ConsistencyError::DuplicateId { id: 3 })
        );

        let stale = TodoState {
            todos: vec![record(5)],
            next_id: 5,
        };
        assert_eq!(
            stale.check_consistency(),
            Err(ConsistencyError::IdBeyondCounter { id: 5, next_id: 5 })
        );
    }

    #[test]
    fn decode_rejects_inconsistent_snapshots() {
        let stale = serde_json::json!({
            "todos": [
                {"id": 100, "title": "a", "completed": false, "created_at": "2024-01-01T00:00:00Z"}
            ],
            "next_id": 1
        });
        let decoded: Result<TodoState, _> = serde_json::from_value(stale);
        assert!(decoded.is_err_and(|e| e.to_string().contains("not below next_id")));

        let duplicated = serde_json::json!({
            "todos": [
                {"id": 3, "title": "a", "completed": false, "created_at": "2024-01-01T00:00:00Z"},
                {"id": 3, "title": "b", "completed": false, "created_at": "2024-01-01T00:00:00Z"}
            ],
            "next_id": 4
        });
        assert!(serde_json::from_value::<TodoState>(duplicated).is_err());
    }

    #[test]
    fn exhausted_counter_refuses_to_reuse_ids() {
        let full = TodoState::starting_at(u64::MAX);
        assert_eq!(
            full.try_add("a"),
            Err(CounterExhausted { next_id: u64::MAX })
        );

        let unchanged = full.add("a").add("b");
        assert!(unchanged.is_empty());
        assert_eq!(unchanged.next_id(), u64::MAX);
        assert_eq!(unchanged.check_consistency(), Ok(()));

        let last = TodoState::starting_at(u64::MAX.saturating_sub(1))
            .add("last")
            .add("overflow");
        assert_eq!(last.len(), 1);
        assert_eq!(last.next_id(), u64::MAX);
        assert_eq!(last.check_consistency(), Ok(()));
    }

    #[test]
    fn id_bands_are_disjoint() {
        let one = IdBand::for_replica(1);
        let two = IdBand::for_replica(2);
        assert_eq!(one.map(IdBand::start), Some(100));
        assert_eq!(one.map(IdBand::end), Some(199));
        assert_eq!(two.map(IdBand::start), Some(200));
        assert!(one.map(IdBand::end) < two.map(IdBand::start));
        assert!(IdBand::for_replica(u64::MAX).is_none());
    }

    #[test]
    fn band_seeded_state_starts_at_band() {
        let band = IdBand::for_replica(3).unwrap_or(IdBand { start: 0 });
        let state = TodoState::in_band(band).add("first");
        assert_eq!(state.last().map(|t| t.id), Some(300));
    }
}
